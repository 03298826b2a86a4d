//! Configuration module for the Marquee pipeline
//!
//! Configuration is read from a TOML (or JSON) file, then environment
//! overrides are applied on top. Every section has defaults so an empty file
//! (or no file at all) yields a working configuration.

pub mod types;

pub use types::*;

use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub const ENV_API_TIMEOUT_SECS: &str = "MARQUEE_API_TIMEOUT_SECS";
pub const ENV_API_MAX_RETRIES: &str = "MARQUEE_API_MAX_RETRIES";
pub const ENV_API_RETRY_BACKOFF_FACTOR: &str = "MARQUEE_API_RETRY_BACKOFF_FACTOR";

/// Load a configuration file, choosing the format from its extension.
/// `.toml`/`.tml` are parsed as TOML, anything else as JSON.
pub fn load_config(path: impl AsRef<Path>) -> Result<MarqueeConfig, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    let config: MarqueeConfig = if ext == "toml" || ext == "tml" {
        toml::from_str(&raw)?
    } else {
        serde_json::from_str(&raw)?
    };
    config.validate()?;
    Ok(config)
}

impl MarqueeConfig {
    /// Apply `MARQUEE_API_*` environment overrides. Values that do not parse
    /// are logged and ignored.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Same as [`MarqueeConfig::apply_env`] with an explicit lookup, so tests
    /// don't need to touch the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_API_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(v) => self.retry.timeout_secs = v,
                Err(_) => warn!("Ignoring {}={:?}: not an integer", ENV_API_TIMEOUT_SECS, raw),
            }
        }
        if let Some(raw) = lookup(ENV_API_MAX_RETRIES) {
            match raw.trim().parse::<u32>() {
                Ok(v) => self.retry.max_retries = v,
                Err(_) => warn!("Ignoring {}={:?}: not an integer", ENV_API_MAX_RETRIES, raw),
            }
        }
        if let Some(raw) = lookup(ENV_API_RETRY_BACKOFF_FACTOR) {
            match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => self.retry.backoff_factor = v,
                _ => warn!(
                    "Ignoring {}={:?}: not a non-negative number",
                    ENV_API_RETRY_BACKOFF_FACTOR, raw
                ),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "retry.backoff_factor must be a non-negative number, got {}",
                self.retry.backoff_factor
            )));
        }
        if self.recovery.log_preview_chars == 0 {
            return Err(ConfigError::Invalid(
                "recovery.log_preview_chars must be at least 1".to_string(),
            ));
        }
        let site = self.catalog.site();
        if !site.root.starts_with("http") {
            return Err(ConfigError::Invalid(format!(
                "catalog.site.root must be an absolute URL, got {:?}",
                site.root
            )));
        }
        if !site.item.contains("{id}") {
            return Err(ConfigError::Invalid(
                "catalog.site.item must contain an {id} placeholder".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_overrides_apply_and_ignore_garbage() {
        let env: HashMap<&str, &str> = [
            (ENV_API_MAX_RETRIES, "7"),
            (ENV_API_TIMEOUT_SECS, "soon"),
            (ENV_API_RETRY_BACKOFF_FACTOR, "0.5"),
        ]
        .into_iter()
        .collect();

        let mut config = MarqueeConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.retry.timeout_secs, 15);
        assert_eq!(config.retry.backoff_factor, 0.5);
    }

    #[test]
    fn test_negative_backoff_is_rejected() {
        let mut config = MarqueeConfig::default();
        config.retry.backoff_factor = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
