//! Configuration types
//!
//! All sections deserialize with defaults, so partial files are fine.

use serde::{Deserialize, Serialize};

/// Root configuration for the pipeline core
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarqueeConfig {
    pub retry: RetrySettings,
    pub recovery: RecoverySettings,
    pub catalog: CatalogConfig,
    pub pipeline: PipelineSettings,
}

/// Defaults for outbound calls. A call site may override each field
/// independently (see [`crate::retry::RetryPolicy`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before retry k is `backoff_factor * 2^(k-1)` seconds
    pub backoff_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_retries: 4,
            backoff_factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecoverySettings {
    /// Longest prefix of raw agent output that may appear in a log line
    pub log_preview_chars: usize,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            log_preview_chars: 100,
        }
    }
}

/// Which kind of entity the primary records describe
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    #[default]
    Movies,
    Rentals,
}

/// URL templates used to build links for a catalog.
///
/// Placeholders: `{id}` in `item`, `{photo_id}` in `photo_search`,
/// `{tag_id}` in `category_search`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteUrls {
    /// Neutral site root, the last-resort link
    pub root: String,
    /// Deep link to one entity
    pub item: String,
    #[serde(default)]
    pub photo_search: Option<String>,
    #[serde(default)]
    pub category_search: Option<String>,
}

impl SiteUrls {
    pub fn rentals() -> Self {
        Self {
            root: "https://www.airbnb.com".to_string(),
            item: "https://www.airbnb.com/rooms/{id}".to_string(),
            photo_search: Some("https://www.airbnb.com/rooms?photos={photo_id}".to_string()),
            category_search: Some(
                "https://www.airbnb.com/s/homes?category_tag_id={tag_id}".to_string(),
            ),
        }
    }

    pub fn movies() -> Self {
        Self {
            root: "https://www.themoviedb.org".to_string(),
            item: "https://www.themoviedb.org/movie/{id}".to_string(),
            photo_search: None,
            category_search: None,
        }
    }

    pub fn item_url(&self, id: &str) -> String {
        self.item.replace("{id}", id)
    }

    pub fn photo_url(&self, photo_id: &str) -> Option<String> {
        self.photo_search
            .as_ref()
            .map(|t| t.replace("{photo_id}", photo_id))
    }

    pub fn category_url(&self, tag_id: &str) -> Option<String> {
        self.category_search
            .as_ref()
            .map(|t| t.replace("{tag_id}", tag_id))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    pub kind: CatalogKind,
    /// Overrides the per-kind default URLs when set
    pub site: Option<SiteUrls>,
}

impl CatalogConfig {
    pub fn new(kind: CatalogKind) -> Self {
        Self { kind, site: None }
    }

    pub fn site(&self) -> SiteUrls {
        match (&self.site, self.kind) {
            (Some(site), _) => site.clone(),
            (None, CatalogKind::Movies) => SiteUrls::movies(),
            (None, CatalogKind::Rentals) => SiteUrls::rentals(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Movies released this many years before the current one still count
    /// as current releases
    pub current_release_window_years: i32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            current_release_window_years: 1,
        }
    }
}
