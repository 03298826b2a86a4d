use std::io::Write;

use marquee::config::{
    load_config, CatalogKind, ConfigError, MarqueeConfig, ENV_API_RETRY_BACKOFF_FACTOR,
    ENV_API_TIMEOUT_SECS,
};
use pretty_assertions::assert_eq;
use tempfile::Builder;

fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_empty_toml_yields_defaults() {
    let file = write_config(".toml", "");
    let config = load_config(file.path()).unwrap();
    assert_eq!(config, MarqueeConfig::default());
    assert_eq!(config.retry.timeout_secs, 15);
    assert_eq!(config.retry.max_retries, 4);
    assert_eq!(config.retry.backoff_factor, 1.0);
    assert_eq!(config.recovery.log_preview_chars, 100);
    assert_eq!(config.catalog.kind, CatalogKind::Movies);
}

#[test]
fn test_partial_toml_keeps_other_defaults() {
    let file = write_config(
        ".toml",
        r#"
[retry]
max_retries = 1

[catalog]
kind = "rentals"

[catalog.site]
root = "https://stays.example.com"
item = "https://stays.example.com/listing/{id}"
"#,
    );
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.retry.max_retries, 1);
    assert_eq!(config.retry.timeout_secs, 15);
    assert_eq!(config.catalog.kind, CatalogKind::Rentals);

    let site = config.catalog.site();
    assert_eq!(site.item_url("77"), "https://stays.example.com/listing/77");
    assert_eq!(site.photo_url("1"), None);
}

#[test]
fn test_json_is_chosen_by_extension() {
    let file = write_config(
        ".json",
        r#"{"retry": {"timeout_secs": 30}, "pipeline": {"current_release_window_years": 2}}"#,
    );
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.retry.timeout_secs, 30);
    assert_eq!(config.pipeline.current_release_window_years, 2);
}

#[test]
fn test_invalid_values_are_rejected() {
    let negative = write_config(".toml", "[retry]\nbackoff_factor = -0.5\n");
    assert!(matches!(load_config(negative.path()), Err(ConfigError::Invalid(_))));

    let no_placeholder = write_config(
        ".toml",
        "[catalog.site]\nroot = \"https://x.example\"\nitem = \"https://x.example/item\"\n",
    );
    assert!(matches!(
        load_config(no_placeholder.path()),
        Err(ConfigError::Invalid(_))
    ));

    let malformed = write_config(".toml", "[retry\nmax_retries = ");
    assert!(matches!(load_config(malformed.path()), Err(ConfigError::Toml(_))));

    let wrong_type = write_config(".json", r#"{"retry": {"max_retries": "many"}}"#);
    assert!(matches!(load_config(wrong_type.path()), Err(ConfigError::Json(_))));
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_config(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_environment_overrides_file_values() {
    let file = write_config(".toml", "[retry]\ntimeout_secs = 5\nmax_retries = 9\n");
    let mut config = load_config(file.path()).unwrap();
    config.apply_overrides(|key| match key {
        ENV_API_TIMEOUT_SECS => Some("20".to_string()),
        ENV_API_RETRY_BACKOFF_FACTOR => Some("-3".to_string()),
        _ => None,
    });
    assert_eq!(config.retry.timeout_secs, 20);
    assert_eq!(config.retry.max_retries, 9);
    // Negative factors are ignored
    assert_eq!(config.retry.backoff_factor, 1.0);
}
