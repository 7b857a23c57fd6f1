//! Configuration tests
//!
//! Round-trip guards: whatever `to_toml()` writes must parse back into
//! `FileConfig` and produce the same effective `Config`.

use super::*;
use std::collections::HashMap;

fn no_env(_: &str) -> Option<String> {
    None
}

fn parse(toml_str: &str) -> FileConfig {
    toml::from_str(toml_str).unwrap_or_else(|e| panic!("TOML:\n{}\nError: {:?}", toml_str, e))
}

// ─────────────────────────────────────────────────────────────────────────────
// Round-trip tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_roundtrip_default() {
    let config = Config::default();
    let toml_str = config.to_toml();

    let parsed: Result<FileConfig, _> = toml::from_str(&toml_str);
    assert!(
        parsed.is_ok(),
        "Default config should round-trip.\nTOML:\n{}\nError: {:?}",
        toml_str,
        parsed.err()
    );
}

#[test]
fn test_config_roundtrip_preserves_values() {
    let mut config = Config::default();
    config.bind_addr = "0.0.0.0:9100".parse().unwrap();
    config.default_category = "cms_ontology".to_string();
    config.store.db_path = "/var/lib/skilltrace/events.db".into();
    config.store.pool_size = 8;
    config.store.retention_days = 90;
    config.store.max_error_message_len = 1024;
    config.logging.level = "debug".to_string();
    config.logging.file_enabled = true;
    config.logging.file_rotation = LogRotation::Hourly;
    config.tracker.endpoint = "http://telemetry.internal:8787".to_string();
    config.tracker.submit_timeout_ms = 500;
    config.tracker.detached = false;

    let reparsed = Config::from_sources(parse(&config.to_toml()), no_env).unwrap();

    assert_eq!(reparsed.bind_addr, config.bind_addr);
    assert_eq!(reparsed.default_category, "cms_ontology");
    assert_eq!(reparsed.store.db_path, config.store.db_path);
    assert_eq!(reparsed.store.pool_size, 8);
    assert_eq!(reparsed.store.retention_days, 90);
    assert_eq!(reparsed.store.max_error_message_len, 1024);
    assert_eq!(reparsed.logging.level, "debug");
    assert!(reparsed.logging.file_enabled);
    assert_eq!(reparsed.logging.file_rotation, LogRotation::Hourly);
    assert_eq!(reparsed.tracker.endpoint, config.tracker.endpoint);
    assert_eq!(reparsed.tracker.submit_timeout_ms, 500);
    assert!(!reparsed.tracker.detached);
}

#[test]
fn test_config_roundtrip_escapes_quotes() {
    let mut config = Config::default();
    config.default_category = r#"weird "quoted" \ category"#.to_string();

    let reparsed = Config::from_sources(parse(&config.to_toml()), no_env).unwrap();
    assert_eq!(reparsed.default_category, config.default_category);
}

#[test]
fn test_config_roundtrip_control_characters() {
    let mut config = Config::default();
    config.default_category = "multi\nline\ttab\u{7}bell".to_string();
    config.store.db_path = "/tmp/odd\npath/events.db".into();
    config.logging.file_prefix = "it's \"quoted\"".to_string();

    let reparsed = Config::from_sources(parse(&config.to_toml()), no_env).unwrap();
    assert_eq!(reparsed.default_category, config.default_category);
    assert_eq!(reparsed.store.db_path, config.store.db_path);
    assert_eq!(reparsed.logging.file_prefix, config.logging.file_prefix);
}

// ─────────────────────────────────────────────────────────────────────────────
// Precedence
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_empty_file_yields_defaults() {
    let config = Config::from_sources(FileConfig::default(), no_env).unwrap();
    let defaults = Config::default();

    assert_eq!(config.bind_addr, defaults.bind_addr);
    assert_eq!(config.default_category, DEFAULT_CATEGORY);
    assert_eq!(config.store.db_path, defaults.store.db_path);
    assert_eq!(config.logging.file_prefix, "skilltrace");
    assert!(config.tracker.detached);
}

#[test]
fn test_env_overrides_file() {
    let file = parse(
        r#"
bind_addr = "127.0.0.1:9000"
default_category = "from_file"

[store]
db_path = "/tmp/file.db"

[tracker]
endpoint = "http://file:1"
"#,
    );

    let env: HashMap<&str, &str> = [
        ("SKILLTRACE_BIND", "127.0.0.1:9999"),
        ("SKILLTRACE_CATEGORY", "from_env"),
        ("SKILLTRACE_DB", "/tmp/env.db"),
        ("SKILLTRACE_ENDPOINT", "http://env:2"),
    ]
    .into_iter()
    .collect();

    let config = Config::from_sources(file, |k| env.get(k).map(|v| v.to_string())).unwrap();

    assert_eq!(config.bind_addr.port(), 9999);
    assert_eq!(config.default_category, "from_env");
    assert_eq!(config.store.db_path, PathBuf::from("/tmp/env.db"));
    assert_eq!(config.tracker.endpoint, "http://env:2");
}

#[test]
fn test_partial_sections_fill_defaults() {
    let file = parse(
        r#"
[store]
pool_size = 2

[logging]
file_rotation = "never"
"#,
    );
    let config = Config::from_sources(file, no_env).unwrap();

    assert_eq!(config.store.pool_size, 2);
    assert_eq!(config.store.max_error_message_len, 4096);
    assert_eq!(config.logging.file_rotation, LogRotation::Never);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_blank_category_falls_back_to_default() {
    let file = parse(r#"default_category = "   ""#);
    let config = Config::from_sources(file, no_env).unwrap();
    assert_eq!(config.default_category, DEFAULT_CATEGORY);
}

#[test]
fn test_invalid_bind_address_is_error() {
    let file = parse(r#"bind_addr = "not-an-address""#);
    let err = Config::from_sources(file, no_env).unwrap_err();
    assert!(err.to_string().contains("not-an-address"));
}

#[test]
fn test_malformed_toml_is_rejected() {
    let parsed: Result<FileConfig, _> = toml::from_str("[store\npool_size = 2");
    assert!(parsed.is_err());
}

#[test]
fn test_log_rotation_parse() {
    assert_eq!(LogRotation::parse("HOURLY"), LogRotation::Hourly);
    assert_eq!(LogRotation::parse("never"), LogRotation::Never);
    assert_eq!(LogRotation::parse("weekly"), LogRotation::Daily);
}

#[test]
fn test_ingest_options_follow_config() {
    let mut config = Config::default();
    config.default_category = "search".to_string();
    config.store.max_error_message_len = 10;

    let options = config.ingest_options();
    assert_eq!(options.default_category, "search");
    assert_eq!(options.max_error_message_len, 10);
}
