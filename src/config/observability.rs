//! Observability and storage configuration: logging, event store
//!
//! - Logging: level, file output, rotation
//! - Store: SQLite event database location and limits

use serde::Deserialize;
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Log Rotation
// ─────────────────────────────────────────────────────────────────────────────

/// Log file rotation strategy
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LogRotation {
    /// Rotate log files hourly
    Hourly,
    /// Rotate log files daily (default)
    #[default]
    Daily,
    /// Never rotate - single log file
    Never,
}

impl LogRotation {
    /// Parse rotation string from config (unknown values fall back to daily)
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "hourly" => Self::Hourly,
            "never" => Self::Never,
            _ => Self::Daily,
        }
    }

    /// Convert to string for TOML serialization
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Never => "never",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Enable JSON file logging in addition to stdout
    pub file_enabled: bool,
    /// Directory for log files
    pub file_dir: PathBuf,
    /// Log file rotation strategy
    pub file_rotation: LogRotation,
    /// Prefix for log file names (e.g., "skilltrace" -> "skilltrace.2026-10-18")
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false,
            file_dir: PathBuf::from("./logs"),
            file_rotation: LogRotation::Daily,
            file_prefix: "skilltrace".to_string(),
        }
    }
}

/// Logging settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileLogging {
    pub level: Option<String>,
    pub file_enabled: Option<bool>,
    pub file_dir: Option<String>,
    pub file_rotation: Option<String>,
    pub file_prefix: Option<String>,
}

impl LoggingConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileLogging>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            level: file.level.unwrap_or(defaults.level),
            file_enabled: file.file_enabled.unwrap_or(defaults.file_enabled),
            file_dir: file
                .file_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.file_dir),
            file_rotation: file
                .file_rotation
                .map(|s| LogRotation::parse(&s))
                .unwrap_or(defaults.file_rotation),
            file_prefix: file.file_prefix.unwrap_or(defaults.file_prefix),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event Store Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Event store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Maximum pooled connections
    pub pool_size: u32,
    /// Default age cutoff for `skilltrace prune` (0 = keep forever)
    pub retention_days: u32,
    /// Stored error messages are truncated to this many bytes
    pub max_error_message_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/skilltrace.db"),
            pool_size: 4,
            retention_days: 0,
            max_error_message_len: 4096,
        }
    }
}

/// Store config as loaded from file
#[derive(Debug, Deserialize, Default)]
pub struct FileStoreConfig {
    pub db_path: Option<String>,
    pub pool_size: Option<u32>,
    pub retention_days: Option<u32>,
    pub max_error_message_len: Option<usize>,
}

impl StoreConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileStoreConfig>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            db_path: file.db_path.map(PathBuf::from).unwrap_or(defaults.db_path),
            pool_size: file.pool_size.unwrap_or(defaults.pool_size),
            retention_days: file.retention_days.unwrap_or(defaults.retention_days),
            max_error_message_len: file
                .max_error_message_len
                .unwrap_or(defaults.max_error_message_len),
        }
    }
}
