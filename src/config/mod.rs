//! Configuration for the telemetry server and tracker
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/skilltrace/config.toml)
//! 3. Built-in defaults (lowest priority)

use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod observability;
mod serialization;
mod tracker;

#[cfg(test)]
mod tests;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports
// ─────────────────────────────────────────────────────────────────────────────

pub use observability::{FileLogging, FileStoreConfig, LogRotation, LoggingConfig, StoreConfig};
pub use tracker::{FileTrackerConfig, TrackerConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Category stamped on events that arrive without one
pub const DEFAULT_CATEGORY: &str = "default";

/// Default listen address for the ingestion/analytics server
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,

    /// Category applied to events posted without `tool_category`
    pub default_category: String,

    /// Event store settings
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Client-side tracker settings (used by embedders of the library)
    pub tracker: TrackerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            default_category: DEFAULT_CATEGORY.to_string(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub bind_addr: Option<String>,
    pub default_category: Option<String>,

    /// Optional [store] section
    pub store: Option<FileStoreConfig>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,

    /// Optional [tracker] section
    pub tracker: Option<FileTrackerConfig>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/skilltrace/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("skilltrace").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Config is optional
            }
        }

        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Load file config if it exists
    ///
    /// A file that exists but cannot be read or parsed is an error: a broken
    /// config should fail fast rather than silently fall back to defaults.
    fn load_file_config() -> anyhow::Result<FileConfig> {
        let Some(path) = Self::config_path() else {
            return Ok(FileConfig::default());
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read config file {}", path.display())),
        }
    }

    /// Load configuration: env vars -> file -> defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let file = Self::load_file_config()?;
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Merge a parsed file config with an environment lookup
    pub(crate) fn from_sources(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        // Bind address: env > file > default
        let bind_raw = env("SKILLTRACE_BIND")
            .or(file.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_raw
            .parse()
            .with_context(|| format!("Invalid bind address '{}'", bind_raw))?;

        // Default category: env > file > default (blank values ignored)
        let default_category = env("SKILLTRACE_CATEGORY")
            .or(file.default_category)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        let mut store = StoreConfig::from_file(file.store);
        if let Some(db) = env("SKILLTRACE_DB") {
            store.db_path = PathBuf::from(db);
        }

        let logging = LoggingConfig::from_file(file.logging);

        let mut tracker = TrackerConfig::from_file(file.tracker);
        if let Some(endpoint) = env("SKILLTRACE_ENDPOINT") {
            tracker.endpoint = endpoint;
        }

        Ok(Self {
            bind_addr,
            default_category,
            store,
            logging,
            tracker,
        })
    }

    /// Ingestion settings derived from this config
    pub fn ingest_options(&self) -> crate::ingest::IngestOptions {
        crate::ingest::IngestOptions {
            default_category: self.default_category.clone(),
            max_error_message_len: self.store.max_error_message_len,
        }
    }
}
