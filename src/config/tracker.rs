//! Tracker configuration: where wrapped skills report their events

use serde::Deserialize;
use std::time::Duration;

/// Client-side tracker settings
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Base URL of the ingestion server (events go to `{endpoint}/api/track`)
    pub endpoint: String,
    /// Upper bound on a single submission when awaited
    pub submit_timeout_ms: u64,
    /// Fire-and-forget submission (true) or await with timeout (false)
    pub detached: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8787".to_string(),
            submit_timeout_ms: 2_000,
            detached: true,
        }
    }
}

/// Tracker config as loaded from file
#[derive(Debug, Deserialize, Default)]
pub struct FileTrackerConfig {
    pub endpoint: Option<String>,
    pub submit_timeout_ms: Option<u64>,
    pub detached: Option<bool>,
}

impl TrackerConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileTrackerConfig>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            endpoint: file.endpoint.unwrap_or(defaults.endpoint),
            submit_timeout_ms: file.submit_timeout_ms.unwrap_or(defaults.submit_timeout_ms),
            detached: file.detached.unwrap_or(defaults.detached),
        }
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }
}
