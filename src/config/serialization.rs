//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;

impl Config {
    /// Render the config as a commented TOML document
    ///
    /// Used both for the template written on first run and for
    /// `skilltrace config --show`.
    pub fn to_toml(&self) -> String {
        format!(
            r#"# skilltrace configuration

# HTTP server bind address (ingestion + analytics endpoints)
bind_addr = {bind}

# Category recorded for events posted without tool_category
default_category = {category}

# Event store (SQLite)
[store]
db_path = {db_path}
pool_size = {pool_size}
# Default cutoff for `skilltrace prune` (0 = keep forever)
retention_days = {retention_days}
max_error_message_len = {max_error_len}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = {log_level}
# JSON file logging (in addition to stdout)
file_enabled = {log_file_enabled}
file_dir = {log_file_dir}
file_rotation = "{log_file_rotation}"  # hourly, daily, never
file_prefix = {log_file_prefix}

# Tracker (library side): where wrapped skills send their events
[tracker]
endpoint = {endpoint}
submit_timeout_ms = {submit_timeout}
# true = fire-and-forget, false = await each submission (bounded by timeout)
detached = {detached}
"#,
            bind = quote(&self.bind_addr.to_string()),
            category = quote(&self.default_category),
            db_path = quote(&self.store.db_path.display().to_string()),
            pool_size = self.store.pool_size,
            retention_days = self.store.retention_days,
            max_error_len = self.store.max_error_message_len,
            log_level = quote(&self.logging.level),
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = quote(&self.logging.file_dir.display().to_string()),
            log_file_rotation = self.logging.file_rotation.as_str(),
            log_file_prefix = quote(&self.logging.file_prefix),
            endpoint = quote(&self.tracker.endpoint),
            submit_timeout = self.tracker.submit_timeout_ms,
            detached = self.tracker.detached,
        )
    }
}

/// Render a value as a TOML string literal (quotes, escapes, control chars)
fn quote(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}
