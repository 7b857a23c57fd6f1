//! Usage event store
//!
//! Append-only SQLite table of usage events. Every ingestion is a single
//! INSERT; nothing in the ingestion or aggregation path updates or deletes
//! rows. Readers and writers share one r2d2 pool.
//!
//! # Architecture
//!
//! ```text
//! POST /api/track ──┐
//!                   ├──→ ingest() ──→ EventStore.insert()
//! Tracker(StoreSink)┘                      │
//!                                          └──→ r2d2 pool ──→ SQLite (WAL)
//!                                                   │
//! GET /analytics/* ──→ AnalyticsQuery ──────────────┘
//! ```
//!
//! # Timestamps
//!
//! Stored as RFC 3339 UTC text with fixed millisecond precision
//! (`2026-10-18T12:00:00.000Z`). Fixed width keeps lexicographic order equal
//! to time order, so window filters are plain string comparisons and the
//! calendar date is the first ten characters.

pub mod query;

pub use query::AnalyticsQuery;

use crate::events::{EventStatus, NewEvent, UsageEvent};
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

/// Current schema version (bump when adding a migration)
const SCHEMA_VERSION: i32 = 1;

/// Columns selected when materializing a full `UsageEvent`
const EVENT_COLUMNS: &str = "id, user_id_hash, tool_name, tool_category, timestamp, \
     duration_ms, status, error_type, error_message, metadata";

/// Append-only usage event store
#[derive(Clone)]
pub struct EventStore {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl EventStore {
    /// Open (or create) the store at `db_path`
    ///
    /// Creates parent directories, builds the connection pool and applies
    /// pending schema migrations.
    pub fn open(db_path: impl AsRef<Path>, pool_size: u32) -> anyhow::Result<Self> {
        let path = db_path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        // busy_timeout is per-connection, so every pooled connection gets it
        let manager = SqliteConnectionManager::file(&path)
            .with_init(|conn| conn.execute_batch("PRAGMA busy_timeout=5000;"));
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .with_context(|| format!("Failed to open event store at {}", path.display()))?;

        {
            let conn = pool.get()?;
            Self::init_schema(&conn)?;
        }

        tracing::debug!("Event store ready at {}", path.display());
        Ok(Self { pool, path })
    }

    /// Path of the underlying database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read interface sharing this store's pool
    pub fn query(&self) -> AnalyticsQuery {
        AnalyticsQuery::from_pool(self.pool.clone())
    }

    fn conn(&self) -> anyhow::Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Initialize database settings and run migrations
    fn init_schema(conn: &Connection) -> anyhow::Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            "#,
        )?;

        // Missing metadata table means a fresh database
        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(
                    (SELECT CAST(value AS INTEGER) FROM metadata WHERE key = 'schema_version'),
                    0
                )",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < 1 {
            Self::apply_schema_v1(conn)?;
        }

        if current_version > SCHEMA_VERSION {
            tracing::warn!(
                "Event store schema v{} is newer than this build (v{})",
                current_version,
                SCHEMA_VERSION
            );
        }

        Ok(())
    }

    /// Initial schema (v1)
    fn apply_schema_v1(conn: &Connection) -> anyhow::Result<()> {
        conn.execute_batch(
            r#"
            BEGIN;

            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT
            );

            CREATE TABLE IF NOT EXISTS usage_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id_hash TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                tool_category TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                duration_ms INTEGER CHECK (duration_ms IS NULL OR duration_ms >= 0),
                status TEXT NOT NULL CHECK (status IN ('success', 'error', 'timeout')),
                error_type TEXT,
                error_message TEXT,
                metadata TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_events_user ON usage_events(user_id_hash);
            CREATE INDEX IF NOT EXISTS idx_events_tool ON usage_events(tool_name);
            CREATE INDEX IF NOT EXISTS idx_events_timestamp ON usage_events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_events_status ON usage_events(status);
            CREATE INDEX IF NOT EXISTS idx_events_tool_timestamp
                ON usage_events(tool_name, timestamp);
            CREATE INDEX IF NOT EXISTS idx_events_user_timestamp
                ON usage_events(user_id_hash, timestamp);

            INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', '1');

            COMMIT;
            "#,
        )?;

        tracing::info!("Event store schema initialized (v1)");
        Ok(())
    }

    /// Insert one event stamped with the current time, returning its id
    pub fn insert(&self, event: &NewEvent, user_id_hash: &str) -> anyhow::Result<i64> {
        self.insert_at(event, user_id_hash, Utc::now())
    }

    /// Insert one event with an explicit timestamp
    pub(crate) fn insert_at(
        &self,
        event: &NewEvent,
        user_id_hash: &str,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO usage_events (
                user_id_hash, tool_name, tool_category, timestamp,
                duration_ms, status, error_type, error_message, metadata
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                user_id_hash,
                event.tool_name,
                event.tool_category,
                format_timestamp(timestamp),
                event.duration_ms.map(|ms| ms as i64),
                event.status.as_str(),
                event.error_type,
                event.error_message,
                event.metadata,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Fetch a single event by id
    pub fn get(&self, id: i64) -> anyhow::Result<Option<UsageEvent>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM usage_events WHERE id = ?1", EVENT_COLUMNS);
        let event = conn
            .query_row(&sql, params![id], event_from_row)
            .optional()?;
        Ok(event)
    }

    /// Total number of stored events
    pub fn count(&self) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM usage_events", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete events older than `days` days, returning how many were removed
    ///
    /// Maintenance only: invoked from the `prune` CLI command, never from
    /// ingestion or aggregation. `days == 0` is a no-op.
    pub fn prune_older_than(&self, days: u32) -> anyhow::Result<u64> {
        if days == 0 {
            return Ok(0);
        }
        let cutoff = cutoff_before(Utc::now(), days);
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM usage_events WHERE timestamp < ?1",
            params![format_timestamp(cutoff)],
        )?;
        tracing::info!("Pruned {} events older than {} days", deleted, days);
        Ok(deleted as u64)
    }
}

/// `now` minus `days`, saturating at the Unix epoch
///
/// Every stored timestamp is an insert time, so an epoch cutoff covers the
/// whole store.
pub(crate) fn cutoff_before(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    chrono::Duration::try_days(i64::from(days))
        .and_then(|window| now.checked_sub_signed(window))
        .filter(|cutoff| *cutoff > DateTime::UNIX_EPOCH)
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Canonical stored form of a timestamp
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read an RFC 3339 text column back into a UTC timestamp
pub(crate) fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a `status` column back into the enum
pub(crate) fn status_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<EventStatus> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Throwaway store in a temp directory (dir guard must outlive the store)
#[cfg(test)]
pub(crate) fn temp_store() -> (tempfile::TempDir, EventStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = EventStore::open(dir.path().join("events.db"), 2).unwrap();
    (dir, store)
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<UsageEvent> {
    Ok(UsageEvent {
        id: row.get(0)?,
        user_id_hash: row.get(1)?,
        tool_name: row.get(2)?,
        tool_category: row.get(3)?,
        timestamp: timestamp_column(row, 4)?,
        duration_ms: row.get::<_, Option<i64>>(5)?.map(|ms| ms as u64),
        status: status_column(row, 6)?,
        error_type: row.get(7)?,
        error_message: row.get(8)?,
        metadata: row.get(9)?,
    })
}
