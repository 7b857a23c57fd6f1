//! Aggregation queries over the usage event store
//!
//! Read-only views consumed by the dashboard endpoints. Every view is a pure
//! function of its window/limit arguments and the current table contents, so
//! two calls with no intervening writes return identical results (all
//! orderings carry a deterministic tiebreak).
//!
//! Each public view has an `_at` twin taking an explicit "now"; the plain
//! version uses the wall clock.

use super::{cutoff_before, format_timestamp, timestamp_column, EventStore};
use crate::util::percentage;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Rolling window for the weekly active user count
const WEEKLY_WINDOW_DAYS: u32 = 7;

/// Overall usage over a lookback window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub period_days: u32,
    pub total_invocations: i64,
    pub unique_users: i64,
    /// Mean over events that reported a duration (0 when none did)
    pub avg_duration_ms: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub timeout_count: i64,
    /// Percentage with two decimals, e.g. "87.50"
    pub success_rate: String,
    pub error_rate: String,
}

/// Usage breakdown for a single tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUsage {
    pub tool_name: String,
    pub tool_category: String,
    pub invocations: i64,
    pub unique_users: i64,
    pub avg_duration_ms: i64,
    pub success_rate: String,
    pub error_rate: String,
    pub last_used: DateTime<Utc>,
}

/// Distinct users seen on one calendar date (UTC)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActiveUsers {
    /// `YYYY-MM-DD`
    pub date: String,
    pub users: i64,
}

/// Daily and weekly active user counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionStats {
    pub period_days: u32,
    /// Newest date first
    pub daily_active_users: Vec<DailyActiveUsers>,
    /// Distinct users over the 7 days before now, independent of `period_days`
    pub weekly_active_users: i64,
}

/// One failed invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub id: i64,
    pub tool_name: String,
    pub tool_category: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

/// Recent errors, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLog {
    pub errors: Vec<ErrorEntry>,
    pub count: usize,
}

/// Query interface for the usage event store
///
/// # Example
///
/// ```rust,no_run
/// use skilltrace::store::AnalyticsQuery;
///
/// # fn main() -> anyhow::Result<()> {
/// let query = AnalyticsQuery::open("./data/skilltrace.db")?;
/// for tool in query.tool_stats(30)? {
///     println!("{}: {} calls ({}% ok)", tool.tool_name, tool.invocations, tool.success_rate);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AnalyticsQuery {
    pool: Pool<SqliteConnectionManager>,
}

impl AnalyticsQuery {
    /// Open a read interface on an existing store file
    ///
    /// Goes through `EventStore::open` so a fresh path still gets a schema.
    pub fn open(db_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(EventStore::open(db_path, 4)?.query())
    }

    pub(super) fn from_pool(pool: Pool<SqliteConnectionManager>) -> Self {
        Self { pool }
    }

    fn conn(&self) -> anyhow::Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Totals, distinct users, mean duration and outcome rates
    pub fn summary(&self, days: u32) -> anyhow::Result<UsageSummary> {
        self.summary_at(days, Utc::now())
    }

    pub fn summary_at(&self, days: u32, now: DateTime<Utc>) -> anyhow::Result<UsageSummary> {
        let conn = self.conn()?;

        let (total, unique_users, avg_duration, success, errors, timeouts): (
            i64,
            i64,
            Option<f64>,
            i64,
            i64,
            i64,
        ) = conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COUNT(DISTINCT user_id_hash),
                AVG(duration_ms),
                COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'timeout' THEN 1 ELSE 0 END), 0)
            FROM usage_events
            WHERE timestamp >= ?1
            "#,
            params![window_start(now, days)],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )?;

        Ok(UsageSummary {
            period_days: days,
            total_invocations: total,
            unique_users,
            avg_duration_ms: round_ms(avg_duration),
            success_count: success,
            error_count: errors,
            timeout_count: timeouts,
            success_rate: percentage(success, total),
            error_rate: percentage(errors, total),
        })
    }

    /// Per-tool metrics, most used first (ties by name)
    pub fn tool_stats(&self, days: u32) -> anyhow::Result<Vec<ToolUsage>> {
        self.tool_stats_at(days, Utc::now())
    }

    pub fn tool_stats_at(&self, days: u32, now: DateTime<Utc>) -> anyhow::Result<Vec<ToolUsage>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT
                tool_name,
                MAX(tool_category),
                COUNT(*) AS invocations,
                COUNT(DISTINCT user_id_hash),
                AVG(duration_ms),
                SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END),
                MAX(timestamp)
            FROM usage_events
            WHERE timestamp >= ?1
            GROUP BY tool_name
            ORDER BY invocations DESC, tool_name ASC
            "#,
        )?;

        let rows = stmt.query_map(params![window_start(now, days)], |row| {
            let invocations: i64 = row.get(2)?;
            let success: i64 = row.get(5)?;
            let errors: i64 = row.get(6)?;
            Ok(ToolUsage {
                tool_name: row.get(0)?,
                tool_category: row.get(1)?,
                invocations,
                unique_users: row.get(3)?,
                avg_duration_ms: round_ms(row.get(4)?),
                success_rate: percentage(success, invocations),
                error_rate: percentage(errors, invocations),
                last_used: timestamp_column(row, 7)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Daily distinct users over the window plus the rolling weekly count
    pub fn retention(&self, days: u32) -> anyhow::Result<RetentionStats> {
        self.retention_at(days, Utc::now())
    }

    pub fn retention_at(&self, days: u32, now: DateTime<Utc>) -> anyhow::Result<RetentionStats> {
        let conn = self.conn()?;

        let mut daily = Vec::new();
        {
            let mut stmt = conn.prepare(
                r#"
                SELECT
                    substr(timestamp, 1, 10) AS day,
                    COUNT(DISTINCT user_id_hash)
                FROM usage_events
                WHERE timestamp >= ?1
                GROUP BY day
                ORDER BY day DESC
                "#,
            )?;
            let rows = stmt.query_map(params![window_start(now, days)], |row| {
                Ok(DailyActiveUsers {
                    date: row.get(0)?,
                    users: row.get(1)?,
                })
            })?;
            for row in rows {
                daily.push(row?);
            }
        }

        let weekly_active_users: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT user_id_hash) FROM usage_events WHERE timestamp >= ?1",
            params![window_start(now, WEEKLY_WINDOW_DAYS)],
            |row| row.get(0),
        )?;

        Ok(RetentionStats {
            period_days: days,
            daily_active_users: daily,
            weekly_active_users,
        })
    }

    /// Most recent error events within the window, at most `limit`
    pub fn recent_errors(&self, days: u32, limit: usize) -> anyhow::Result<ErrorLog> {
        self.recent_errors_at(days, limit, Utc::now())
    }

    pub fn recent_errors_at(
        &self,
        days: u32,
        limit: usize,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ErrorLog> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, tool_name, tool_category, timestamp, duration_ms, error_type, error_message
            FROM usage_events
            WHERE status = 'error' AND timestamp >= ?1
            ORDER BY timestamp DESC, id DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![window_start(now, days), limit as i64], |row| {
            Ok(ErrorEntry {
                id: row.get(0)?,
                tool_name: row.get(1)?,
                tool_category: row.get(2)?,
                timestamp: timestamp_column(row, 3)?,
                duration_ms: row.get::<_, Option<i64>>(4)?.map(|ms| ms as u64),
                error_type: row.get(5)?,
                error_message: row.get(6)?,
            })
        })?;

        let mut errors = Vec::new();
        for row in rows {
            errors.push(row?);
        }
        let count = errors.len();
        Ok(ErrorLog { errors, count })
    }
}

/// Inclusive lower bound of a `days`-long window ending at `now`
fn window_start(now: DateTime<Utc>, days: u32) -> String {
    format_timestamp(cutoff_before(now, days))
}

fn round_ms(avg: Option<f64>) -> i64 {
    avg.map(|v| v.round() as i64).unwrap_or(0)
}
