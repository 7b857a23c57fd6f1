// Analytics endpoints - read-only views over stored usage events

use super::{run_blocking, ApiError};
use crate::server::AppState;
use crate::store::query::{ErrorLog, RetentionStats, ToolUsage, UsageSummary};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Default values
// ============================================================================

const MAX_WINDOW_DAYS: i64 = 365;
const MAX_ERROR_LIMIT: i64 = 500;

fn default_window_days() -> i64 {
    30
}

fn default_error_days() -> i64 {
    7
}

fn default_error_limit() -> i64 {
    50
}

/// Clamp a requested lookback window to 1..=365 days
fn clamp_days(days: i64) -> u32 {
    days.clamp(1, MAX_WINDOW_DAYS) as u32
}

// ============================================================================
// Query parameters
// ============================================================================

/// `?days=N` (default 30)
#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    #[serde(default = "default_window_days")]
    pub days: i64,
}

/// `?days=N&limit=M` (defaults 7 and 50, limit capped at 500)
#[derive(Debug, Deserialize)]
pub struct ErrorsQuery {
    #[serde(default = "default_error_days")]
    pub days: i64,
    #[serde(default = "default_error_limit")]
    pub limit: i64,
}

fn window(params: Result<Query<WindowQuery>, QueryRejection>) -> Result<u32, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(clamp_days(params.days))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /analytics/summary - Totals and outcome rates for the window
pub async fn summary(
    State(state): State<AppState>,
    params: Result<Query<WindowQuery>, QueryRejection>,
) -> Result<Json<UsageSummary>, ApiError> {
    let days = window(params)?;
    let query = state.query.clone();
    Ok(Json(run_blocking(move || query.summary(days)).await?))
}

/// GET /analytics/tools - Per-tool stats, busiest first
pub async fn tools(
    State(state): State<AppState>,
    params: Result<Query<WindowQuery>, QueryRejection>,
) -> Result<Json<Vec<ToolUsage>>, ApiError> {
    let days = window(params)?;
    let query = state.query.clone();
    Ok(Json(run_blocking(move || query.tool_stats(days)).await?))
}

/// GET /analytics/retention - Daily active users plus rolling 7-day count
pub async fn retention(
    State(state): State<AppState>,
    params: Result<Query<WindowQuery>, QueryRejection>,
) -> Result<Json<RetentionStats>, ApiError> {
    let days = window(params)?;
    let query = state.query.clone();
    Ok(Json(run_blocking(move || query.retention(days)).await?))
}

/// GET /analytics/errors - Most recent failed invocations
pub async fn errors(
    State(state): State<AppState>,
    params: Result<Query<ErrorsQuery>, QueryRejection>,
) -> Result<Json<ErrorLog>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let days = clamp_days(params.days);
    let limit = params.limit.clamp(0, MAX_ERROR_LIMIT) as usize;

    let query = state.query.clone();
    Ok(Json(
        run_blocking(move || query.recent_errors(days, limit)).await?,
    ))
}

/// Response for health endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub events_stored: i64,
}

/// GET /api/health - Store reachability and row count
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let store = state.store.clone();
    let events_stored = run_blocking(move || store.count()).await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        events_stored,
    }))
}
