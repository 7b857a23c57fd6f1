// HTTP API module - ingestion and analytics endpoints
//
// POST /api/track        accept one usage event
// GET  /api/health       liveness + stored event count
// GET  /analytics/*      read-only aggregation views for the dashboard
//
// Every handler answers JSON. Failures share one body shape:
// {"success": false, "error": "..."}

mod analytics;
mod track;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

pub use analytics::{errors, health, retention, summary, tools, ErrorsQuery, WindowQuery};
pub use track::{track_event, TrackResponse};

/// API error responses
/// Converted to HTTP status codes via IntoResponse
#[derive(Debug)]
pub enum ApiError {
    Internal(String),
    BadRequest(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        if status.is_server_error() {
            tracing::error!("API error: {} - {}", status, message);
        } else {
            tracing::debug!("API rejection: {} - {}", status, message);
        }

        let body = ErrorBody {
            success: false,
            error: message,
        };
        (status, Json(body)).into_response()
    }
}

/// Run blocking store work off the async runtime
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("Worker task failed: {}", e)))?
        .map_err(|e| ApiError::Internal(format!("{:#}", e)))
}
