// Ingestion endpoint - POST /api/track

use super::ApiError;
use crate::events::TrackRequest;
use crate::ingest::{ingest, IngestError};
use crate::server::helpers::resolve_identity;
use crate::server::AppState;
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;

/// Successful ingestion response
#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub success: bool,
    pub message: String,
    pub id: i64,
}

/// POST /api/track - Validate and store one usage event
///
/// 400 on validation failure (including malformed JSON), 500 when the store
/// cannot be written.
pub async fn track_event(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<TrackRequest>, JsonRejection>,
) -> Result<Json<TrackResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let identity = resolve_identity(&headers, peer.map(|ConnectInfo(addr)| addr));

    let store = state.store.clone();
    let options = state.ingest.clone();
    let receipt = tokio::task::spawn_blocking(move || ingest(&store, request, &identity, &options))
        .await
        .map_err(|e| ApiError::Internal(format!("Worker task failed: {}", e)))?
        .map_err(|e| match e {
            IngestError::Validation(v) => ApiError::BadRequest(v.to_string()),
            IngestError::Persistence(p) => {
                ApiError::Internal(format!("Failed to store event: {:#}", p))
            }
        })?;

    Ok(Json(TrackResponse {
        success: true,
        message: "Event tracked".to_string(),
        id: receipt.id,
    }))
}
