//! Ingestion path: validate → hash identity → insert
//!
//! Shared by the `/api/track` handler and the tracker's in-process
//! `StoreSink`, so both entry points apply the same defaults and checks.

use crate::events::{NewEvent, TrackRequest, ValidationError};
use crate::hashing::hash_identifier;
use crate::store::EventStore;
use crate::util::truncate_utf8_safe;
use std::fmt;

/// Per-deployment ingestion settings
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Category applied when a request carries none
    pub default_category: String,
    /// Upper bound on stored `error_message` size (bytes)
    pub max_error_message_len: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            default_category: "default".to_string(),
            max_error_message_len: 4096,
        }
    }
}

/// Result of a successful ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
    pub id: i64,
    pub user_id_hash: String,
}

/// Why ingestion failed
#[derive(Debug)]
pub enum IngestError {
    /// Request rejected before touching the store
    Validation(ValidationError),
    /// Store unavailable or write failed
    Persistence(anyhow::Error),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "invalid event: {}", e),
            Self::Persistence(e) => write!(f, "failed to store event: {:#}", e),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<ValidationError> for IngestError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

/// Validate a raw request and insert it on behalf of `identity`
///
/// The identity is hashed here; the clear value never reaches the store.
pub fn ingest(
    store: &EventStore,
    request: TrackRequest,
    identity: &str,
    options: &IngestOptions,
) -> Result<IngestReceipt, IngestError> {
    let mut event = request.validate(&options.default_category)?;
    cap_error_message(&mut event, options.max_error_message_len);

    let user_id_hash = hash_identifier(identity);
    let id = store
        .insert(&event, &user_id_hash)
        .map_err(IngestError::Persistence)?;

    tracing::debug!(
        id,
        tool = %event.tool_name,
        status = %event.status,
        duration_ms = ?event.duration_ms,
        "Event ingested"
    );

    Ok(IngestReceipt { id, user_id_hash })
}

fn cap_error_message(event: &mut NewEvent, max_len: usize) {
    if let Some(msg) = event.error_message.as_mut() {
        if msg.len() > max_len {
            let truncated = truncate_utf8_safe(msg, max_len).to_string();
            *msg = truncated;
        }
    }
}
