//! Shared state handed to every request handler

use crate::ingest::IngestOptions;
use crate::store::{AnalyticsQuery, EventStore};
use std::sync::Arc;

/// Shared state for the telemetry server
///
/// All cross-request state lives in SQLite; this only carries handles.
#[derive(Clone)]
pub struct AppState {
    /// Write path (ingestion, health)
    pub(crate) store: EventStore,
    /// Read path (analytics views)
    pub(crate) query: AnalyticsQuery,
    /// Defaults and limits applied on ingestion
    pub(crate) ingest: Arc<IngestOptions>,
}

impl AppState {
    pub fn new(store: EventStore, ingest: IngestOptions) -> Self {
        let query = store.query();
        Self {
            store,
            query,
            ingest: Arc::new(ingest),
        }
    }
}
