//! Event sinks: where the tracker delivers finished events
//!
//! ```text
//! Tracker ──→ EventSink::submit(TrackRequest)
//!               ├──→ HttpSink   POST {endpoint}/api/track
//!               └──→ StoreSink  ingest() on the blocking pool
//! ```
//!
//! Sinks report failure through their `Result`; the tracker decides what to
//! do with it (log, count, discard).

use crate::events::TrackRequest;
use crate::ingest::{ingest, IngestOptions};
use crate::store::EventStore;
use anyhow::Context;
use futures::future::BoxFuture;
use std::time::Duration;

/// Destination for tracker events
///
/// `submit` takes the event by value and returns a `'static` future so the
/// tracker can either await it or hand it to `tokio::spawn`.
pub trait EventSink: Send + Sync {
    /// Human-readable name for logging
    fn name(&self) -> &'static str;

    /// Deliver one event
    fn submit(&self, event: TrackRequest) -> BoxFuture<'static, anyhow::Result<()>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Posts events to a remote ingestion server
#[derive(Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    identity: Option<String>,
}

impl HttpSink {
    /// Build a sink targeting `{endpoint}/api/track`
    ///
    /// `identity` is sent as `x-session-id`; without it the server falls back
    /// to its own identity resolution (authorization, ip + user agent).
    pub fn new(
        endpoint: &str,
        identity: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(2)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: format!("{}/api/track", endpoint.trim_end_matches('/')),
            identity,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl EventSink for HttpSink {
    fn name(&self) -> &'static str {
        "http"
    }

    fn submit(&self, event: TrackRequest) -> BoxFuture<'static, anyhow::Result<()>> {
        let mut request = self.client.post(&self.url).json(&event);
        if let Some(identity) = &self.identity {
            request = request.header("x-session-id", identity);
        }
        let url = self.url.clone();

        Box::pin(async move {
            let response = request
                .send()
                .await
                .with_context(|| format!("POST {} failed", url))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("POST {} returned {}: {}", url, status, body);
            }
            Ok(())
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-process store
// ─────────────────────────────────────────────────────────────────────────────

/// Writes events straight into a local `EventStore`
#[derive(Clone)]
pub struct StoreSink {
    store: EventStore,
    identity: String,
    options: IngestOptions,
}

impl StoreSink {
    pub fn new(store: EventStore, identity: impl Into<String>, options: IngestOptions) -> Self {
        Self {
            store,
            identity: identity.into(),
            options,
        }
    }
}

impl EventSink for StoreSink {
    fn name(&self) -> &'static str {
        "store"
    }

    fn submit(&self, event: TrackRequest) -> BoxFuture<'static, anyhow::Result<()>> {
        let sink = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                ingest(&sink.store, event, &sink.identity, &sink.options)
            })
            .await
            .context("store sink task failed")??;
            Ok(())
        })
    }
}
