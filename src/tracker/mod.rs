//! Execution tracking for skills
//!
//! Wraps a unit of work, measures how long it ran and whether it failed, and
//! emits exactly one event per invocation through an [`EventSink`].
//!
//! ```text
//! Tracker::track(name, f, input, ctx)
//!     │
//!     ├──→ f(input, ctx).await ──→ Ok(value) / Err(e)   (returned untouched)
//!     │
//!     └──→ TrackRequest ──→ EventSink::submit
//!                              ├── Detached: tokio::spawn, not awaited
//!                              └── Await: awaited, bounded by timeout
//! ```
//!
//! Tracking never changes what the caller observes. Sink errors, timeouts and
//! panics are logged and counted in [`TrackerMetrics`], then dropped.

pub mod sink;

pub use sink::{EventSink, HttpSink, StoreSink};

use crate::config::TrackerConfig;
use crate::events::{EventStatus, TrackRequest};
use crate::util::short_type_name;
use futures::FutureExt;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How the tracker hands events to its sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubmitMode {
    /// Spawn the submission and return immediately
    #[default]
    Detached,
    /// Await the submission (bounded by the tracker's timeout) before returning
    Await,
}

// ─────────────────────────────────────────────────────────────────────────────
// Metrics
// ─────────────────────────────────────────────────────────────────────────────

/// Counters describing the tracker's own delivery health
#[derive(Debug, Default)]
pub struct TrackerMetrics {
    /// Events handed to the sink
    pub submitted: AtomicU64,
    /// Sink reported success
    pub delivered: AtomicU64,
    /// Sink returned an error (or no runtime was available)
    pub failed: AtomicU64,
    /// Sink did not finish within the submit timeout
    pub timed_out: AtomicU64,
    /// Sink panicked
    pub panicked: AtomicU64,
}

/// Point-in-time copy of [`TrackerMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerMetricsSnapshot {
    pub submitted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub panicked: u64,
}

impl TrackerMetrics {
    pub fn snapshot(&self) -> TrackerMetricsSnapshot {
        TrackerMetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tracker
// ─────────────────────────────────────────────────────────────────────────────

/// Measures skill executions and reports them to a sink
///
/// Cheap to clone; clones share the sink and the metrics.
#[derive(Clone)]
pub struct Tracker {
    sink: Arc<dyn EventSink>,
    mode: SubmitMode,
    timeout: Duration,
    category: Option<String>,
    metrics: Arc<TrackerMetrics>,
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("sink", &self.sink.name())
            .field("mode", &self.mode)
            .field("timeout", &self.timeout)
            .field("category", &self.category)
            .finish()
    }
}

impl Tracker {
    /// Detached tracker with a 2s submit timeout
    pub fn new(sink: impl EventSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
            mode: SubmitMode::Detached,
            timeout: Duration::from_secs(2),
            category: None,
            metrics: Arc::new(TrackerMetrics::default()),
        }
    }

    /// Tracker posting to the configured endpoint over HTTP
    pub fn from_config(config: &TrackerConfig, identity: Option<String>) -> anyhow::Result<Self> {
        let sink = HttpSink::new(&config.endpoint, identity, config.submit_timeout())?;
        let mode = if config.detached {
            SubmitMode::Detached
        } else {
            SubmitMode::Await
        };
        Ok(Self::new(sink)
            .with_mode(mode)
            .with_timeout(config.submit_timeout()))
    }

    pub fn with_mode(mut self, mode: SubmitMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Category stamped on every event (server default applies otherwise)
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn mode(&self) -> SubmitMode {
        self.mode
    }

    pub fn metrics(&self) -> &TrackerMetrics {
        &self.metrics
    }

    /// Start building a tracked invocation with optional strategies
    pub fn skill<O, E>(&self, name: impl Into<String>) -> SkillRun<'_, O, E> {
        SkillRun {
            tracker: self,
            name: name.into(),
            count: None,
            classify: None,
        }
    }

    /// Run `f(input, ctx)` and report it under `name`
    ///
    /// Returns exactly what `f` returned.
    pub async fn track<F, Fut, I, C, O, E>(
        &self,
        name: impl Into<String>,
        f: F,
        input: I,
        ctx: C,
    ) -> Result<O, E>
    where
        F: FnOnce(I, C) -> Fut,
        Fut: Future<Output = Result<O, E>>,
        I: Serialize,
        E: fmt::Display,
    {
        self.skill(name).run(f, input, ctx).await
    }

    async fn submit(&self, event: TrackRequest) {
        self.metrics.submitted.fetch_add(1, Ordering::Relaxed);

        let delivery = deliver(
            Arc::clone(&self.sink),
            Arc::clone(&self.metrics),
            event,
            self.timeout,
        );

        match self.mode {
            SubmitMode::Await => delivery.await,
            SubmitMode::Detached => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(delivery);
                }
                Err(_) => {
                    self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("No tokio runtime for detached submission, event dropped");
                }
            },
        }
    }
}

/// Hand one event to the sink, absorbing every kind of failure
async fn deliver(
    sink: Arc<dyn EventSink>,
    metrics: Arc<TrackerMetrics>,
    event: TrackRequest,
    timeout: Duration,
) {
    let tool = event.tool_name.clone().unwrap_or_default();

    let submission = match std::panic::catch_unwind(AssertUnwindSafe(|| sink.submit(event))) {
        Ok(fut) => fut,
        Err(_) => {
            metrics.panicked.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(sink = sink.name(), tool = %tool, "Event sink panicked");
            return;
        }
    };

    match tokio::time::timeout(timeout, AssertUnwindSafe(submission).catch_unwind()).await {
        Ok(Ok(Ok(()))) => {
            metrics.delivered.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(sink = sink.name(), tool = %tool, "Event delivered");
        }
        Ok(Ok(Err(e))) => {
            metrics.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(sink = sink.name(), tool = %tool, error = %e, "Event submission failed");
        }
        Ok(Err(_)) => {
            metrics.panicked.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(sink = sink.name(), tool = %tool, "Event sink panicked");
        }
        Err(_) => {
            metrics.timed_out.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                sink = sink.name(),
                tool = %tool,
                timeout_ms = timeout.as_millis() as u64,
                "Event submission timed out"
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

type CountFn<'t, O> = Box<dyn Fn(&O) -> Option<u64> + Send + Sync + 't>;
type ClassifyFn<'t, E> = Box<dyn Fn(&E) -> String + Send + Sync + 't>;

/// One tracked invocation, configured before it runs
pub struct SkillRun<'t, O, E> {
    tracker: &'t Tracker,
    name: String,
    count: Option<CountFn<'t, O>>,
    classify: Option<ClassifyFn<'t, E>>,
}

impl<'t, O, E> SkillRun<'t, O, E> {
    /// Extract a result count (e.g. number of matches) recorded as `result_count`
    pub fn count(mut self, extractor: impl Fn(&O) -> Option<u64> + Send + Sync + 't) -> Self {
        self.count = Some(Box::new(extractor));
        self
    }

    /// Override the recorded `error_type` (default: the error's type name)
    pub fn classify(mut self, classifier: impl Fn(&E) -> String + Send + Sync + 't) -> Self {
        self.classify = Some(Box::new(classifier));
        self
    }

    /// Execute `f(input, ctx)`, report it, and return its result unchanged
    pub async fn run<F, Fut, I, C>(self, f: F, input: I, ctx: C) -> Result<O, E>
    where
        F: FnOnce(I, C) -> Fut,
        Fut: Future<Output = Result<O, E>>,
        I: Serialize,
        E: fmt::Display,
    {
        let parameters = parameter_names(&input);

        let start = Instant::now();
        let outcome = f(input, ctx).await;
        let duration_ms = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);

        let event = match &outcome {
            Ok(value) => self.success_event(duration_ms, parameters, value),
            Err(err) => self.error_event(duration_ms, parameters, err),
        };
        self.tracker.submit(event).await;

        outcome
    }

    fn base_event(&self, status: EventStatus, duration_ms: i64) -> TrackRequest {
        TrackRequest {
            tool_name: Some(self.name.clone()),
            tool_category: self.tracker.category.clone(),
            duration_ms: Some(duration_ms),
            status: Some(status.as_str().to_string()),
            ..Default::default()
        }
    }

    fn success_event(&self, duration_ms: i64, parameters: Vec<String>, value: &O) -> TrackRequest {
        let mut metadata = serde_json::Map::new();
        metadata.insert("parameters".into(), parameters.into());
        if let Some(n) = self.count.as_ref().and_then(|extract| extract(value)) {
            metadata.insert("result_count".into(), n.into());
        }

        TrackRequest {
            metadata: Some(serde_json::Value::Object(metadata)),
            ..self.base_event(EventStatus::Success, duration_ms)
        }
    }

    fn error_event(&self, duration_ms: i64, parameters: Vec<String>, err: &E) -> TrackRequest
    where
        E: fmt::Display,
    {
        let error_type = match &self.classify {
            Some(classify) => classify(err),
            None => short_type_name::<E>().to_string(),
        };

        let mut metadata = serde_json::Map::new();
        metadata.insert("parameters".into(), parameters.into());

        TrackRequest {
            error_type: Some(error_type),
            error_message: Some(err.to_string()),
            metadata: Some(serde_json::Value::Object(metadata)),
            ..self.base_event(EventStatus::Error, duration_ms)
        }
    }
}

/// Names (never values) of the input's fields, sorted
///
/// Inputs that don't serialize to a JSON object contribute no names.
fn parameter_names<I: Serialize>(input: &I) -> Vec<String> {
    match serde_json::to_value(input) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().map(|(k, _)| k).collect(),
        _ => Vec::new(),
    }
}
