//! Destinations for run lifecycle events.
//!
//! The controller reports every transition (`run.started`, `run.paused`,
//! `stage.completed`, ...) through an [`EventSink`]. Payloads are JSON
//! objects that always carry `run_id` and `pipeline`; the per-event fields
//! are listed in [`event_types`](super::event_types).

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, Level};

/// Receiver for controller events.
///
/// The controller calls [`try_emit`](Self::try_emit) synchronously, at
/// times while holding its step lock. Implementations must return quickly
/// and must not call back into the controller.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers an event, awaiting any I/O the sink needs.
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Delivers an event from synchronous code. Infallible: a sink that
    /// cannot deliver drops the event.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Drops every event. Pipelines use it until a sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes each event as a `tracing` record at a fixed level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self::info()
    }
}

impl LoggingEventSink {
    /// Logs at `level`. Anything other than `DEBUG` is logged at `INFO`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Per-stage tracing during development.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// The default: one `INFO` line per transition.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn record(&self, event_type: &str, data: Option<&Value>) {
        if self.level == Level::DEBUG {
            debug!(event_type, payload = ?data, "Run event");
        } else {
            info!(event_type, payload = ?data, "Run event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data.as_ref());
    }
}

/// Keeps every event in memory, in emission order.
///
/// Meant for tests that assert on the sequence of transitions a run went
/// through, or on a single payload:
///
/// ```rust,ignore
/// let sink = Arc::new(CollectingEventSink::new());
/// let pipeline = builder.event_sink(sink.clone()).build()?;
/// // ... drive the run ...
/// let done = sink.events_of_type("stage.completed");
/// ```
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<(String, Option<Value>)>>,
}

impl CollectingEventSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded `(event_type, payload)` pair.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<Value>)> {
        self.events.read().clone()
    }

    /// Just the event types, for asserting on transition order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Number of events recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// True before the first event.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Events whose type starts with `prefix`; `"stage."` selects every
    /// stage event, `"run.paused"` a single kind.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<(String, Option<Value>)> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn push(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.push(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.push(event_type, data);
    }
}
