//! Event sink system for observability.
//!
//! The controller reports every state transition and step outcome to an
//! [`EventSink`]. Sinks never influence control flow.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the run controller.
pub mod event_types {
    /// A run was started from cursor zero. Carries `stages`.
    pub const RUN_STARTED: &str = "run.started";
    /// The gate was closed. Carries `cursor`.
    pub const RUN_PAUSED: &str = "run.paused";
    /// The gate was opened. Carries `cursor`.
    pub const RUN_RESUMED: &str = "run.resumed";
    /// The last stage finished. Carries `stages`.
    pub const RUN_COMPLETED: &str = "run.completed";
    /// A snapshot was captured. Carries `cursor` and `state`.
    pub const RUN_SNAPSHOT: &str = "run.snapshot";
    /// A controller was rebuilt from a snapshot. Carries `cursor` and `state`.
    pub const RUN_RESTORED: &str = "run.restored";
    /// A stage finished and its output was merged. Carries `index`,
    /// `stage`, `keys`, `duration_ms` and the stage's `metadata`.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage reported a failure. Carries `index`, `stage` and `error`.
    pub const STAGE_FAILED: &str = "stage.failed";
}
