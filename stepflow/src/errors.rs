//! Error types for the stepflow framework.
//!
//! Structured failures get their own error struct so callers can inspect
//! the details; everything funnels into [`StepflowError`].

use crate::core::RunState;
use std::collections::HashMap;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = StepflowError> = std::result::Result<T, E>;

/// The main error type for stepflow operations.
#[derive(Debug, Error)]
pub enum StepflowError {
    /// `step()` was called with the cursor already at the end.
    #[error("{0}")]
    NoMoreStages(#[from] NoMoreStagesError),

    /// A declared output key was never written by any stage.
    #[error("{0}")]
    MissingOutput(#[from] MissingOutputError),

    /// A context key was read that does not exist.
    #[error("{0}")]
    MissingKey(#[from] MissingKeyError),

    /// Declared pipeline inputs were not supplied.
    #[error("{0}")]
    MissingInputs(#[from] MissingInputsError),

    /// The pipeline definition is inconsistent.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A stage reported a failure.
    #[error("Stage '{stage}' (index {index}) failed: {message}")]
    StageExecution {
        /// Name of the failing stage.
        stage: String,
        /// Position of the failing stage in the sequence.
        index: usize,
        /// The error reported by the stage.
        message: String,
    },

    /// A snapshot descriptor could not be bound to a stage implementation.
    #[error("No stage implementation registered for '{name}' (kind '{kind}')")]
    UnknownStage {
        /// Descriptor name.
        name: String,
        /// Descriptor kind.
        kind: String,
    },

    /// A snapshot was requested while the run is executing.
    #[error("Cannot snapshot run {run_id} while it is running; pause it first")]
    SnapshotWhileRunning {
        /// The run being snapshotted.
        run_id: String,
    },

    /// `start()` was called on a run that has already left `Idle`.
    #[error("Cannot start run {run_id}: it is already {state}")]
    AlreadyStarted {
        /// The run being started.
        run_id: String,
        /// The state the run was in.
        state: RunState,
    },

    /// A lifecycle call arrived while a stage was executing.
    #[error("Run {run_id} has a step in progress")]
    StepInProgress {
        /// The run with the in-flight step.
        run_id: String,
    },

    /// A snapshot was restored against a different pipeline.
    #[error("Snapshot fingerprint {snapshot} does not match pipeline fingerprint {pipeline}")]
    SnapshotMismatch {
        /// Fingerprint recorded in the snapshot.
        snapshot: String,
        /// Fingerprint of the pipeline offered for restore.
        pipeline: String,
    },

    /// The stepper task ended abnormally (for example a panicking stage).
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StepflowError {
    /// Creates a stage execution error.
    #[must_use]
    pub fn stage_execution(
        stage: impl Into<String>,
        index: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::StageExecution {
            stage: stage.into(),
            index,
            message: message.into(),
        }
    }

    /// Returns true for errors that leave the run untouched and can simply
    /// be ignored by a caller that stops stepping.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoMoreStages(_)
                | Self::SnapshotWhileRunning { .. }
                | Self::AlreadyStarted { .. }
                | Self::StepInProgress { .. }
        )
    }
}

impl From<serde_json::Error> for StepflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for StepflowError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error raised when stepping past the last stage.
#[derive(Debug, Clone, Error)]
#[error("No more stages to execute (cursor {cursor} of {stage_count})")]
pub struct NoMoreStagesError {
    /// The cursor at the time of the call.
    pub cursor: usize,
    /// Number of stages in the pipeline.
    pub stage_count: usize,
}

impl NoMoreStagesError {
    /// Creates a new error.
    #[must_use]
    pub fn new(cursor: usize, stage_count: usize) -> Self {
        Self {
            cursor,
            stage_count,
        }
    }
}

/// Error raised when declared outputs are absent at completion.
#[derive(Debug, Clone, Error)]
#[error("Pipeline completed without producing declared outputs: {}", missing.join(", "))]
pub struct MissingOutputError {
    /// The declared output keys that were never written.
    pub missing: Vec<String>,
}

impl MissingOutputError {
    /// Creates a new missing output error.
    #[must_use]
    pub fn new(missing: Vec<String>) -> Self {
        Self { missing }
    }
}

/// Error raised when a context key is absent.
#[derive(Debug, Clone, Error)]
#[error("Context key '{key}' is not set")]
pub struct MissingKeyError {
    /// The missing key.
    pub key: String,
}

impl MissingKeyError {
    /// Creates a new missing key error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Error raised when a run is started without its declared inputs.
#[derive(Debug, Clone, Error)]
#[error("Missing pipeline inputs for '{pipeline}': {}", missing.join(", "))]
pub struct MissingInputsError {
    /// The pipeline name.
    pub pipeline: String,
    /// Declared inputs that were not supplied.
    pub missing: Vec<String>,
}

impl MissingInputsError {
    /// Creates a new missing inputs error.
    #[must_use]
    pub fn new(pipeline: impl Into<String>, missing: Vec<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            missing,
        }
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert(
            "message".to_string(),
            serde_json::Value::String(self.message.clone()),
        );
        map.insert(
            "stages".to_string(),
            serde_json::Value::Array(
                self.stages
                    .iter()
                    .map(|s| serde_json::Value::String(s.clone()))
                    .collect(),
            ),
        );
        map
    }
}
