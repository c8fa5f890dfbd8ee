//! Serializable captures of a paused or completed run.
//!
//! A snapshot holds everything needed to continue a run elsewhere: the
//! stage descriptors, the accumulated context and the cursor. The run gate
//! is deliberately absent; restoring always yields a controller that waits
//! for an explicit resume.

use crate::errors::{PipelineValidationError, StepflowError};
use crate::stages::StageDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// The run state as far as resuming is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotState {
    /// Stages remain; the restored run waits for resume or step.
    Paused,
    /// Every stage has run.
    Completed,
}

impl fmt::Display for SnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// A point-in-time capture of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version.
    pub version: u32,
    /// Identifier of the captured run.
    pub run_id: Uuid,
    /// Name of the pipeline.
    pub pipeline_name: String,
    /// Fingerprint of the ordered stage sequence.
    pub fingerprint: String,
    /// Ordered stage descriptors.
    pub stages: Vec<StageDescriptor>,
    /// Declared pipeline inputs.
    #[serde(default)]
    pub input_variables: Vec<String>,
    /// Declared pipeline outputs.
    #[serde(default)]
    pub output_variables: Vec<String>,
    /// The inputs the run was started with.
    #[serde(default)]
    pub inputs: HashMap<String, serde_json::Value>,
    /// The accumulated context.
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    /// Index of the next stage to run.
    pub cursor: usize,
    /// Paused or completed.
    pub state: SnapshotState,
    /// When the snapshot was taken.
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Number of stages in the captured sequence.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the captured run had finished.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == SnapshotState::Completed
    }

    /// Number of stages still to run.
    #[must_use]
    pub fn remaining_stages(&self) -> usize {
        self.stages.len().saturating_sub(self.cursor)
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Fails on an unknown version, a cursor past the end, or a state that
    /// disagrees with the cursor.
    pub fn validate(&self) -> Result<(), StepflowError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(PipelineValidationError::new(format!(
                "Unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            ))
            .into());
        }
        if self.cursor > self.stages.len() {
            return Err(PipelineValidationError::new(format!(
                "Snapshot cursor {} exceeds stage count {}",
                self.cursor,
                self.stages.len()
            ))
            .into());
        }
        let at_end = self.cursor == self.stages.len();
        if at_end != self.is_completed() {
            return Err(PipelineValidationError::new(format!(
                "Snapshot state '{}' disagrees with cursor {} of {}",
                self.state,
                self.cursor,
                self.stages.len()
            ))
            .into());
        }
        Ok(())
    }

    /// Serializes to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a context value cannot be encoded.
    pub fn to_json(&self) -> Result<String, StepflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a JSON snapshot.
    ///
    /// # Errors
    ///
    /// Returns a serialization error on malformed input.
    pub fn from_json(raw: &str) -> Result<Self, StepflowError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Serializes to YAML.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a context value cannot be encoded.
    pub fn to_yaml(&self) -> Result<String, StepflowError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parses a YAML snapshot.
    ///
    /// # Errors
    ///
    /// Returns a serialization error on malformed input.
    pub fn from_yaml(raw: &str) -> Result<Self, StepflowError> {
        Ok(serde_yaml::from_str(raw)?)
    }
}
