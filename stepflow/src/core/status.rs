//! Stage and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome of a single stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage completed and its data should be merged.
    #[default]
    Ok,
    /// Stage failed; nothing is merged.
    Fail,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail)
    }
}

/// Lifecycle state of a run.
///
/// ```text
/// Idle --start--> Running --pause--> Paused --resume--> Running
/// Running --last step--> Completed
/// ```
///
/// `Completed` is terminal: pause and resume are no-ops once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Constructed but never started.
    #[default]
    Idle,
    /// Permitted to advance.
    Running,
    /// Holding before the next stage.
    Paused,
    /// Every stage has run.
    Completed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl RunState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if the stepper is allowed to start the next stage.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}
