//! Handle to a launched run.

use crate::controller::{RunController, RunState, StepperLoop};
use crate::errors::StepflowError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A run whose stepper loop is executing on a background task.
///
/// Dropping the handle does not stop the loop. Call [`pause`](Self::pause)
/// to hold it before the next stage; the stage already executing always
/// runs to completion.
#[derive(Debug)]
pub struct RunHandle {
    controller: Arc<RunController>,
    task: JoinHandle<Result<HashMap<String, serde_json::Value>, StepflowError>>,
}

impl RunHandle {
    pub(crate) fn spawn(stepper: StepperLoop) -> Self {
        let controller = Arc::clone(stepper.controller());
        let task = tokio::spawn(stepper.run());
        Self { controller, task }
    }

    /// Returns the controller driving this run.
    #[must_use]
    pub fn controller(&self) -> &Arc<RunController> {
        &self.controller
    }

    /// Holds the loop before its next stage.
    pub fn pause(&self) {
        self.controller.pause();
    }

    /// Lets the loop continue.
    pub fn resume(&self) {
        self.controller.resume();
    }

    /// Alias for [`resume`](Self::resume).
    pub fn play(&self) {
        self.controller.play();
    }

    /// Returns the current run state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.controller.state()
    }

    /// Returns true once the loop task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the loop to finish and returns the declared outputs.
    ///
    /// # Errors
    ///
    /// Whatever the loop returned, or `Internal` if a stage panicked.
    pub async fn join(self) -> Result<HashMap<String, serde_json::Value>, StepflowError> {
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(StepflowError::Internal(format!("stepper task failed: {err}"))),
        }
    }
}
