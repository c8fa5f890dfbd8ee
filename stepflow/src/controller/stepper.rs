//! The background loop that drives a controller to completion.

use super::RunController;
use crate::errors::StepflowError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Repeatedly waits on the gate, steps, then yields for a fixed delay.
///
/// The loop never calls `start`; the controller must already be running
/// (or will be resumed later) for it to make progress.
#[derive(Debug, Clone)]
pub struct StepperLoop {
    controller: Arc<RunController>,
    step_delay: Duration,
}

impl StepperLoop {
    /// Creates a loop using the pipeline's configured step delay.
    #[must_use]
    pub fn new(controller: Arc<RunController>) -> Self {
        let step_delay = controller.pipeline().config().step_delay();
        Self {
            controller,
            step_delay,
        }
    }

    /// Overrides the post-step delay.
    #[must_use]
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Returns the controller this loop drives.
    #[must_use]
    pub fn controller(&self) -> &Arc<RunController> {
        &self.controller
    }

    /// Runs until every stage has executed, then returns the declared
    /// outputs.
    ///
    /// # Errors
    ///
    /// Propagates the first stage failure unchanged, or `MissingOutput`
    /// if a declared output was never written.
    pub async fn run(self) -> Result<HashMap<String, serde_json::Value>, StepflowError> {
        let run_id = self.controller.run_id();
        debug!(%run_id, delay_ms = self.step_delay.as_millis() as u64, "Stepper loop started");

        while !self.controller.is_completed() {
            self.controller.wait_until_running().await;
            if self.controller.is_completed() {
                break;
            }

            // A pause may land between the gate opening and the step lock.
            if self.controller.step_if_running().await?.is_none() {
                continue;
            }

            if self.step_delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.step_delay).await;
            }
        }

        info!(%run_id, "Stepper loop finished");
        self.controller.outputs()
    }
}
