//! Test assertions for runs and stage outputs.

use crate::context::ContextView;
use crate::controller::{RunController, RunState};
use crate::core::StageOutput;
use crate::errors::StepflowError;

/// Asserts that the output indicates success.
pub fn assert_output_succeeded(output: &StageOutput) {
    assert!(
        output.is_success(),
        "Expected success, got status: {:?} ({:?})",
        output.status,
        output.error
    );
}

/// Asserts that the output indicates failure.
pub fn assert_output_failed(output: &StageOutput) {
    assert!(
        output.is_failure(),
        "Expected failure, got status: {:?}",
        output.status
    );
}

/// Asserts that the output data holds `expected` under `key`.
pub fn assert_output_value(output: &StageOutput, key: &str, expected: &serde_json::Value) {
    let actual = output.get(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected value {expected:?} for key '{key}', got {actual:?}"
    );
}

/// Asserts that a context view holds `expected` under `key`.
pub fn assert_context_value(ctx: &ContextView, key: &str, expected: &serde_json::Value) {
    let actual = ctx.get(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected context value {expected:?} for key '{key}', got {actual:?}"
    );
}

/// Asserts a controller's state and cursor together.
pub fn assert_progress(controller: &RunController, state: RunState, cursor: usize) {
    assert_eq!(
        (controller.state(), controller.cursor()),
        (state, cursor),
        "Unexpected run progress"
    );
}

/// Asserts that an error is `NoMoreStages`.
pub fn assert_no_more_stages<T: std::fmt::Debug>(result: &Result<T, StepflowError>) {
    assert!(
        matches!(result, Err(StepflowError::NoMoreStages(_))),
        "Expected NoMoreStages, got {result:?}"
    );
}

/// Asserts that an error is a stage failure from the stage at `index`.
pub fn assert_stage_failed<T: std::fmt::Debug>(result: &Result<T, StepflowError>, index: usize) {
    assert!(
        matches!(result, Err(StepflowError::StageExecution { index: i, .. }) if *i == index),
        "Expected failure of stage {index}, got {result:?}"
    );
}
