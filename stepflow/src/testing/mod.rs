//! Testing utilities for stepflow pipelines.
//!
//! This module provides:
//! - Mock stages that record, fail or sleep
//! - Ready-made pipelines
//! - Assertions for outputs and run progress

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{
    assert_context_value, assert_no_more_stages, assert_output_failed, assert_output_succeeded,
    assert_output_value, assert_progress, assert_stage_failed,
};
pub use fixtures::{counting_pipeline, eggs_inputs, eggs_pipeline, eggs_pipeline_with_sink, fast_config};
pub use mocks::{FailingStage, RecordingStage, SlowStage};
