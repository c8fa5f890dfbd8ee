//! Core domain model types for stepflow.
//!
//! This module contains the fundamental types used throughout the framework:
//! - Stage and run status enums
//! - Stage output type with factory methods

mod output;
mod status;

pub use output::StageOutput;
pub use status::{RunState, StageStatus};
