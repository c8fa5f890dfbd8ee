//! # Stepflow
//!
//! Sequential stage pipelines that can be paused, stepped one stage at a
//! time, snapshotted and resumed.
//!
//! A pipeline is an ordered list of stages sharing a key-value context.
//! Each stage reads the context and returns a partial update that later
//! stages can see. A run is driven by:
//!
//! - **`RunController`**: owns the context, the cursor and the run state
//!   (`Idle`, `Running`, `Paused`, `Completed`), and exposes `pause`,
//!   `resume` and manual `step`
//! - **`StepperLoop`**: waits until the run may proceed, steps, then yields
//!   for a fixed delay
//! - **`Snapshot`**: a serializable capture of a paused or completed run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepflow::prelude::*;
//!
//! let pipeline = Arc::new(
//!     PipelineBuilder::new("eggs")
//!         .input_variables(["product"])
//!         .stage(TemplateStage::new("name", "{product} Co", "name"))
//!         .stage(TemplateStage::new("is_cool", "{name} is cool!", "is_cool"))
//!         .output_variables(["is_cool"])
//!         .build()?,
//! );
//!
//! let handle = pipeline.launch(inputs)?;
//! handle.pause();
//! let snapshot = handle.controller().snapshot().await?;
//! handle.resume();
//! let outputs = handle.join().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod controller;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod persistence;
pub mod pipeline;
pub mod snapshot;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{LogConfig, RunConfig};
    pub use crate::context::{ContextBag, ContextUpdate, ContextView};
    pub use crate::controller::{RunController, RunGate, RunState, StepOutcome, StepperLoop};
    pub use crate::core::{StageOutput, StageStatus};
    pub use crate::errors::{
        MissingInputsError, MissingKeyError, MissingOutputError, NoMoreStagesError,
        PipelineValidationError, StepflowError,
    };
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::observability::init_tracing;
    pub use crate::persistence::{FileSnapshotStore, InMemorySnapshotStore, SnapshotStore};
    pub use crate::pipeline::{PipelineBuilder, RunHandle, SteppablePipeline};
    pub use crate::snapshot::{Snapshot, SnapshotState};
    pub use crate::stages::{
        FnStage, NoOpStage, Stage, StageDescriptor, StageRegistry, TemplateStage,
    };
    pub use std::sync::Arc;
}
