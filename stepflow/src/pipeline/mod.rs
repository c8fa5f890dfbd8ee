//! Pipeline building and execution.
//!
//! A [`SteppablePipeline`] is an immutable stage sequence built and
//! validated by [`PipelineBuilder`]. Runs are created from it either as a
//! bare controller for manual stepping or as a launched [`RunHandle`].

mod builder;
mod handle;
mod spec;

pub use builder::PipelineBuilder;
pub use handle::RunHandle;
pub use spec::SteppablePipeline;
