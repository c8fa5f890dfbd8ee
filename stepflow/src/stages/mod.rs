//! Stage trait and implementations.
//!
//! Stages are the fundamental units of work in a stepflow pipeline. Each
//! one reads the accumulated context and returns a partial update.

mod descriptor;
mod registry;
mod template;

pub use descriptor::StageDescriptor;
pub use registry::{StageFactory, StageRegistry};
pub use template::TemplateStage;

use crate::context::{ContextUpdate, ContextView};
use crate::core::StageOutput;
use async_trait::async_trait;
use std::fmt::Debug;

/// Registry kind reported by stages that cannot be rebuilt from their
/// descriptor alone and must be registered by name.
pub const CUSTOM_KIND: &str = "custom";

/// Trait for pipeline stages.
///
/// A stage is identified by its position in the pipeline. The declared
/// input and output keys are only used by pipeline validation; what is
/// merged into the context is whatever `execute` returns.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Context keys this stage reads.
    fn input_keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Context keys this stage writes.
    fn output_keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Registry kind used to rebuild the stage from a snapshot.
    fn kind(&self) -> &str {
        CUSTOM_KIND
    }

    /// Construction parameters recorded in snapshots.
    fn params(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Serializable description of this stage.
    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor {
            name: self.name().to_string(),
            kind: self.kind().to_string(),
            input_keys: self.input_keys(),
            output_keys: self.output_keys(),
            params: self.params(),
        }
    }

    /// Executes the stage against a read-only view of the context.
    async fn execute(&self, ctx: &ContextView) -> StageOutput;
}

/// A simple function-based stage.
///
/// Closure errors become failed outputs carrying the full error chain.
pub struct FnStage<F>
where
    F: Fn(&ContextView) -> anyhow::Result<ContextUpdate> + Send + Sync,
{
    name: String,
    input_keys: Vec<String>,
    output_keys: Vec<String>,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&ContextView) -> anyhow::Result<ContextUpdate> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            input_keys: Vec::new(),
            output_keys: Vec::new(),
            func,
        }
    }

    /// Declares the keys the closure reads.
    #[must_use]
    pub fn with_inputs(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.input_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Declares the keys the closure writes.
    #[must_use]
    pub fn with_outputs(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.output_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&ContextView) -> anyhow::Result<ContextUpdate> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("input_keys", &self.input_keys)
            .field("output_keys", &self.output_keys)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&ContextView) -> anyhow::Result<ContextUpdate> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn input_keys(&self) -> Vec<String> {
        self.input_keys.clone()
    }

    fn output_keys(&self) -> Vec<String> {
        self.output_keys.clone()
    }

    async fn execute(&self, ctx: &ContextView) -> StageOutput {
        match (self.func)(ctx) {
            Ok(data) => StageOutput::ok(data),
            Err(err) => StageOutput::fail(format!("{err:#}")),
        }
    }
}

/// A no-op stage.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Registry kind for no-op stages.
    pub const KIND: &'static str = "noop";

    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    async fn execute(&self, _ctx: &ContextView) -> StageOutput {
        StageOutput::ok_empty()
    }
}
