//! The immutable, validated pipeline definition.

use super::{PipelineBuilder, RunHandle};
use crate::config::RunConfig;
use crate::controller::{RunController, StepperLoop};
use crate::errors::StepflowError;
use crate::events::EventSink;
use crate::stages::{Stage, StageDescriptor};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// An ordered, validated sequence of stages.
///
/// A pipeline holds no run state. Each call to [`controller`](Self::controller)
/// or [`launch`](Self::launch) creates an independent run with its own
/// context, so one pipeline can serve any number of concurrent runs.
pub struct SteppablePipeline {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    input_variables: Vec<String>,
    output_variables: Vec<String>,
    config: RunConfig,
    events: Arc<dyn EventSink>,
    fingerprint: String,
}

impl std::fmt::Debug for SteppablePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SteppablePipeline")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .field("input_variables", &self.input_variables)
            .field("output_variables", &self.output_variables)
            .field("config", &self.config)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl SteppablePipeline {
    /// Starts building a pipeline.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    pub(crate) fn from_parts(
        name: String,
        stages: Vec<Arc<dyn Stage>>,
        input_variables: Vec<String>,
        output_variables: Vec<String>,
        config: RunConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let descriptors: Vec<StageDescriptor> = stages.iter().map(|s| s.descriptor()).collect();
        let fingerprint = fingerprint(&descriptors);
        Self {
            name,
            stages,
            input_variables,
            output_variables,
            config,
            events,
            fingerprint,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the ordered stages.
    #[must_use]
    pub fn stages(&self) -> &[Arc<dyn Stage>] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the stage names in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    /// Returns the serializable description of every stage, in order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<StageDescriptor> {
        self.stages.iter().map(|s| s.descriptor()).collect()
    }

    /// Returns the declared input keys.
    #[must_use]
    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    /// Returns the declared output keys.
    #[must_use]
    pub fn output_variables(&self) -> &[String] {
        &self.output_variables
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Returns the sink new controllers report to.
    #[must_use]
    pub fn event_sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.events)
    }

    /// Returns the hex fingerprint of the stage sequence.
    ///
    /// Two pipelines with the same names, kinds, declared keys and
    /// parameters in the same order share a fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Creates an idle controller for a new run.
    ///
    /// # Errors
    ///
    /// `MissingInputs` if a declared input is absent from `inputs`.
    pub fn controller(
        self: &Arc<Self>,
        inputs: HashMap<String, serde_json::Value>,
    ) -> Result<RunController, StepflowError> {
        RunController::new(Arc::clone(self), inputs)
    }

    /// Starts a run and spawns its stepper loop on the current runtime.
    ///
    /// The run begins `Running`; use the returned handle to pause, resume
    /// or wait for the outputs.
    ///
    /// # Errors
    ///
    /// `MissingInputs` if a declared input is absent from `inputs`.
    pub fn launch(
        self: &Arc<Self>,
        inputs: HashMap<String, serde_json::Value>,
    ) -> Result<RunHandle, StepflowError> {
        let controller = Arc::new(self.controller(inputs)?);
        controller.start()?;
        Ok(RunHandle::spawn(StepperLoop::new(controller)))
    }

    /// Runs to completion and returns the declared outputs.
    ///
    /// # Errors
    ///
    /// Missing inputs, the first stage failure, or missing outputs.
    pub async fn run(
        self: &Arc<Self>,
        inputs: HashMap<String, serde_json::Value>,
    ) -> Result<HashMap<String, serde_json::Value>, StepflowError> {
        self.launch(inputs)?.join().await
    }
}

/// Hashes the serialized descriptors into a short hex digest.
fn fingerprint(descriptors: &[StageDescriptor]) -> String {
    let mut hasher = Sha256::new();
    for descriptor in descriptors {
        // Descriptors only hold strings and JSON values.
        let encoded = serde_json::to_vec(descriptor).unwrap_or_default();
        hasher.update(&encoded);
        hasher.update(b"\n");
    }
    hex::encode(&hasher.finalize()[..16])
}
