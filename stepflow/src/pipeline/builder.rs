//! Pipeline builder with validation.

use super::SteppablePipeline;
use crate::config::RunConfig;
use crate::errors::PipelineValidationError;
use crate::events::{EventSink, NoOpEventSink};
use crate::stages::Stage;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for creating validated pipelines.
#[derive(Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    input_variables: Vec<String>,
    output_variables: Vec<String>,
    config: RunConfig,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("stages", &self.stages)
            .field("input_variables", &self.input_variables)
            .field("output_variables", &self.output_variables)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            input_variables: Vec::new(),
            output_variables: Vec::new(),
            config: RunConfig::default(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Appends an already shared stage.
    #[must_use]
    pub fn stage_arc(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends a sequence of shared stages.
    #[must_use]
    pub fn stages(mut self, stages: impl IntoIterator<Item = Arc<dyn Stage>>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Declares the keys a run must be seeded with.
    #[must_use]
    pub fn input_variables(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.input_variables = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Declares the keys extracted when a run completes.
    #[must_use]
    pub fn output_variables(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.output_variables = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the run configuration.
    #[must_use]
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink new runs report to.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline has no stages, repeats a stage
    /// name, has a stage reading a key that neither the inputs nor an
    /// earlier stage provide, or declares an output no stage produces.
    pub fn build(self) -> Result<SteppablePipeline, PipelineValidationError> {
        self.validate()?;
        Ok(SteppablePipeline::from_parts(
            self.name,
            self.stages,
            self.input_variables,
            self.output_variables,
            self.config,
            self.events,
        ))
    }

    fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' has no stages",
                self.name
            )));
        }

        let mut names = HashSet::new();
        for stage in &self.stages {
            if !names.insert(stage.name()) {
                return Err(PipelineValidationError::new(format!(
                    "Duplicate stage name '{}'",
                    stage.name()
                ))
                .with_stages(vec![stage.name().to_string()]));
            }
        }

        let mut available: HashSet<String> = self.input_variables.iter().cloned().collect();
        for stage in &self.stages {
            let missing: Vec<String> = stage
                .input_keys()
                .into_iter()
                .filter(|k| !available.contains(k))
                .collect();
            if !missing.is_empty() {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' reads keys not provided by inputs or earlier stages: {}",
                    stage.name(),
                    missing.join(", ")
                ))
                .with_stages(vec![stage.name().to_string()]));
            }
            available.extend(stage.output_keys());
        }

        let unproduced: Vec<&str> = self
            .output_variables
            .iter()
            .filter(|k| !available.contains(k.as_str()))
            .map(String::as_str)
            .collect();
        if !unproduced.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Declared outputs are never produced: {}",
                unproduced.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{FnStage, NoOpStage, TemplateStage};
    use std::collections::HashMap;

    #[test]
    fn test_build_rejects_empty_pipeline() {
        let err = PipelineBuilder::new("empty").build().unwrap_err();
        assert!(err.message.contains("no stages"));
    }

    #[test]
    fn test_build_rejects_duplicate_names() {
        let err = PipelineBuilder::new("dup")
            .stage(NoOpStage::new("same"))
            .stage(NoOpStage::new("same"))
            .build()
            .unwrap_err();
        assert_eq!(err.stages, vec!["same".to_string()]);
    }

    #[test]
    fn test_build_rejects_unsatisfied_inputs() {
        let err = PipelineBuilder::new("eggs")
            .stage(TemplateStage::new("name", "{product} Co", "name"))
            .build()
            .unwrap_err();
        assert!(err.message.contains("product"));
    }

    #[test]
    fn test_earlier_outputs_satisfy_later_inputs() {
        let pipeline = PipelineBuilder::new("chain")
            .input_variables(["product"])
            .stage(TemplateStage::new("name", "{product} Co", "name"))
            .stage(TemplateStage::new("slogan", "Buy from {name}", "slogan"))
            .output_variables(["slogan"])
            .build()
            .unwrap();
        assert_eq!(pipeline.stage_count(), 2);
        assert_eq!(pipeline.stage_names(), vec!["name", "slogan"]);
    }

    #[test]
    fn test_build_rejects_unproduced_outputs() {
        let err = PipelineBuilder::new("eggs")
            .input_variables(["product"])
            .stage(TemplateStage::new("name", "{product} Co", "name"))
            .output_variables(["name", "slogan"])
            .build()
            .unwrap_err();
        assert!(err.message.contains("slogan"));
        assert!(!err.message.contains("name,"));
    }

    #[test]
    fn test_undeclared_stage_keys_are_not_checked() {
        let pipeline = PipelineBuilder::new("loose")
            .stage(FnStage::new("anything", |_ctx: &crate::context::ContextView| {
                Ok(HashMap::new())
            }))
            .build();
        assert!(pipeline.is_ok());
    }
}
