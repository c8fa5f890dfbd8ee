//! Template rendering stage.

use super::{Stage, StageDescriptor};
use crate::context::ContextView;
use crate::core::StageOutput;
use crate::errors::{PipelineValidationError, StepflowError};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

#[allow(clippy::unwrap_used)]
fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap())
}

/// Renders a `{placeholder}` template from the context into one output key.
///
/// Placeholders double as the stage's declared inputs. String values are
/// inserted verbatim, anything else as compact JSON.
#[derive(Debug, Clone)]
pub struct TemplateStage {
    name: String,
    template: String,
    output_key: String,
    input_keys: Vec<String>,
}

impl TemplateStage {
    /// Registry kind for template stages.
    pub const KIND: &'static str = "template";

    /// Creates a new template stage.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        output_key: impl Into<String>,
    ) -> Self {
        let template = template.into();
        let mut input_keys: Vec<String> = Vec::new();
        for caps in placeholder_pattern().captures_iter(&template) {
            let key = caps[1].to_string();
            if !input_keys.contains(&key) {
                input_keys.push(key);
            }
        }

        Self {
            name: name.into(),
            template,
            output_key: output_key.into(),
            input_keys,
        }
    }

    /// Rebuilds a template stage from a snapshot descriptor.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the template parameters are absent.
    pub fn from_descriptor(descriptor: &StageDescriptor) -> Result<Self, StepflowError> {
        let template = descriptor.param_str("template");
        let output_key = descriptor.param_str("output_key");
        match (template, output_key) {
            (Some(template), Some(output_key)) => {
                Ok(Self::new(&descriptor.name, template, output_key))
            }
            _ => Err(PipelineValidationError::new(format!(
                "Template stage '{}' is missing 'template' or 'output_key' params",
                descriptor.name
            ))
            .with_stages(vec![descriptor.name.clone()])
            .into()),
        }
    }

    /// Returns the raw template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Renders the template against a context view.
    ///
    /// # Errors
    ///
    /// Returns the first placeholder key missing from the context.
    pub fn render(&self, ctx: &ContextView) -> Result<String, StepflowError> {
        if let Some(missing) = ctx.missing(&self.input_keys).into_iter().next() {
            return Err(crate::errors::MissingKeyError::new(missing).into());
        }

        let rendered = placeholder_pattern().replace_all(&self.template, |caps: &regex::Captures<'_>| {
            match ctx.get(&caps[1]) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            }
        });
        Ok(rendered.into_owned())
    }
}

#[async_trait]
impl Stage for TemplateStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_keys(&self) -> Vec<String> {
        self.input_keys.clone()
    }

    fn output_keys(&self) -> Vec<String> {
        vec![self.output_key.clone()]
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "template": self.template,
            "output_key": self.output_key,
        })
    }

    async fn execute(&self, ctx: &ContextView) -> StageOutput {
        match self.render(ctx) {
            Ok(text) => StageOutput::ok_value(&self.output_key, serde_json::Value::String(text)),
            Err(err) => StageOutput::fail(err.to_string()),
        }
    }
}
