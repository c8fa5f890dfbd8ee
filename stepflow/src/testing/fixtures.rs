//! Test fixtures for pipeline testing.

#![allow(clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::config::RunConfig;
use crate::context::{ContextUpdate, ContextView};
use crate::events::EventSink;
use crate::pipeline::{PipelineBuilder, SteppablePipeline};
use crate::stages::{FnStage, TemplateStage};

/// Config used by fixtures: a 1 ms step delay.
#[must_use]
pub fn fast_config() -> RunConfig {
    RunConfig::default().with_step_delay_ms(1)
}

/// Inputs for [`eggs_pipeline`].
#[must_use]
pub fn eggs_inputs() -> HashMap<String, serde_json::Value> {
    HashMap::from([("product".to_string(), json!("Eggs"))])
}

fn eggs_builder() -> PipelineBuilder {
    PipelineBuilder::new("eggs")
        .input_variables(["product"])
        .stage(TemplateStage::new("name", "{product} Co", "name"))
        .stage(TemplateStage::new("is_cool", "{name} is cool!", "is_cool"))
        .output_variables(["is_cool"])
        .config(fast_config())
}

/// Two template stages: `product` to `name`, then `name` to `is_cool`.
///
/// # Panics
///
/// Never; the definition is statically valid.
#[must_use]
pub fn eggs_pipeline() -> SteppablePipeline {
    eggs_builder().build().expect("eggs pipeline is valid")
}

/// [`eggs_pipeline`] reporting to `sink`.
///
/// # Panics
///
/// Never; the definition is statically valid.
#[must_use]
pub fn eggs_pipeline_with_sink(sink: Arc<dyn EventSink>) -> SteppablePipeline {
    eggs_builder()
        .event_sink(sink)
        .build()
        .expect("eggs pipeline is valid")
}

/// `n` stages where stage `i` writes `step_i = i` and overwrites `last = i`.
///
/// # Panics
///
/// Panics if `n` is zero.
#[must_use]
pub fn counting_pipeline(n: usize) -> SteppablePipeline {
    let mut builder = PipelineBuilder::new(format!("counting-{n}"))
        .output_variables(["last"])
        .config(fast_config());
    for i in 0..n {
        let stage = FnStage::new(format!("count_{i}"), move |_ctx: &ContextView| {
            let mut out = ContextUpdate::new();
            out.insert(format!("step_{i}"), json!(i));
            out.insert("last".to_string(), json!(i));
            Ok(out)
        })
        .with_outputs([format!("step_{i}"), "last".to_string()]);
        builder = builder.stage(stage);
    }
    builder.build().expect("counting pipeline needs at least one stage")
}
