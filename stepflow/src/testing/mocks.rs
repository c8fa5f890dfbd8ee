//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::context::{ContextUpdate, ContextView};
use crate::core::StageOutput;
use crate::stages::Stage;

/// A stage that returns a fixed output and records every context it saw.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    input_keys: Vec<String>,
    output: Mutex<StageOutput>,
    seen: Mutex<Vec<ContextView>>,
}

impl RecordingStage {
    /// Creates a recording stage that returns an empty update.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_output(name, StageOutput::ok_empty())
    }

    /// Creates a recording stage returning `output` on every call.
    #[must_use]
    pub fn with_output(name: impl Into<String>, output: StageOutput) -> Self {
        Self {
            name: name.into(),
            input_keys: Vec::new(),
            output: Mutex::new(output),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Creates a recording stage writing `key = value`.
    #[must_use]
    pub fn writing(name: impl Into<String>, key: impl Into<String>, value: serde_json::Value) -> Self {
        Self::with_output(name, StageOutput::ok_value(key, value))
    }

    /// Declares the keys this stage reads.
    #[must_use]
    pub fn with_inputs(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.input_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the output returned by later calls.
    pub fn set_output(&self, output: StageOutput) {
        *self.output.lock() = output;
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.seen.lock().len()
    }

    /// Returns the context passed to each call, in order.
    #[must_use]
    pub fn seen_contexts(&self) -> Vec<ContextView> {
        self.seen.lock().clone()
    }

    /// Clears recorded calls.
    pub fn reset(&self) {
        self.seen.lock().clear();
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_keys(&self) -> Vec<String> {
        self.input_keys.clone()
    }

    fn output_keys(&self) -> Vec<String> {
        self.output.lock().keys()
    }

    async fn execute(&self, ctx: &ContextView) -> StageOutput {
        self.seen.lock().push(ctx.clone());
        self.output.lock().clone()
    }
}

/// A stage that fails a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: String,
    failures_left: AtomicUsize,
    on_success: ContextUpdate,
    calls: AtomicUsize,
}

impl FailingStage {
    /// Creates a stage that always fails.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::failing_times(name, error, usize::MAX)
    }

    /// Creates a stage that fails `times` calls and then returns `on_success`.
    #[must_use]
    pub fn failing_times(name: impl Into<String>, error: impl Into<String>, times: usize) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            failures_left: AtomicUsize::new(times),
            on_success: ContextUpdate::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Sets the update returned once the failures are used up.
    #[must_use]
    pub fn then_writing(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.on_success.insert(key.into(), value);
        self
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &ContextView) -> StageOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            StageOutput::fail(&self.error)
        } else {
            StageOutput::ok(self.on_success.clone())
        }
    }
}

/// A stage that sleeps before returning an empty update.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
    calls: AtomicUsize,
}

impl SlowStage {
    /// Creates a new slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    /// Creates a slow stage with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(name: impl Into<String>, ms: u64) -> Self {
        Self::new(name, Duration::from_millis(ms))
    }

    /// Returns the number of calls started.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &ContextView) -> StageOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        StageOutput::ok_empty()
    }
}
