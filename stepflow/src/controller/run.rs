//! The run state machine.

use super::RunGate;
use crate::config::RunConfig;
use crate::context::{ContextBag, ContextView};
use crate::core::{RunState, StageOutput};
use crate::errors::{MissingInputsError, MissingOutputError, NoMoreStagesError, StepflowError};
use crate::events::{event_types, EventSink};
use crate::observability::StepTimer;
use crate::pipeline::SteppablePipeline;
use crate::snapshot::{Snapshot, SnapshotState, SNAPSHOT_VERSION};
use crate::stages::StageRegistry;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// State and cursor, always read and written together.
#[derive(Debug, Clone, Copy)]
struct Progress {
    state: RunState,
    cursor: usize,
}

/// What a single successful step did.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Index of the stage that ran.
    pub index: usize,
    /// Name of the stage that ran.
    pub stage: String,
    /// Keys merged into the context.
    pub keys: Vec<String>,
    /// Wall time of the stage call in milliseconds.
    pub duration_ms: f64,
    /// Whether this step finished the run.
    pub completed: bool,
}

/// Owns one run of a pipeline: its context, cursor, state and gate.
///
/// Every invocation of a pipeline gets its own controller; nothing here is
/// shared between runs. `pause`, `resume` and `play` are synchronous and
/// never fail. Steps are serialized: a stage call holds the step lock from
/// invocation until its output is merged and the cursor has moved, so a
/// manual `step` and the stepper loop never run stages concurrently and a
/// snapshot never observes a half-applied step.
pub struct RunController {
    run_id: Uuid,
    pipeline: Arc<SteppablePipeline>,
    inputs: HashMap<String, serde_json::Value>,
    context: ContextBag,
    progress: Mutex<Progress>,
    gate: RunGate,
    step_lock: tokio::sync::Mutex<()>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let progress = *self.progress.lock();
        f.debug_struct("RunController")
            .field("run_id", &self.run_id)
            .field("pipeline", &self.pipeline.name())
            .field("state", &progress.state)
            .field("cursor", &progress.cursor)
            .field("gate_open", &self.gate.is_open())
            .finish_non_exhaustive()
    }
}

impl RunController {
    /// Creates an idle controller seeded with `inputs`.
    ///
    /// # Errors
    ///
    /// Returns `MissingInputsError` if a declared pipeline input is absent.
    pub fn new(
        pipeline: Arc<SteppablePipeline>,
        inputs: HashMap<String, serde_json::Value>,
    ) -> Result<Self, StepflowError> {
        let missing: Vec<String> = pipeline
            .input_variables()
            .iter()
            .filter(|k| !inputs.contains_key(k.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(MissingInputsError::new(pipeline.name(), missing).into());
        }

        let events = pipeline.event_sink();
        Ok(Self {
            run_id: Uuid::new_v4(),
            context: ContextBag::from_data(inputs.clone()),
            inputs,
            progress: Mutex::new(Progress {
                state: RunState::Idle,
                cursor: 0,
            }),
            gate: RunGate::closed(),
            step_lock: tokio::sync::Mutex::new(()),
            events,
            pipeline,
        })
    }

    /// Replaces the event sink inherited from the pipeline.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Rebuilds a controller from a snapshot against a known pipeline.
    ///
    /// The restored controller is `Paused` (or `Completed`) with a closed
    /// gate, whatever state the run was in when it was captured.
    ///
    /// # Errors
    ///
    /// Fails if the snapshot is inconsistent or was taken from a pipeline
    /// with a different stage sequence.
    pub fn restore(
        snapshot: Snapshot,
        pipeline: Arc<SteppablePipeline>,
    ) -> Result<Self, StepflowError> {
        snapshot.validate()?;
        if snapshot.fingerprint != pipeline.fingerprint() {
            return Err(StepflowError::SnapshotMismatch {
                snapshot: snapshot.fingerprint,
                pipeline: pipeline.fingerprint().to_string(),
            });
        }

        let state = match snapshot.state {
            SnapshotState::Paused => RunState::Paused,
            SnapshotState::Completed => RunState::Completed,
        };
        let events = pipeline.event_sink();
        let controller = Self {
            run_id: snapshot.run_id,
            pipeline,
            inputs: snapshot.inputs,
            context: ContextBag::from_data(snapshot.context),
            progress: Mutex::new(Progress {
                state,
                cursor: snapshot.cursor,
            }),
            gate: RunGate::closed(),
            step_lock: tokio::sync::Mutex::new(()),
            events,
        };

        info!(
            run_id = %controller.run_id,
            pipeline = %controller.pipeline.name(),
            cursor = snapshot.cursor,
            state = %state,
            "Run restored from snapshot"
        );
        controller.emit(
            event_types::RUN_RESTORED,
            json!({"cursor": snapshot.cursor, "state": state}),
        );
        Ok(controller)
    }

    /// Rebuilds both the pipeline and the controller from a snapshot,
    /// binding each stage descriptor through `registry`.
    ///
    /// # Errors
    ///
    /// Fails if a descriptor cannot be resolved, the rebuilt pipeline does
    /// not validate, or its fingerprint differs from the snapshot's.
    pub fn restore_with_registry(
        snapshot: Snapshot,
        registry: &StageRegistry,
        config: RunConfig,
    ) -> Result<Self, StepflowError> {
        let stages = registry.resolve_all(&snapshot.stages)?;
        let pipeline = SteppablePipeline::builder(&snapshot.pipeline_name)
            .stages(stages)
            .input_variables(snapshot.input_variables.iter().cloned())
            .output_variables(snapshot.output_variables.iter().cloned())
            .config(config)
            .build()?;
        Self::restore(snapshot, Arc::new(pipeline))
    }

    /// Starts an `Idle` run: cursor back to zero, context reseeded from the
    /// original inputs, state `Running` and the gate open.
    ///
    /// Only valid once. Fails with [`StepflowError::AlreadyStarted`] in any
    /// other state, and with [`StepflowError::StepInProgress`] while a manual
    /// step is executing; the run is left untouched in both cases.
    pub fn start(&self) -> Result<(), StepflowError> {
        let Ok(_guard) = self.step_lock.try_lock() else {
            return Err(StepflowError::StepInProgress {
                run_id: self.run_id.to_string(),
            });
        };

        let stage_count = self.stage_count();
        {
            let mut progress = self.progress.lock();
            if progress.state != RunState::Idle {
                return Err(StepflowError::AlreadyStarted {
                    run_id: self.run_id.to_string(),
                    state: progress.state,
                });
            }
            self.context.replace_all(self.inputs.clone());
            progress.cursor = 0;
            progress.state = if stage_count == 0 {
                RunState::Completed
            } else {
                RunState::Running
            };
        }
        self.gate.open();

        info!(
            run_id = %self.run_id,
            pipeline = %self.pipeline.name(),
            stages = stage_count,
            "Run started"
        );
        self.emit(event_types::RUN_STARTED, json!({"stages": stage_count}));
        Ok(())
    }

    /// Closes the gate so the stepper holds before the next stage.
    ///
    /// A stage already executing runs to completion. No-op once every
    /// stage has run.
    pub fn pause(&self) {
        let (changed, cursor) = {
            let mut progress = self.progress.lock();
            if progress.cursor >= self.stage_count() {
                return;
            }
            self.gate.close();
            let changed = progress.state != RunState::Paused;
            progress.state = RunState::Paused;
            (changed, progress.cursor)
        };

        if changed {
            info!(run_id = %self.run_id, cursor, "Run paused");
            self.emit(event_types::RUN_PAUSED, json!({"cursor": cursor}));
        }
    }

    /// Opens the gate so the stepper may continue. No-op once every stage
    /// has run.
    pub fn resume(&self) {
        let (changed, cursor) = {
            let mut progress = self.progress.lock();
            if progress.cursor >= self.stage_count() {
                return;
            }
            self.gate.open();
            let changed = progress.state != RunState::Running;
            progress.state = RunState::Running;
            (changed, progress.cursor)
        };

        if changed {
            info!(run_id = %self.run_id, cursor, "Run resumed");
            self.emit(event_types::RUN_RESUMED, json!({"cursor": cursor}));
        }
    }

    /// Alias for [`resume`](Self::resume).
    pub fn play(&self) {
        self.resume();
    }

    /// Runs the stage under the cursor and advances.
    ///
    /// Works in any state; pausing only holds the stepper loop. A failing
    /// stage leaves context and cursor untouched, so the next call invokes
    /// the same stage again.
    ///
    /// # Errors
    ///
    /// `NoMoreStages` when the cursor is at the end, or `StageExecution`
    /// when the stage reports a failure.
    pub async fn step(&self) -> Result<StepOutcome, StepflowError> {
        let _guard = self.step_lock.lock().await;
        self.step_locked().await
    }

    /// Steps only if the run is `Running` once the step lock is held.
    ///
    /// Returns `Ok(None)` when a pause won the race for the lock.
    pub(crate) async fn step_if_running(&self) -> Result<Option<StepOutcome>, StepflowError> {
        let _guard = self.step_lock.lock().await;
        if self.state() != RunState::Running {
            return Ok(None);
        }
        self.step_locked().await.map(Some)
    }

    async fn step_locked(&self) -> Result<StepOutcome, StepflowError> {
        let stage_count = self.stage_count();
        let index = self.progress.lock().cursor;
        if index >= stage_count {
            return Err(NoMoreStagesError::new(index, stage_count).into());
        }

        let stage = Arc::clone(&self.pipeline.stages()[index]);
        let span = tracing::info_span!(
            "stage",
            run_id = %self.run_id,
            index,
            stage = %stage.name()
        );
        debug!(run_id = %self.run_id, index, stage = %stage.name(), "Step started");

        let timer = StepTimer::start(index);
        let view = self.context.snapshot_view();
        let mut output: StageOutput = stage.execute(&view).instrument(span).await;
        let duration_ms = timer.finish();

        if output.is_failure() {
            let message = output.error.unwrap_or_else(|| "stage failed".to_string());
            warn!(
                run_id = %self.run_id,
                index,
                stage = %stage.name(),
                error = %message,
                "Stage failed"
            );
            self.emit(
                event_types::STAGE_FAILED,
                json!({"index": index, "stage": stage.name(), "error": message}),
            );
            return Err(StepflowError::stage_execution(stage.name(), index, message));
        }

        let keys = output.keys();
        let metadata = std::mem::take(&mut output.metadata);
        self.context.merge(output.into_data());

        let completed = {
            let mut progress = self.progress.lock();
            progress.cursor += 1;
            let completed = progress.cursor == stage_count;
            if completed {
                progress.state = RunState::Completed;
            }
            completed
        };

        debug!(
            run_id = %self.run_id,
            index,
            stage = %stage.name(),
            duration_ms,
            "Step completed"
        );
        self.emit(
            event_types::STAGE_COMPLETED,
            json!({
                "index": index,
                "stage": stage.name(),
                "keys": keys,
                "duration_ms": duration_ms,
                "metadata": metadata,
            }),
        );

        if completed {
            // Completed releases anything still waiting on the gate.
            self.gate.open();
            info!(run_id = %self.run_id, stages = stage_count, "Run completed");
            self.emit(event_types::RUN_COMPLETED, json!({"stages": stage_count}));
        }

        Ok(StepOutcome {
            index,
            stage: stage.name().to_string(),
            keys,
            duration_ms,
            completed,
        })
    }

    /// Suspends until the gate is open.
    ///
    /// The gate is open while `Running`, and also once the run completes.
    pub async fn wait_until_running(&self) {
        self.gate.wait_open().await;
    }

    /// Captures the run for later restore.
    ///
    /// Waits for any in-flight step to finish so the cursor and context
    /// are captured as a consistent pair.
    ///
    /// # Errors
    ///
    /// `SnapshotWhileRunning` if the run is `Running`; pause it first.
    pub async fn snapshot(&self) -> Result<Snapshot, StepflowError> {
        self.ensure_not_running()?;
        let _guard = self.step_lock.lock().await;
        self.ensure_not_running()?;

        let cursor = self.cursor();
        let state = if cursor >= self.stage_count() {
            SnapshotState::Completed
        } else {
            SnapshotState::Paused
        };

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            run_id: self.run_id,
            pipeline_name: self.pipeline.name().to_string(),
            fingerprint: self.pipeline.fingerprint().to_string(),
            stages: self.pipeline.descriptors(),
            input_variables: self.pipeline.input_variables().to_vec(),
            output_variables: self.pipeline.output_variables().to_vec(),
            inputs: self.inputs.clone(),
            context: self.context.snapshot_view().into_inner(),
            cursor,
            state,
            captured_at: Utc::now(),
        };

        info!(run_id = %self.run_id, cursor, state = %state, "Snapshot captured");
        self.emit(
            event_types::RUN_SNAPSHOT,
            json!({"cursor": cursor, "state": state}),
        );
        Ok(snapshot)
    }

    fn ensure_not_running(&self) -> Result<(), StepflowError> {
        if self.state() == RunState::Running {
            return Err(StepflowError::SnapshotWhileRunning {
                run_id: self.run_id.to_string(),
            });
        }
        Ok(())
    }

    /// Extracts the declared outputs from the context.
    ///
    /// # Errors
    ///
    /// `MissingOutput` listing every declared output that was never written.
    pub fn outputs(&self) -> Result<HashMap<String, serde_json::Value>, StepflowError> {
        let view = self.context.snapshot_view();
        let declared = self.pipeline.output_variables();
        let missing = view.missing(declared);
        if !missing.is_empty() {
            return Err(MissingOutputError::new(missing).into());
        }
        Ok(view.select(declared)?)
    }

    /// Returns the run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.progress.lock().state
    }

    /// Returns the index of the next stage to run.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.progress.lock().cursor
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.pipeline.stage_count()
    }

    /// Returns true once the cursor has reached the end.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.cursor() >= self.stage_count()
    }

    /// Returns whether the gate is open.
    #[must_use]
    pub fn is_gate_open(&self) -> bool {
        self.gate.is_open()
    }

    /// Returns a read-only copy of the context.
    #[must_use]
    pub fn context(&self) -> ContextView {
        self.context.snapshot_view()
    }

    /// Returns the inputs the run was seeded with.
    #[must_use]
    pub fn inputs(&self) -> &HashMap<String, serde_json::Value> {
        &self.inputs
    }

    /// Returns the pipeline this controller runs.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<SteppablePipeline> {
        &self.pipeline
    }

    fn emit(&self, event_type: &str, mut data: serde_json::Value) {
        if !self.pipeline.config().emit_events {
            return;
        }
        if let Some(obj) = data.as_object_mut() {
            obj.insert("run_id".to_string(), json!(self.run_id));
            obj.insert("pipeline".to_string(), json!(self.pipeline.name()));
        }
        self.events.try_emit(event_type, Some(data));
    }
}
