//! Tests for the run controller and stepper loop.

#[cfg(test)]
mod tests {
    use crate::config::RunConfig;
    use crate::context::{ContextUpdate, ContextView};
    use crate::controller::{RunController, RunState, StepperLoop};
    use crate::core::StageOutput;
    use crate::errors::StepflowError;
    use crate::events::{event_types, CollectingEventSink, EventSink};
    use crate::pipeline::{PipelineBuilder, SteppablePipeline};
    use crate::snapshot::{Snapshot, SnapshotState};
    use crate::stages::{FnStage, StageRegistry};
    use crate::testing::{
        assert_context_value, assert_no_more_stages, assert_progress, assert_stage_failed,
        counting_pipeline, eggs_inputs, eggs_pipeline, eggs_pipeline_with_sink, fast_config,
        FailingStage, RecordingStage, SlowStage,
    };
    use async_trait::async_trait;
    use mockall::{mock, Sequence};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    mock! {
        Sink {}

        #[async_trait]
        impl EventSink for Sink {
            async fn emit(&self, event_type: &str, data: Option<serde_json::Value>);
            fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>);
        }
    }

    fn eggs_controller() -> RunController {
        Arc::new(eggs_pipeline()).controller(eggs_inputs()).unwrap()
    }

    fn recording_pipeline(names: &[&str]) -> (Arc<SteppablePipeline>, Vec<Arc<RecordingStage>>) {
        let stages: Vec<Arc<RecordingStage>> = names
            .iter()
            .map(|n| Arc::new(RecordingStage::writing(*n, *n, json!(true))))
            .collect();
        let pipeline = PipelineBuilder::new("recording")
            .stages(stages.iter().map(|s| Arc::clone(s) as Arc<dyn crate::stages::Stage>))
            .config(fast_config())
            .build()
            .unwrap();
        (Arc::new(pipeline), stages)
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn test_new_controller_is_idle_and_gated() {
        let controller = eggs_controller();

        assert_progress(&controller, RunState::Idle, 0);
        assert!(!controller.is_gate_open());
        assert_eq!(controller.stage_count(), 2);
        assert_context_value(&controller.context(), "product", &json!("Eggs"));
    }

    #[test]
    fn test_missing_inputs_are_rejected() {
        let err = Arc::new(eggs_pipeline()).controller(HashMap::new()).unwrap_err();
        match err {
            StepflowError::MissingInputs(e) => assert_eq!(e.missing, vec!["product".to_string()]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_extra_inputs_are_kept() {
        let mut inputs = eggs_inputs();
        inputs.insert("extra".to_string(), json!(1));
        let controller = Arc::new(eggs_pipeline()).controller(inputs).unwrap();

        assert!(controller.context().contains_key("extra"));
    }

    #[tokio::test]
    async fn test_n_steps_complete_the_run() {
        let controller = Arc::new(counting_pipeline(4)).controller(HashMap::new()).unwrap();
        controller.start().unwrap();

        for i in 0..4 {
            assert_progress(&controller, RunState::Running, i);
            let outcome = controller.step().await.unwrap();
            assert_eq!(outcome.index, i);
            assert_eq!(outcome.completed, i == 3);
        }

        assert_progress(&controller, RunState::Completed, 4);
        assert!(controller.is_completed());
    }

    #[tokio::test]
    async fn test_step_past_end_changes_nothing() {
        let controller = eggs_controller();
        controller.start().unwrap();
        controller.step().await.unwrap();
        controller.step().await.unwrap();
        let before = controller.context();

        let result = controller.step().await;

        assert_no_more_stages(&result);
        assert_progress(&controller, RunState::Completed, 2);
        assert_eq!(controller.context(), before);
    }

    #[tokio::test]
    async fn test_pause_and_resume_are_noops_when_completed() {
        let controller = eggs_controller();
        controller.start().unwrap();
        controller.step().await.unwrap();
        controller.step().await.unwrap();

        controller.pause();
        assert_eq!(controller.state(), RunState::Completed);
        assert!(controller.is_gate_open());

        controller.resume();
        controller.play();
        assert_eq!(controller.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn test_eggs_scenario_step_by_step() {
        let controller = eggs_controller();

        controller.resume();
        controller.step().await.unwrap();
        assert_progress(&controller, RunState::Running, 1);
        assert_eq!(
            controller.context().into_inner(),
            HashMap::from([
                ("product".to_string(), json!("Eggs")),
                ("name".to_string(), json!("Eggs Co")),
            ])
        );

        controller.pause();
        assert_progress(&controller, RunState::Paused, 1);
        assert!(!controller.is_gate_open());

        controller.resume();
        controller.step().await.unwrap();
        assert_progress(&controller, RunState::Completed, 2);
        assert_eq!(
            controller.outputs().unwrap(),
            HashMap::from([("is_cool".to_string(), json!("Eggs Co is cool!"))])
        );
    }

    #[tokio::test]
    async fn test_manual_step_works_while_paused() {
        let controller = eggs_controller();
        controller.start().unwrap();
        controller.pause();

        controller.step().await.unwrap();

        assert_progress(&controller, RunState::Paused, 1);
    }

    #[tokio::test]
    async fn test_later_stage_overwrites_earlier_key() {
        let controller = Arc::new(counting_pipeline(3)).controller(HashMap::new()).unwrap();
        controller.start().unwrap();
        while !controller.is_completed() {
            controller.step().await.unwrap();
        }

        let ctx = controller.context();
        assert_eq!(ctx.get("last"), Some(&json!(2)));
        assert_eq!(ctx.get("step_0"), Some(&json!(0)));
        assert_eq!(ctx.len(), 4);
    }

    #[tokio::test]
    async fn test_stage_failure_leaves_run_in_place() {
        let flaky = Arc::new(
            FailingStage::failing_times("flaky", "upstream unavailable", 1).then_writing("ok", json!(1)),
        );
        let pipeline = PipelineBuilder::new("flaky")
            .stage(RecordingStage::writing("first", "first", json!(true)))
            .stage_arc(Arc::clone(&flaky) as Arc<dyn crate::stages::Stage>)
            .config(fast_config())
            .build()
            .unwrap();
        let controller = Arc::new(pipeline).controller(HashMap::new()).unwrap();
        controller.start().unwrap();
        controller.step().await.unwrap();
        let before = controller.context();

        let result = controller.step().await;

        assert_stage_failed(&result, 1);
        assert_progress(&controller, RunState::Running, 1);
        assert_eq!(controller.context(), before);
        assert_eq!(flaky.call_count(), 1);

        controller.step().await.unwrap();
        assert_eq!(flaky.call_count(), 2);
        assert_progress(&controller, RunState::Completed, 2);
        assert_context_value(&controller.context(), "ok", &json!(1));
    }

    #[tokio::test]
    async fn test_missing_output_lists_every_key() {
        let pipeline = PipelineBuilder::new("forgetful")
            .stage(
                FnStage::new("forget", |_ctx: &ContextView| Ok(ContextUpdate::new()))
                    .with_outputs(["x", "y"]),
            )
            .output_variables(["x", "y"])
            .config(fast_config())
            .build()
            .unwrap();
        let controller = Arc::new(pipeline).controller(HashMap::new()).unwrap();
        controller.step().await.unwrap();

        match controller.outputs().unwrap_err() {
            StepflowError::MissingOutput(e) => {
                let mut missing = e.missing;
                missing.sort();
                assert_eq!(missing, vec!["x".to_string(), "y".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_resets_manual_idle_steps() {
        let controller = eggs_controller();
        controller.step().await.unwrap();
        assert_progress(&controller, RunState::Idle, 1);

        controller.start().unwrap();

        assert_progress(&controller, RunState::Running, 0);
        assert!(!controller.context().contains_key("name"));
        assert!(controller.is_gate_open());
    }

    #[tokio::test]
    async fn test_start_is_rejected_after_leaving_idle() {
        let controller = eggs_controller();
        controller.start().unwrap();
        controller.step().await.unwrap();
        controller.pause();

        let err = controller.start().unwrap_err();
        assert!(matches!(
            err,
            StepflowError::AlreadyStarted { state: RunState::Paused, .. }
        ));
        assert_progress(&controller, RunState::Paused, 1);
        assert!(!controller.is_gate_open());

        controller.step().await.unwrap();
        let err = controller.start().unwrap_err();
        assert!(matches!(
            err,
            StepflowError::AlreadyStarted { state: RunState::Completed, .. }
        ));
        assert_progress(&controller, RunState::Completed, 2);
        assert_context_value(&controller.context(), "is_cool", &json!("Eggs Co is cool!"));
    }

    #[tokio::test]
    async fn test_start_during_step_is_refused() {
        let slow = Arc::new(SlowStage::with_delay_ms("slow", 200));
        let pipeline = PipelineBuilder::new("busy")
            .stage(RecordingStage::writing("a", "a", json!("A")))
            .stage(RecordingStage::new("b"))
            .stage_arc(Arc::clone(&slow) as Arc<dyn crate::stages::Stage>)
            .stage(RecordingStage::new("d"))
            .config(fast_config())
            .build()
            .unwrap();
        let controller = Arc::new(Arc::new(pipeline).controller(HashMap::new()).unwrap());
        controller.step().await.unwrap();
        controller.step().await.unwrap();

        let in_flight = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.step().await })
        };
        wait_until(|| slow.call_count() == 1).await;

        let err = controller.start().unwrap_err();
        assert!(matches!(err, StepflowError::StepInProgress { .. }));

        in_flight.await.unwrap().unwrap();
        assert_progress(&controller, RunState::Idle, 3);
        assert_context_value(&controller.context(), "a", &json!("A"));
    }

    #[tokio::test]
    async fn test_snapshot_requires_non_running_state() {
        let controller = eggs_controller();
        controller.start().unwrap();
        controller.step().await.unwrap();

        let err = controller.snapshot().await.unwrap_err();
        assert!(matches!(err, StepflowError::SnapshotWhileRunning { .. }));

        controller.pause();
        let snapshot = controller.snapshot().await.unwrap();
        assert_eq!(snapshot.cursor, 1);
        assert_eq!(snapshot.state, SnapshotState::Paused);
        assert_eq!(snapshot.context.get("name"), Some(&json!("Eggs Co")));
        assert_eq!(snapshot.run_id, controller.run_id());
    }

    #[tokio::test]
    async fn test_restore_starts_paused_with_closed_gate() {
        let controller = eggs_controller();
        controller.start().unwrap();
        controller.step().await.unwrap();
        controller.pause();
        let snapshot = controller.snapshot().await.unwrap();

        let restored = RunController::restore(snapshot, Arc::new(eggs_pipeline())).unwrap();

        assert_progress(&restored, RunState::Paused, 1);
        assert!(!restored.is_gate_open());
        assert_eq!(restored.run_id(), controller.run_id());
        assert_eq!(restored.context(), controller.context());
    }

    #[tokio::test]
    async fn test_restore_completed_snapshot() {
        let controller = eggs_controller();
        controller.step().await.unwrap();
        controller.step().await.unwrap();
        let snapshot = controller.snapshot().await.unwrap();
        assert_eq!(snapshot.state, SnapshotState::Completed);

        let restored = RunController::restore(snapshot, Arc::new(eggs_pipeline())).unwrap();
        assert_progress(&restored, RunState::Completed, 2);
        assert_no_more_stages(&restored.step().await);
    }

    #[tokio::test]
    async fn test_restore_rejects_other_pipeline() {
        let controller = eggs_controller();
        let snapshot = controller.snapshot().await.unwrap();

        let err = RunController::restore(snapshot, Arc::new(counting_pipeline(2))).unwrap_err();
        assert!(matches!(err, StepflowError::SnapshotMismatch { .. }));
    }

    #[tokio::test]
    async fn test_restore_with_registry_rebuilds_template_stages() {
        let controller = eggs_controller();
        controller.step().await.unwrap();
        let raw = controller.snapshot().await.unwrap().to_json().unwrap();

        let restored = RunController::restore_with_registry(
            Snapshot::from_json(&raw).unwrap(),
            &StageRegistry::with_builtins(),
            fast_config(),
        )
        .unwrap();
        restored.resume();
        restored.step().await.unwrap();

        assert_progress(&restored, RunState::Completed, 2);
        assert_eq!(restored.outputs().unwrap()["is_cool"], json!("Eggs Co is cool!"));
    }

    #[tokio::test]
    async fn test_restore_with_registry_needs_custom_stages() {
        let controller = Arc::new(counting_pipeline(2)).controller(HashMap::new()).unwrap();
        let snapshot = controller.snapshot().await.unwrap();

        let err = RunController::restore_with_registry(
            snapshot,
            &StageRegistry::with_builtins(),
            RunConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StepflowError::UnknownStage { .. }));
    }

    #[tokio::test]
    async fn test_events_follow_run_lifecycle() {
        let sink = Arc::new(CollectingEventSink::new());
        let controller = Arc::new(eggs_pipeline_with_sink(sink.clone()))
            .controller(eggs_inputs())
            .unwrap();

        controller.start().unwrap();
        controller.step().await.unwrap();
        controller.pause();
        controller.pause();
        controller.snapshot().await.unwrap();
        controller.resume();
        controller.step().await.unwrap();

        assert_eq!(
            sink.event_types(),
            vec![
                event_types::RUN_STARTED,
                event_types::STAGE_COMPLETED,
                event_types::RUN_PAUSED,
                event_types::RUN_SNAPSHOT,
                event_types::RUN_RESUMED,
                event_types::STAGE_COMPLETED,
                event_types::RUN_COMPLETED,
            ]
        );
        let completed = sink.events_of_type(event_types::STAGE_COMPLETED);
        let data = completed[0].1.as_ref().unwrap();
        assert_eq!(data["stage"], json!("name"));
        assert_eq!(data["run_id"], json!(controller.run_id()));
    }

    #[tokio::test]
    async fn test_stage_metadata_reaches_completion_event() {
        let sink = Arc::new(CollectingEventSink::new());
        let output = StageOutput::ok_value("summary", json!("short"))
            .add_metadata("model", json!("stub"))
            .add_metadata("tokens", json!(12));
        let pipeline = PipelineBuilder::new("annotated")
            .stage(RecordingStage::with_output("summarize", output))
            .event_sink(sink.clone())
            .config(fast_config())
            .build()
            .unwrap();
        let controller = Arc::new(pipeline).controller(HashMap::new()).unwrap();

        controller.step().await.unwrap();

        let completed = sink.events_of_type(event_types::STAGE_COMPLETED);
        let data = completed[0].1.as_ref().unwrap();
        assert_eq!(data["metadata"], json!({"model": "stub", "tokens": 12}));
        assert_eq!(data["keys"], json!(["summary"]));
        assert!(!controller.context().contains_key("model"));
        assert!(!controller.context().contains_key("tokens"));
    }

    #[tokio::test]
    async fn test_failed_stage_emits_event() {
        let mut seq = Sequence::new();
        let mut mock = MockSink::new();
        mock.expect_try_emit()
            .withf(|event_type, _| event_type.to_string() == event_types::RUN_STARTED)
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        mock.expect_try_emit()
            .withf(|event_type, data| {
                event_type.to_string() == event_types::STAGE_FAILED
                    && data.as_ref().is_some_and(|d| d["error"] == json!("kaput"))
            })
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let pipeline = PipelineBuilder::new("broken")
            .stage(FailingStage::new("boom", "kaput"))
            .event_sink(Arc::new(mock))
            .config(fast_config())
            .build()
            .unwrap();
        let controller = Arc::new(pipeline).controller(HashMap::new()).unwrap();
        controller.start().unwrap();

        assert_stage_failed(&controller.step().await, 0);
    }

    #[tokio::test]
    async fn test_disabled_events_reach_no_sink() {
        let mut mock = MockSink::new();
        mock.expect_try_emit().never();
        mock.expect_emit().never();

        let pipeline = PipelineBuilder::new("quiet")
            .stage(RecordingStage::new("only"))
            .event_sink(Arc::new(mock))
            .config(fast_config().with_emit_events(false))
            .build()
            .unwrap();
        let controller = Arc::new(pipeline).controller(HashMap::new()).unwrap();
        controller.start().unwrap();
        controller.step().await.unwrap();
        controller.pause();
        controller.snapshot().await.unwrap();
    }

    #[tokio::test]
    async fn test_stepper_runs_to_completion() {
        let controller = Arc::new(eggs_controller());
        controller.start().unwrap();

        let outputs = StepperLoop::new(Arc::clone(&controller)).run().await.unwrap();

        assert_eq!(outputs, HashMap::from([("is_cool".to_string(), json!("Eggs Co is cool!"))]));
        assert_progress(&controller, RunState::Completed, 2);
    }

    #[tokio::test]
    async fn test_stepper_waits_for_idle_run() {
        let (pipeline, stages) = recording_pipeline(&["a", "b"]);
        let controller = Arc::new(pipeline.controller(HashMap::new()).unwrap());
        let task = tokio::spawn(StepperLoop::new(Arc::clone(&controller)).run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stages[0].call_count(), 0);
        assert_eq!(controller.cursor(), 0);

        controller.resume();
        task.await.unwrap().unwrap();
        assert_eq!(stages.iter().map(|s| s.call_count()).sum::<usize>(), 2);
    }

    #[tokio::test]
    async fn test_paused_stepper_invokes_no_stage() {
        let (pipeline, stages) = recording_pipeline(&["a", "b", "c", "d", "e"]);
        let controller = Arc::new(pipeline.controller(HashMap::new()).unwrap());
        controller.start().unwrap();
        let stepper =
            StepperLoop::new(Arc::clone(&controller)).with_step_delay(Duration::from_millis(20));
        let task = tokio::spawn(stepper.run());

        let watched = Arc::clone(&controller);
        wait_until(move || watched.cursor() >= 1).await;
        controller.pause();
        let calls = || stages.iter().map(|s| s.call_count()).sum::<usize>();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let settled = controller.cursor();
        assert!(settled < 5);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(controller.cursor(), settled);
        assert_eq!(calls(), settled);
        assert_eq!(controller.state(), RunState::Paused);

        controller.resume();
        task.await.unwrap().unwrap();
        assert_eq!(calls(), 5);
    }

    #[tokio::test]
    async fn test_pause_mid_stage_lets_stage_finish() {
        let slow = Arc::new(SlowStage::with_delay_ms("slow", 100));
        let after = Arc::new(RecordingStage::writing("after", "after", json!(true)));
        let last = Arc::new(RecordingStage::writing("last", "last", json!(true)));
        let pipeline = PipelineBuilder::new("mid-stage")
            .stage_arc(Arc::clone(&slow) as Arc<dyn crate::stages::Stage>)
            .stage_arc(Arc::clone(&after) as Arc<dyn crate::stages::Stage>)
            .stage_arc(Arc::clone(&last) as Arc<dyn crate::stages::Stage>)
            .config(fast_config())
            .build()
            .unwrap();
        let controller = Arc::new(Arc::new(pipeline).controller(HashMap::new()).unwrap());
        controller.start().unwrap();
        let task = tokio::spawn(StepperLoop::new(Arc::clone(&controller)).run());

        wait_until(|| slow.call_count() == 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        controller.pause();
        assert_eq!(controller.cursor(), 0);

        let snapshot = controller.snapshot().await.unwrap();
        assert_eq!(snapshot.cursor, 1);
        assert_eq!(snapshot.state, SnapshotState::Paused);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_progress(&controller, RunState::Paused, 1);
        assert_eq!(slow.call_count(), 1);
        assert_eq!(after.call_count(), 0);
        assert_eq!(last.call_count(), 0);

        controller.resume();
        task.await.unwrap().unwrap();
        assert_eq!((after.call_count(), last.call_count()), (1, 1));
    }

    #[tokio::test]
    async fn test_stepper_propagates_stage_failure() {
        let pipeline = PipelineBuilder::new("broken")
            .stage(RecordingStage::new("fine"))
            .stage(FailingStage::new("boom", "kaput"))
            .stage(RecordingStage::new("never"))
            .config(fast_config())
            .build()
            .unwrap();
        let controller = Arc::new(Arc::new(pipeline).controller(HashMap::new()).unwrap());
        controller.start().unwrap();

        let result = StepperLoop::new(Arc::clone(&controller)).run().await;

        assert_stage_failed(&result, 1);
        assert_progress(&controller, RunState::Running, 1);
    }
}
