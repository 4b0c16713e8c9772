//! End-to-end workflow runs against scripted collaborators.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use crate::artifacts::ArtifactKind;
    use crate::errors::{ErrorKind, OrchestratorError};
    use crate::events::Transition;
    use crate::registry::Capability;
    use crate::testing::{fast_config, sample_input, ScriptedReply, TestHarness};
    use crate::workflow::{StageName, StageStatus, WorkflowStatus};

    fn workflow_transitions(harness: &TestHarness, id: uuid::Uuid) -> Vec<(WorkflowStatus, WorkflowStatus)> {
        harness
            .engine
            .history(id)
            .into_iter()
            .filter_map(|e| match e.transition {
                Transition::Workflow { from, to } => Some((from, to)),
                Transition::Stage { .. } => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_happy_path_finalizes_with_all_stages_succeeded() {
        let harness = TestHarness::new();
        let id = harness.engine.create_workflow();

        let snapshot = harness.engine.run(id, &sample_input()).await.unwrap();

        assert_eq!(snapshot.status, WorkflowStatus::Finalized);
        for stage in StageName::ALL {
            assert_eq!(
                snapshot.stage(stage).unwrap().status,
                StageStatus::Succeeded,
                "stage {stage} should have succeeded"
            );
        }

        let package = harness.engine.artifact(id, ArtifactKind::FinalPackage).unwrap();
        assert_eq!(package.locator, "package://final-1");
        assert!(package.metadata.contains_key("caption"));
        assert_eq!(package.id.version, 1);
    }

    #[tokio::test]
    async fn test_happy_path_workflow_status_progression() {
        let harness = TestHarness::new();
        let id = harness.engine.create_workflow();

        harness.engine.run(id, &sample_input()).await.unwrap();

        let expected = vec![
            (WorkflowStatus::Pending, WorkflowStatus::Uploading),
            (WorkflowStatus::Uploading, WorkflowStatus::Analyzing),
            (WorkflowStatus::Analyzing, WorkflowStatus::Generating),
            (WorkflowStatus::Generating, WorkflowStatus::AssessingQuality),
            (WorkflowStatus::AssessingQuality, WorkflowStatus::Finalizing),
            (WorkflowStatus::Finalizing, WorkflowStatus::Finalized),
        ];
        assert_eq!(workflow_transitions(&harness, id), expected);
    }

    #[tokio::test]
    async fn test_analysis_branches_start_after_upload_succeeds() {
        let harness = TestHarness::new();
        let id = harness.engine.create_workflow();

        harness.engine.run(id, &sample_input()).await.unwrap();

        let history = harness.engine.history(id);
        let index_of = |stage: StageName, to: StageStatus| {
            history
                .iter()
                .position(|e| {
                    matches!(e.transition, Transition::Stage { stage: s, to: t, .. }
                        if s == stage && t == to)
                })
                .unwrap()
        };

        let upload_done = index_of(StageName::Upload, StageStatus::Succeeded);
        assert!(index_of(StageName::TrendAnalysis, StageStatus::Running) > upload_done);
        assert!(index_of(StageName::MaterialAnalysis, StageStatus::Running) > upload_done);
        assert!(
            index_of(StageName::Generation, StageStatus::Running)
                > index_of(StageName::MaterialAnalysis, StageStatus::Succeeded)
        );
    }

    #[tokio::test]
    async fn test_generation_sees_trend_context_on_happy_path() {
        let harness = TestHarness::new();
        let id = harness.engine.create_workflow();

        harness.engine.run(id, &sample_input()).await.unwrap();

        let generate = harness
            .transport
            .requests()
            .into_iter()
            .find_map(|r| match r {
                crate::client::ServiceRequest::GenerateContent { trend_context, .. } => {
                    Some(trend_context)
                }
                _ => None,
            })
            .unwrap();
        assert!(generate.is_some());
        assert_eq!(generate.unwrap().hashtags, vec!["#goldenhour", "#trending"]);
    }

    #[tokio::test]
    async fn test_optional_trend_failure_degrades_to_skipped() {
        let harness = TestHarness::new();
        let id = harness.engine.create_workflow();
        harness.transport.push_failures(
            Capability::Trend,
            &OrchestratorError::transient("trend service flaking"),
            3,
        );

        let snapshot = harness.engine.run(id, &sample_input()).await.unwrap();

        assert_eq!(snapshot.status, WorkflowStatus::Finalized);
        let trend = snapshot.stage(StageName::TrendAnalysis).unwrap();
        assert_eq!(trend.status, StageStatus::Skipped);
        assert_eq!(
            trend.error.as_ref().unwrap().kind,
            ErrorKind::TransientNetwork
        );
        // Full retry budget was spent before degrading.
        assert_eq!(harness.transport.calls_to(Capability::Trend), 3);

        let generate_trend_context = harness
            .transport
            .requests()
            .into_iter()
            .find_map(|r| match r {
                crate::client::ServiceRequest::GenerateContent { trend_context, .. } => {
                    Some(trend_context)
                }
                _ => None,
            })
            .unwrap();
        assert!(generate_trend_context.is_none());
        assert!(harness.engine.artifact(id, ArtifactKind::TrendReport).is_err());
    }

    #[tokio::test]
    async fn test_critical_analysis_failure_fails_the_workflow() {
        let harness = TestHarness::new();
        let id = harness.engine.create_workflow();
        harness.transport.push(
            Capability::Analyze,
            ScriptedReply::Fail(OrchestratorError::validation("unsupported image format")),
        );

        let snapshot = harness.engine.run(id, &sample_input()).await.unwrap();

        assert_eq!(snapshot.status, WorkflowStatus::Failed);
        let material = snapshot.stage(StageName::MaterialAnalysis).unwrap();
        assert_eq!(material.status, StageStatus::Failed);
        assert_eq!(material.error.as_ref().unwrap().kind, ErrorKind::Validation);
        // Validation failures are not retried.
        assert_eq!(harness.transport.calls_to(Capability::Analyze), 1);
        // The pipeline stopped at the join.
        assert_eq!(
            snapshot.stage(StageName::Generation).unwrap().status,
            StageStatus::Pending
        );
        assert_eq!(harness.transport.calls_to(Capability::Generate), 0);
    }

    #[tokio::test]
    async fn test_trend_branch_missing_join_deadline_is_skipped() {
        let config = fast_config()
            .with_call_timeout_ms(500)
            .with_join_timeout_ms(50);
        let harness = TestHarness::with_config(config);
        let id = harness.engine.create_workflow();
        harness.transport.push(Capability::Trend, ScriptedReply::Hang);

        let snapshot = harness.engine.run(id, &sample_input()).await.unwrap();

        assert_eq!(snapshot.status, WorkflowStatus::Finalized);
        let trend = snapshot.stage(StageName::TrendAnalysis).unwrap();
        assert_eq!(trend.status, StageStatus::Skipped);
        assert_eq!(trend.error.as_ref().unwrap().kind, ErrorKind::JoinTimeout);
        // Material analysis was awaited in full despite the deadline.
        assert_eq!(
            snapshot.stage(StageName::MaterialAnalysis).unwrap().status,
            StageStatus::Succeeded
        );
        // The dropped branch cannot leave any stage pinned in a non-terminal
        // status once the run returns.
        for stage in StageName::ALL {
            assert!(
                snapshot.stage(stage).unwrap().status.is_terminal(),
                "stage {stage} should have settled"
            );
        }
    }

    #[tokio::test]
    async fn test_unhealthy_analysis_fails_fast_and_recovers_on_resume() {
        let (harness, probe) = TestHarness::with_toggle_probe();
        let id = harness.engine.create_workflow();

        // Three failed probe rounds mark the analysis endpoint unhealthy.
        probe.set_down(Capability::Analyze);
        let monitor = harness.engine.health_monitor();
        for _ in 0..3 {
            monitor.probe_once(Capability::Analyze).await;
        }

        let failed = harness.engine.run(id, &sample_input()).await.unwrap();

        assert_eq!(failed.status, WorkflowStatus::Failed);
        let material = failed.stage(StageName::MaterialAnalysis).unwrap();
        assert_eq!(material.status, StageStatus::Failed);
        assert_eq!(
            material.error.as_ref().unwrap().kind,
            ErrorKind::ServiceUnavailable
        );
        // The gated endpoint never saw a network attempt.
        assert_eq!(harness.transport.calls_to(Capability::Analyze), 0);

        // One successful probe restores the endpoint.
        probe.set_up(Capability::Analyze);
        monitor.probe_once(Capability::Analyze).await;

        let resumed = harness.engine.run(id, &sample_input()).await.unwrap();

        assert_eq!(resumed.status, WorkflowStatus::Finalized);
        // Only the failed stage went back on the wire.
        assert_eq!(harness.transport.calls_to(Capability::Analyze), 1);
        assert_eq!(harness.transport.calls_to(Capability::Upload), 1);
        assert_eq!(
            resumed.stage(StageName::MaterialAnalysis).unwrap().attempts,
            2
        );
        assert_eq!(resumed.stage(StageName::Upload).unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn test_cancellation_mid_assessment_seals_the_workflow() {
        let harness = Arc::new(TestHarness::new());
        let id = harness.engine.create_workflow();
        for _ in 0..5 {
            harness
                .transport
                .push(Capability::AssessQuality, ScriptedReply::Hang);
        }

        let runner = Arc::clone(&harness);
        let input = sample_input();
        let run = tokio::spawn(async move { runner.engine.run(id, &input).await });

        // Let the pipeline reach the hanging quality call.
        tokio::time::sleep(Duration::from_millis(20)).await;
        harness.engine.cancel(id, "user clicked stop").unwrap();

        let snapshot = run.await.unwrap().unwrap();
        assert_eq!(snapshot.status, WorkflowStatus::Cancelled);
        let quality = snapshot.stage(StageName::QualityAssessment).unwrap();
        assert_eq!(quality.status, StageStatus::Skipped);
        assert_eq!(quality.error.as_ref().unwrap().kind, ErrorKind::Cancelled);

        // Nothing past the cancellation point exists.
        assert!(harness.engine.artifact(id, ArtifactKind::FinalPackage).is_err());
        assert!(!harness
            .transport
            .requests()
            .iter()
            .any(|r| matches!(r, crate::client::ServiceRequest::Finalize { .. })));

        // Earlier artifacts survive.
        assert!(harness.engine.artifact(id, ArtifactKind::GeneratedImage).is_ok());
    }

    #[tokio::test]
    async fn test_cancel_before_run_dispatches_nothing() {
        let harness = TestHarness::new();
        let id = harness.engine.create_workflow();
        harness.engine.cancel(id, "abandoned draft").unwrap();

        let snapshot = harness.engine.run(id, &sample_input()).await.unwrap();

        assert_eq!(snapshot.status, WorkflowStatus::Cancelled);
        assert!(harness.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_rejected_after_terminal() {
        let harness = TestHarness::new();
        let id = harness.engine.create_workflow();

        harness.engine.cancel(id, "first").unwrap();
        // Second cancel is a no-op, first reason wins.
        harness.engine.cancel(id, "second").unwrap();

        let finished = TestHarness::new();
        let done = finished.engine.create_workflow();
        finished.engine.run(done, &sample_input()).await.unwrap();
        let err = finished.engine.cancel(done, "too late").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_resume_retries_only_failed_stages() {
        let harness = TestHarness::new();
        let id = harness.engine.create_workflow();
        harness.transport.push_failures(
            Capability::AssessQuality,
            &OrchestratorError::transient("quality service restarting"),
            3,
        );

        let failed = harness.engine.run(id, &sample_input()).await.unwrap();
        assert_eq!(failed.status, WorkflowStatus::Failed);
        assert_eq!(
            failed.stage(StageName::QualityAssessment).unwrap().status,
            StageStatus::Failed
        );

        let uploads_before = harness.transport.calls_to(Capability::Upload);
        let resumed = harness.engine.run(id, &sample_input()).await.unwrap();

        assert_eq!(resumed.status, WorkflowStatus::Finalized);
        // Completed stages were not re-dispatched.
        assert_eq!(harness.transport.calls_to(Capability::Upload), uploads_before);
        // Attempt counts accumulate across runs.
        assert_eq!(resumed.stage(StageName::QualityAssessment).unwrap().attempts, 2);
        assert_eq!(resumed.stage(StageName::Upload).unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn test_upload_request_carries_stable_idempotency_key() {
        let harness = TestHarness::new();
        let id = harness.engine.create_workflow();
        harness.transport.push(
            Capability::Upload,
            ScriptedReply::Fail(OrchestratorError::validation("bad form field")),
        );

        let failed = harness.engine.run(id, &sample_input()).await.unwrap();
        assert_eq!(failed.status, WorkflowStatus::Failed);
        harness.engine.run(id, &sample_input()).await.unwrap();

        let keys: Vec<String> = harness
            .transport
            .requests()
            .into_iter()
            .filter_map(|r| match r {
                crate::client::ServiceRequest::UploadAsset { idempotency_key, .. } => {
                    Some(idempotency_key)
                }
                _ => None,
            })
            .collect();
        assert_eq!(keys.len(), 2);
        assert!(!keys[0].is_empty());
        assert_eq!(keys[0], keys[1]);
    }

    #[tokio::test]
    async fn test_artifact_versions_start_at_one_and_are_immutable() {
        let harness = TestHarness::new();
        let id = harness.engine.create_workflow();

        harness.engine.run(id, &sample_input()).await.unwrap();

        for kind in [
            ArtifactKind::UploadedFile,
            ArtifactKind::GeneratedImage,
            ArtifactKind::FinalPackage,
        ] {
            let history = harness.engine.artifact_history(id, kind);
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].id.version, 1);
        }
    }

    #[tokio::test]
    async fn test_subscription_replays_full_history_after_completion() {
        let harness = TestHarness::new();
        let id = harness.engine.create_workflow();

        harness.engine.run(id, &sample_input()).await.unwrap();

        let subscription = harness.engine.subscribe(id);
        assert_eq!(subscription.history.len(), harness.engine.history(id).len());
        assert!(!subscription.history.is_empty());

        let mut live = subscription.live;
        assert!(live.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_reported() {
        let harness = TestHarness::new();
        let missing = crate::utils::generate_uuid();

        assert!(matches!(
            harness.engine.snapshot(missing),
            Err(OrchestratorError::WorkflowNotFound(_))
        ));
        assert!(matches!(
            harness.engine.run(missing, &sample_input()).await,
            Err(OrchestratorError::WorkflowNotFound(_))
        ));
    }
}
