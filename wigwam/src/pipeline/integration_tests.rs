//! End-to-end tests: composition, execution and removal against in-memory engines.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::core::{RemovalPattern, StageStatus, TagPrefix};
    use crate::engine::{BuildExecutor, MockBuildEngine};
    use crate::errors::FailureKind;
    use crate::events::{CollectingEventSink, EventType};
    use crate::lifecycle::RemovalEngine;
    use crate::pipeline::{
        Distributable, FullCompile, MacroCommand, RepoSource, RunController, RunState, SetupAll,
        SingleStage,
    };
    use crate::testing::{linear_spec, standard_composer, MockEngine};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn controller(engine: Arc<MockEngine>) -> RunController {
        RunController::new(BuildExecutor::new(engine))
    }

    #[tokio::test]
    async fn test_second_stage_failure_keeps_first_artifact() {
        let engine = Arc::new(MockEngine::new().failing_on("wigwam-test-b"));
        let spec = linear_spec(&["a", "b", "c", "d"]);

        let report = controller(engine.clone()).run(&spec, &CancellationToken::new()).await;

        assert_eq!(report.state, RunState::Failed(2));
        assert_eq!(engine.build_count(), 2);
        assert!(engine.contains("wigwam-test-a"));
        assert!(!engine.contains("wigwam-test-b"));
        let attempted: Vec<String> = engine.builds().into_iter().map(|b| b.tag).collect();
        assert_eq!(attempted, vec!["wigwam-test-a", "wigwam-test-b"]);

        let positions: Vec<usize> = report.results.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![1, 2, 3, 4]);
        assert_eq!(report.results[2].status, StageStatus::Skipped);
        assert_eq!(report.results[3].status, StageStatus::Skipped);

        let failure = report.failure().unwrap();
        assert_eq!(failure.position, Some(2));
        assert_eq!(failure.kind, FailureKind::Engine);
        assert!(failure.reason.contains("scripted failure"));
    }

    #[tokio::test]
    async fn test_rerun_overwrites_same_tags() {
        let engine = Arc::new(MockEngine::new());
        let spec = linear_spec(&["a", "b"]);
        let controller = controller(engine.clone());

        let first = controller.run(&spec, &CancellationToken::new()).await;
        let second = controller.run(&spec, &CancellationToken::new()).await;

        assert!(first.is_success());
        assert!(second.is_success());
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(engine.build_count(), 4);
        assert_eq!(engine.artifacts(), vec!["wigwam-test-a", "wigwam-test-b"]);
    }

    #[tokio::test]
    async fn test_recomposed_single_stage_keeps_its_tag() {
        let composer = standard_composer();
        let request = SingleStage::new("compile").with_base("build-configured");
        let engine = Arc::new(MockEngine::new().with_artifacts(["wigwam-build-configured"]));
        let controller = controller(engine.clone());

        let first = controller
            .run(&composer.single(&request).unwrap(), &CancellationToken::new())
            .await;
        let second = controller
            .run(&composer.single(&request).unwrap(), &CancellationToken::new())
            .await;

        assert!(first.is_success());
        assert!(second.is_success());
        assert_eq!(first.results[0].tag, second.results[0].tag);
        assert_eq!(first.results[0].tag, "wigwam-compiled");
        assert_eq!(engine.build_count(), 2);
        assert_eq!(engine.artifacts(), vec!["wigwam-build-configured", "wigwam-compiled"]);
    }

    #[tokio::test]
    async fn test_setup_all_runs_in_chain_order() {
        let spec = standard_composer()
            .compose(&MacroCommand::SetupAll(
                SetupAll::default().with_base_image("oraclelinux:8.4"),
            ))
            .unwrap();
        let engine = Arc::new(MockEngine::new());

        let report = controller(engine.clone()).run(&spec, &CancellationToken::new()).await;

        assert!(report.is_success());
        assert_eq!(report.final_tag(), Some("wigwam-setup-mamba-dev"));

        let builds = engine.builds();
        let kinds: Vec<&str> = builds.iter().map(|b| b.kind.as_str()).collect();
        assert_eq!(kinds, vec!["init", "runtime-cuda", "runtime-env", "dev-cuda", "dev-env"]);
        assert_eq!(builds[0].base.as_deref(), Some("oraclelinux:8.4"));
        for pair in builds.windows(2) {
            assert_eq!(pair[1].base.as_deref(), Some(pair[0].tag.as_str()));
        }
    }

    #[tokio::test]
    async fn test_full_compile_checks_setup_image_first() {
        let composer = standard_composer();
        let spec = composer
            .compose(&MacroCommand::FullCompile(
                FullCompile::default()
                    .with_source(RepoSource::Insert {
                        path: "isce3/src".to_string(),
                    })
                    .with_build_type("Release"),
            ))
            .unwrap();

        let missing = Arc::new(MockEngine::new());
        let report = controller(missing.clone()).run(&spec, &CancellationToken::new()).await;
        assert_eq!(report.state, RunState::Failed(1));
        assert_eq!(report.failure().map(|f| f.kind), Some(FailureKind::MissingBase));
        assert_eq!(missing.build_count(), 0);

        let ready = Arc::new(MockEngine::new().with_artifacts(["wigwam-setup-mamba-dev"]));
        let report = controller(ready.clone()).run(&spec, &CancellationToken::new()).await;
        assert!(report.is_success());
        assert_eq!(report.final_tag(), Some("wigwam-build-installed"));
        let context = ready.builds()[0].context.clone().unwrap();
        assert!(context.is_absolute());
        assert!(context.ends_with("isce3"));
    }

    #[tokio::test]
    async fn test_distributable_uses_both_bases() {
        let spec = standard_composer()
            .compose(&MacroCommand::Distributable(Distributable::default()))
            .unwrap();
        let engine = Arc::new(
            MockEngine::new().with_artifacts(["wigwam-setup-mamba-runtime", "wigwam-build-installed"]),
        );

        let report = controller(engine.clone()).run(&spec, &CancellationToken::new()).await;

        assert!(report.is_success());
        assert_eq!(report.final_tag(), Some("isce3"));
        let build = &engine.builds()[0];
        assert_eq!(build.base.as_deref(), Some("wigwam-setup-mamba-runtime"));
        assert_eq!(build.source.as_deref(), Some("wigwam-build-installed"));
        assert!(build.no_cache);
    }

    #[tokio::test]
    async fn test_distributable_missing_source() {
        let spec = standard_composer()
            .compose(&MacroCommand::Distributable(Distributable::default()))
            .unwrap();
        let engine = Arc::new(MockEngine::new().with_artifacts(["wigwam-setup-mamba-runtime"]));

        let report = controller(engine.clone()).run(&spec, &CancellationToken::new()).await;

        let failure = report.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::MissingBase);
        assert!(failure.reason.contains("wigwam-build-installed"));
        assert_eq!(engine.build_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_run() {
        let engine = Arc::new(MockEngine::new().with_build_delay(Duration::from_secs(30)));
        let token = Arc::new(CancellationToken::new());
        let spec = linear_spec(&["a", "b", "c"]);

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel("interrupted");
            })
        };

        let report = controller(engine.clone()).run(&spec, &token).await;
        canceller.await.unwrap();

        assert_eq!(report.state, RunState::Failed(1));
        assert_eq!(report.results[0].status, StageStatus::Cancelled);
        assert_eq!(report.results[1].status, StageStatus::Skipped);
        assert_eq!(report.failure().map(|f| f.reason.as_str()), Some("interrupted"));
        assert_eq!(engine.build_count(), 1);
        assert!(engine.artifacts().is_empty());
    }

    #[tokio::test]
    async fn test_failed_run_event_payloads() {
        let engine = Arc::new(MockEngine::new().failing_on("wigwam-test-b"));
        let sink = Arc::new(CollectingEventSink::new());
        let report = RunController::new(BuildExecutor::new(engine))
            .with_event_sink(sink.clone())
            .run(&linear_spec(&["a", "b", "c"]), &CancellationToken::new())
            .await;

        assert_eq!(
            sink.types(),
            vec![
                EventType::PipelineStarted,
                EventType::StageStarted,
                EventType::StageCompleted,
                EventType::StageStarted,
                EventType::StageFailed,
                EventType::PipelineFailed,
            ]
        );

        let started = &sink.events_of_type(EventType::PipelineStarted)[0];
        assert_eq!(started.data["stages"], 3);

        let failed = &sink.events_of_type(EventType::StageFailed)[0];
        assert_eq!(failed.data["position"], 2);
        assert_eq!(failed.data["tag"], "wigwam-test-b");
        assert!(sink.events().iter().all(|e| e.run_id == Some(report.run_id)));
    }

    #[tokio::test]
    async fn test_remove_build_family_with_refusal() {
        let mut engine = MockBuildEngine::new();
        engine.expect_list().times(1).returning(|| {
            Ok(vec![
                "wigwam-build-git-repo".to_string(),
                "wigwam-build-built".to_string(),
                "wigwam-setup-init".to_string(),
                "ubuntu:22.04".to_string(),
            ])
        });
        engine
            .expect_delete()
            .withf(|artifact: &str, force: &bool| artifact == "wigwam-build-git-repo" && !*force)
            .times(1)
            .returning(|_, _| Ok(()));
        engine
            .expect_delete()
            .withf(|artifact: &str, _: &bool| artifact == "wigwam-build-built")
            .times(1)
            .returning(|artifact, _| {
                Err(crate::errors::EngineError::Refused {
                    artifact: artifact.to_string(),
                    reason: "image has dependent child images".to_string(),
                })
            });

        let report = RemovalEngine::new(Arc::new(engine), TagPrefix::default())
            .remove(&[RemovalPattern::new("build-*")], false)
            .await
            .unwrap();

        assert_eq!(report.matched, vec!["wigwam-build-git-repo", "wigwam-build-built"]);
        assert_eq!(report.removed, vec!["wigwam-build-git-repo"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].artifact, "wigwam-build-built");
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_build_then_remove_round() {
        let engine = Arc::new(MockEngine::new().with_artifacts(["wigwam-setup-mamba-dev"]));
        let spec = standard_composer()
            .compose(&MacroCommand::FullCompile(FullCompile::default().with_build_type("Debug")))
            .unwrap();
        assert!(controller(engine.clone()).run(&spec, &CancellationToken::new()).await.is_success());

        let report = RemovalEngine::new(engine.clone(), TagPrefix::default())
            .remove(&[RemovalPattern::new("build-*")], false)
            .await
            .unwrap();

        assert_eq!(report.removed.len(), 4);
        assert_eq!(engine.artifacts(), vec!["wigwam-setup-mamba-dev"]);
    }
}
