//! End-to-end runs through the real stages with scripted collaborators.

#[cfg(test)]
mod tests {
    use crate::config::ConfigStore;
    use crate::core::{EventKind, OutcomeStatus, RunStatus, StageId};
    use crate::events::{ChannelEventSink, CollectingEventSink};
    use crate::generation::EngineSupervisor;
    use crate::pipeline::{PipelineOrchestrator, RunRequest};
    use crate::stages::{BuildStage, GenerationStage, PublishStage, VersionControlStage};
    use crate::testing::{
        assert_single_terminal_last, assert_timestamps_monotonic, status_messages, ScriptedEngine,
        ScriptedResponse, ScriptedRunner,
    };
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("dist/index.html"), "<html>v1</html>").unwrap();
        dir
    }

    fn config_run(dir: &TempDir, patch: Value) -> RunRequest {
        let store = ConfigStore::new(dir.path().join("manifest.config.json"));
        std::fs::write(store.path(), "{}").unwrap();
        RunRequest::config_patch(dir.path(), store, patch)
    }

    async fn orchestrator(runner: Arc<ScriptedRunner>, engine: ScriptedEngine) -> PipelineOrchestrator {
        let supervisor = Arc::new(EngineSupervisor::new(Arc::new(engine)));
        supervisor.initialize().await.unwrap();
        PipelineOrchestrator::new()
            .with_stage(Arc::new(GenerationStage::new(supervisor)))
            .with_stage(Arc::new(BuildStage::new(runner.clone())))
            .with_stage(Arc::new(VersionControlStage::new(runner.clone())))
            .with_stage(Arc::new(PublishStage::new(runner)))
    }

    fn transcript() -> Vec<Value> {
        vec![
            json!({"type": "system", "subtype": "init"}),
            json!({"type": "assistant", "message": {"content": "Editing Footer.tsx"}}),
            json!({"type": "result", "subtype": "success", "is_error": false}),
        ]
    }

    #[tokio::test]
    async fn test_instruction_run_end_to_end() {
        let dir = project();
        let runner = Arc::new(ScriptedRunner::new().on("git config user.name", ScriptedResponse::ok("Dev")));
        let orchestrator = orchestrator(runner.clone(), ScriptedEngine::new(transcript())).await;
        let sink = Arc::new(CollectingEventSink::new());

        let report = orchestrator
            .run(RunRequest::instruction(dir.path(), "Add a footer"), sink.clone())
            .await;

        assert!(report.is_success());
        assert_eq!(report.outcomes.len(), 4);

        let events = sink.events();
        assert_single_terminal_last(&events);
        assert_timestamps_monotonic(&events);

        let forwarded: Vec<Value> = events
            .iter()
            .filter(|e| e.kind == EventKind::GenerationMessage)
            .map(|e| e.get("message").cloned().unwrap())
            .collect();
        assert_eq!(forwarded, transcript());

        assert_eq!(
            runner.invocations(),
            vec![
                "npm run build".to_string(),
                "git config user.name".to_string(),
                "git add .".to_string(),
                "git commit -m \"Add a footer\"".to_string(),
                "git push".to_string(),
                "aws s3 sync dist/ s3://manifest-frontends-dev/default-app/ --delete".to_string(),
            ]
        );
        assert_eq!(status_messages(&events)[0], "Starting generation...");
        assert_eq!(
            sink.last().unwrap().message(),
            Some("Build and deployment completed successfully")
        );
    }

    #[tokio::test]
    async fn test_build_failure_prevents_commit_and_publish() {
        let dir = project();
        let runner = Arc::new(ScriptedRunner::new().on("npm run build", ScriptedResponse::fail(2, "SyntaxError")));
        let orchestrator = orchestrator(runner.clone(), ScriptedEngine::new(vec![])).await;
        let sink = Arc::new(CollectingEventSink::new());

        let report = orchestrator
            .run(config_run(&dir, json!({})), sink.clone())
            .await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(runner.count("git"), 0);
        assert_eq!(runner.count("aws"), 0);

        let events = sink.events();
        assert_single_terminal_last(&events);
        let last = events.last().unwrap();
        assert_eq!(last.get("error"), Some(&json!("Build failed")));
        assert_eq!(last.get("details").unwrap()["exit_code"], json!(2));
    }

    #[tokio::test]
    async fn test_empty_commit_is_benign() {
        let dir = project();
        let runner = Arc::new(
            ScriptedRunner::new().on("git commit", ScriptedResponse::fail_stdout(1, "nothing to commit, working tree clean")),
        );
        let orchestrator = orchestrator(runner.clone(), ScriptedEngine::new(vec![])).await;
        let sink = Arc::new(CollectingEventSink::new());

        let report = orchestrator
            .run(config_run(&dir, json!({})), sink.clone())
            .await;

        assert!(report.is_success());
        let vc = report.outcome(StageId::VersionControl).unwrap();
        assert!(vc.success);
        assert_eq!(vc.status, OutcomeStatus::NoChanges);
        assert_eq!(runner.count("aws s3 sync"), 1);
    }

    #[tokio::test]
    async fn test_promote_twice_yields_identical_digests() {
        let dir = project();
        let runner = Arc::new(ScriptedRunner::new());
        let orchestrator = orchestrator(runner.clone(), ScriptedEngine::new(vec![])).await;

        let first = orchestrator
            .run(RunRequest::promote(dir.path()), Arc::new(CollectingEventSink::new()))
            .await;
        let second = orchestrator
            .run(RunRequest::promote(dir.path()), Arc::new(CollectingEventSink::new()))
            .await;

        assert!(first.is_success() && second.is_success());
        let digest = |r: &crate::pipeline::RunReport| {
            r.outcome(StageId::Publish)
                .and_then(|o| o.metadata_value("artifact_digest"))
                .cloned()
        };
        assert!(digest(&first).is_some());
        assert_eq!(digest(&first), digest(&second));
        assert_eq!(runner.count("aws s3 sync dist/ s3://manifest-frontends/"), 2);
    }

    #[tokio::test]
    async fn test_promote_without_build_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let orchestrator = orchestrator(runner.clone(), ScriptedEngine::new(vec![])).await;
        let sink = Arc::new(CollectingEventSink::new());

        let report = orchestrator.run(RunRequest::promote(dir.path()), sink.clone()).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert!(runner.invocations().is_empty());
        assert_eq!(sink.last().unwrap().get("error"), Some(&json!("Publish failed")));
    }

    #[tokio::test]
    async fn test_config_patch_announces_merged_document() {
        let dir = project();
        let store = ConfigStore::new(dir.path().join("manifest.config.json"));
        store.replace(&json!({"theme": {"color": "blue", "font": "Inter"}})).await.unwrap();

        let runner = Arc::new(ScriptedRunner::new());
        let orchestrator = orchestrator(runner.clone(), ScriptedEngine::new(vec![])).await;
        let sink = Arc::new(CollectingEventSink::new());

        orchestrator
            .run(
                RunRequest::config_patch(dir.path(), store.clone(), json!({"theme": {"color": "red"}})),
                sink.clone(),
            )
            .await;

        let events = sink.events();
        assert_eq!(events[0].kind, EventKind::ConfigUpdated);
        assert_eq!(
            events[0].get("config"),
            Some(&json!({"theme": {"color": "red", "font": "Inter"}}))
        );
        assert_eq!(runner.count("git commit -m \"Update configuration via API\""), 1);
        assert_eq!(store.load().await.unwrap()["theme"]["color"], json!("red"));
    }

    #[tokio::test]
    async fn test_generation_error_stops_before_build() {
        let dir = project();
        let runner = Arc::new(ScriptedRunner::new());
        let engine = ScriptedEngine::new(vec![json!({"type": "assistant"})]).then_fail(
            crate::errors::GenerationError::Exited {
                status: "exit status: 1".to_string(),
                stderr: "rate limited".to_string(),
            },
        );
        let orchestrator = orchestrator(runner.clone(), engine).await;
        let sink = Arc::new(CollectingEventSink::new());

        let report = orchestrator
            .run(RunRequest::instruction(dir.path(), "Add a footer"), sink.clone())
            .await;

        assert_eq!(report.status, RunStatus::Failed);
        assert!(runner.invocations().is_empty());
        let events = sink.events();
        assert_single_terminal_last(&events);
        assert_eq!(events.last().unwrap().get("error"), Some(&json!("Generation failed")));
    }

    #[tokio::test]
    async fn test_disconnected_client_does_not_stop_run() {
        let dir = project();
        let runner = Arc::new(ScriptedRunner::new());
        let orchestrator = orchestrator(runner.clone(), ScriptedEngine::new(vec![])).await;
        let (sink, rx) = ChannelEventSink::new(1);
        drop(rx);

        let report = orchestrator.run(RunRequest::promote(dir.path()), Arc::new(sink)).await;

        assert!(report.is_success());
        assert_eq!(runner.count("aws s3 sync"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_runs_on_one_project_are_serialized() {
        let dir = project();
        let runner = Arc::new(ScriptedRunner::new());
        let orchestrator = Arc::new(orchestrator(runner.clone(), ScriptedEngine::new(vec![])).await);

        let guard = orchestrator.locks().acquire(dir.path()).await;
        let pending = {
            let orchestrator = Arc::clone(&orchestrator);
            let path = dir.path().to_path_buf();
            tokio::spawn(async move {
                orchestrator
                    .run(RunRequest::promote(path), Arc::new(CollectingEventSink::new()))
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(runner.count("aws"), 0);

        drop(guard);
        let report = pending.await.unwrap();
        assert!(report.is_success());
        assert_eq!(runner.count("aws"), 1);
    }
}
