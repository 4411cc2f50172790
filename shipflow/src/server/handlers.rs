//! HTTP handlers.

use super::error::ApiError;
use super::sse::stream_run;
use super::state::AppState;
use crate::core::{OutcomeStatus, StageId, StageOutcome};
use crate::events::LoggingEventSink;
use crate::pipeline::RunRequest;
use crate::project::read_tree;
use crate::utils::iso_timestamp;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Body of `POST /generate-preview`.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    /// The natural-language instruction.
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `POST /commit`. Optional.
#[derive(Debug, Default, Deserialize)]
pub struct CommitRequest {
    /// Commit message override.
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /`
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "API is running",
        "status": "active",
        "timestamp": iso_timestamp(),
    }))
}

/// `POST /generate-preview`
pub async fn generate_preview(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if let Err(err) = state.supervisor.ready_engine() {
        warn!(error = %err, "Generation requested before the engine is ready");
        return Err(ApiError::EngineNotReady {
            state: state.supervisor.state().to_string(),
        });
    }

    let request: GenerateRequest = parse_optional_body(&body).unwrap_or_default();
    let message = request
        .message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .ok_or(ApiError::MissingMessage)?;

    info!(chars = message.len(), "Instruction run requested");
    let run = RunRequest::instruction(&state.config.project_dir, message);
    Ok(stream_run(&state, run).into_response())
}

/// `PUT /config`
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if !state.store.exists() {
        return Err(ApiError::ConfigNotFound);
    }
    let patch: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidPatch(format!("body is not valid JSON: {e}")))?;

    if !patch.is_object() {
        return Err(ApiError::InvalidPatch(
            "configuration patch must be a JSON object".to_string(),
        ));
    }

    info!(path = %state.store.path().display(), "Configuration patch queued");
    let run = RunRequest::config_patch(&state.config.project_dir, state.store.clone(), patch);
    Ok(stream_run(&state, run).into_response())
}

/// `GET /config`
pub async fn get_config(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let config = state
        .store
        .load()
        .await
        .map_err(|e| ApiError::from_config("Error reading config file", e))?;
    Ok(Json(config))
}

/// `POST /deploy`
pub async fn deploy(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    if !state.config.output_path().is_dir() {
        return Err(ApiError::BuildNotFound);
    }
    info!("Promote run requested");
    let run = RunRequest::promote(&state.config.project_dir);
    Ok(stream_run(&state, run).into_response())
}

/// `GET /files`
pub async fn list_files(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let tree = read_tree(state.config.project_dir.clone()).await?;
    Ok(Json(json!({
        "message": "Files and folders in the project directory",
        "status": "success",
        "timestamp": iso_timestamp(),
        "data": tree,
    })))
}

/// `GET /engine-status`
pub async fn engine_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "message": "Generation engine status",
        "status": "success",
        "timestamp": iso_timestamp(),
        "data": state.supervisor.status(),
    }))
}

/// `POST /commit`
///
/// Runs the version control stage alone and answers with its outcome.
pub async fn commit(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: CommitRequest = parse_optional_body(&body).unwrap_or_default();
    let run = RunRequest::commit_only(&state.config.project_dir, request.message);

    let report = state
        .orchestrator
        .run_with_cancellation(run, Arc::new(LoggingEventSink::default()), state.shutdown.child())
        .await;

    match report.outcome(StageId::VersionControl) {
        Some(outcome) => commit_response(outcome),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "message": "Failed to commit and push changes",
                "status": OutcomeStatus::Error,
                "details": report.fault.unwrap_or_default(),
            })),
        )
            .into_response(),
    }
}

fn commit_response(outcome: &StageOutcome) -> Response {
    let details = outcome
        .metadata_value("details")
        .cloned()
        .or_else(|| outcome.error_detail.as_ref().map(|d| Value::String(d.message.clone())))
        .unwrap_or_else(|| Value::String(outcome.output.clone()));
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(json!({
            "message": outcome.summary,
            "status": outcome.status,
            "details": details,
        })),
    )
        .into_response()
}

fn parse_optional_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Option<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    serde_json::from_slice(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::core::ErrorDetail;
    use crate::testing::{ScriptedEngine, ScriptedRunner};
    use pretty_assertions::assert_eq;

    fn state_for(dir: &std::path::Path, runner: Arc<ScriptedRunner>) -> Arc<AppState> {
        let config = ServiceConfig {
            project_dir: dir.to_path_buf(),
            ..ServiceConfig::default()
        };
        Arc::new(AppState::new(config, runner, Arc::new(ScriptedEngine::new(vec![]))).unwrap())
    }

    async fn sse_events(response: Response) -> Vec<Value> {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    #[test]
    fn test_optional_body() {
        let parsed: Option<CommitRequest> = parse_optional_body(b"  ");
        assert!(parsed.is_none());

        let parsed: Option<CommitRequest> = parse_optional_body(br#"{"message": "Tidy"}"#);
        assert_eq!(parsed.unwrap().message.as_deref(), Some("Tidy"));
    }

    #[test]
    fn test_commit_response_codes() {
        let ok = StageOutcome::no_changes(StageId::VersionControl, "No changes to commit - working directory is clean", "");
        assert_eq!(commit_response(&ok).status(), StatusCode::OK);

        let failed = StageOutcome::failed(
            StageId::VersionControl,
            "Failed to commit and push changes",
            ErrorDetail::new("fatal: not a git repository"),
        );
        assert_eq!(commit_response(&failed).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_generate_requires_ready_engine() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path(), Arc::new(ScriptedRunner::new()));

        let err = generate_preview(State(state), Bytes::from_static(br#"{"message": "Add a footer"}"#))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_generate_requires_message() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path(), Arc::new(ScriptedRunner::new()));
        state.supervisor.initialize().await.unwrap();

        let err = generate_preview(State(state), Bytes::from_static(br#"{"message": "  "}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MissingMessage));
    }

    #[tokio::test]
    async fn test_config_endpoints_need_document() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path(), Arc::new(ScriptedRunner::new()));

        let err = get_config(State(Arc::clone(&state))).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = update_config(State(state), Bytes::from_static(br#"{"a": 1}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ConfigNotFound));
    }

    #[tokio::test]
    async fn test_config_patch_streams_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("manifest.config.json"), r#"{"title": "Shop", "nav": {"items": 3}}"#).unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let state = state_for(dir.path(), runner.clone());

        let response = update_config(State(Arc::clone(&state)), Bytes::from_static(br#"{"nav": {"items": 4}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let events = sse_events(response).await;
        assert_eq!(events[0]["type"], json!("config_updated"));
        assert_eq!(events[0]["config"], json!({"title": "Shop", "nav": {"items": 4}}));
        assert_eq!(events.last().unwrap()["type"], json!("complete"));
        assert_eq!(runner.count("npm run build"), 1);

        let Json(saved) = get_config(State(state)).await.unwrap();
        assert_eq!(saved["nav"]["items"], json!(4));
    }

    #[tokio::test]
    async fn test_config_patch_waits_for_running_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("manifest.config.json"), r#"{"title": "Old"}"#).unwrap();
        let state = state_for(dir.path(), Arc::new(ScriptedRunner::new()));

        let guard = state.orchestrator.locks().acquire(dir.path()).await;
        let response = update_config(State(Arc::clone(&state)), Bytes::from_static(br#"{"title": "New"}"#))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let Json(saved) = get_config(State(Arc::clone(&state))).await.unwrap();
        assert_eq!(saved["title"], json!("Old"));

        drop(guard);
        let events = sse_events(response).await;
        assert_eq!(events[0]["config"], json!({"title": "New"}));
        let Json(saved) = get_config(State(state)).await.unwrap();
        assert_eq!(saved["title"], json!("New"));
    }

    #[tokio::test]
    async fn test_config_patch_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("manifest.config.json"), "{}").unwrap();
        let state = state_for(dir.path(), Arc::new(ScriptedRunner::new()));

        let err = update_config(State(state), Bytes::from_static(b"[1, 2]")).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_deploy_needs_build_output() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path(), Arc::new(ScriptedRunner::new()));

        let err = deploy(State(state)).await.unwrap_err();
        assert!(matches!(err, ApiError::BuildNotFound));
    }

    #[tokio::test]
    async fn test_files_missing_project() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(&dir.path().join("absent"), Arc::new(ScriptedRunner::new()));

        let err = list_files(State(state)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_commit_endpoint_reports_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let state = state_for(dir.path(), runner.clone());

        let response = commit(State(state), Bytes::from_static(br#"{"message": "Tidy up"}"#)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(runner.count("git commit -m \"Tidy up\""), 1);
    }

    #[tokio::test]
    async fn test_engine_status_shape() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path(), Arc::new(ScriptedRunner::new()));

        let Json(body) = engine_status(State(state)).await;
        assert_eq!(body["data"]["is_initialized"], json!(false));
    }
}
