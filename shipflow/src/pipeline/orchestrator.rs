//! Sequential stage execution with a single-writer event stream.

use super::locks::WorkspaceLocks;
use super::run::{PipelineRun, RunKind, RunRequest};
use crate::cancellation::CancellationToken;
use crate::core::{ProgressEvent, RunStatus, StageId, StageOutcome};
use crate::errors::ShipflowError;
use crate::events::{EventSink, EventStream};
use crate::observability::{SpanTimer, StageSpanAttributes};
use crate::stages::{Destination, ProgressSender, Stage, StageContext};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default depth of the per-stage progress queue.
pub const DEFAULT_PROGRESS_BUFFER: usize = 64;

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// The run id.
    pub run_id: Uuid,
    /// The run kind.
    pub kind: RunKind,
    /// Final status.
    pub status: RunStatus,
    /// Outcomes of the stages that ran, in order.
    pub outcomes: Vec<StageOutcome>,
    /// Set when the run ended on a fault or cancellation rather than a stage outcome.
    pub fault: Option<String>,
    /// Wall-clock duration.
    pub duration_ms: f64,
}

impl RunReport {
    /// Returns true if every stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Returns the outcome of `stage`, if it ran.
    #[must_use]
    pub fn outcome(&self, stage: StageId) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage == stage)
    }
}

enum StageRun {
    Finished(StageOutcome),
    Faulted(String),
}

/// Runs stage sequences for each [`RunKind`] and reports progress to a sink.
///
/// Stages within a run execute strictly in order. Runs on the same working
/// directory are serialized by [`WorkspaceLocks`]; runs on different
/// directories proceed concurrently.
pub struct PipelineOrchestrator {
    stages: HashMap<StageId, Arc<dyn Stage>>,
    locks: WorkspaceLocks,
    progress_buffer: usize,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator with no stages registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: HashMap::new(),
            locks: WorkspaceLocks::new(),
            progress_buffer: DEFAULT_PROGRESS_BUFFER,
        }
    }

    /// Registers a stage under its own id, replacing any previous one.
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.insert(stage.id(), stage);
        self
    }

    /// Shares a lock table with other orchestrators.
    #[must_use]
    pub fn with_locks(mut self, locks: WorkspaceLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Sets the per-stage progress queue depth.
    #[must_use]
    pub fn with_progress_buffer(mut self, capacity: usize) -> Self {
        self.progress_buffer = capacity.max(1);
        self
    }

    /// Returns the lock table.
    #[must_use]
    pub fn locks(&self) -> &WorkspaceLocks {
        &self.locks
    }

    /// Returns true if a stage is registered for `id`.
    #[must_use]
    pub fn has_stage(&self, id: StageId) -> bool {
        self.stages.contains_key(&id)
    }

    /// Executes a run with a fresh cancellation token.
    pub async fn run(&self, request: RunRequest, sink: Arc<dyn EventSink>) -> RunReport {
        self.run_with_cancellation(request, sink, CancellationToken::new())
            .await
    }

    /// Executes a run.
    ///
    /// Exactly one terminal event is emitted, last, and the sink is closed
    /// once, on every exit path.
    pub async fn run_with_cancellation(
        &self,
        request: RunRequest,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> RunReport {
        let started = Instant::now();
        let mut run = PipelineRun::new(request.kind);
        let mut stream = EventStream::new(run.id(), sink);

        info!(run_id = %run.id(), kind = %request.kind, cwd = %request.working_dir.display(), "Run started");

        let guard = self.locks.acquire(&request.working_dir).await;
        debug!(run_id = %run.id(), path = %guard.path().display(), "Workspace lock acquired");

        let mut outcomes = Vec::new();
        let mut fault = None;

        if let Some(pending) = &request.config_patch {
            match pending.store.apply_patch(&pending.patch).await {
                Ok(merged) => {
                    stream.emit(ProgressEvent::config_updated(merged)).await;
                }
                Err(err) => {
                    let err = ShipflowError::from(err);
                    error!(run_id = %run.id(), error = %err, "Configuration merge failed");
                    run.fail();
                    stream
                        .finish(ProgressEvent::error(
                            "Config update failed",
                            json!({ "message": err.to_string() }),
                        ))
                        .await;
                    fault = Some(err.to_string());
                }
            }
        }

        let stages: &[StageId] = if fault.is_none() {
            stream.emit(ProgressEvent::status(request.kind.opening_message())).await;
            request.kind.stages()
        } else {
            &[]
        };

        for &stage_id in stages {
            if cancel.is_cancelled() {
                let reason = cancel.reason().unwrap_or_else(|| "cancelled".to_string());
                warn!(run_id = %run.id(), stage = %stage_id, reason = %reason, "Run cancelled");
                run.fail();
                stream
                    .finish(ProgressEvent::error(
                        "Run cancelled",
                        json!({ "reason": reason, "next_stage": stage_id }),
                    ))
                    .await;
                fault = Some(format!("cancelled: {reason}"));
                break;
            }

            let Some(stage) = self.stages.get(&stage_id).cloned() else {
                error!(run_id = %run.id(), stage = %stage_id, "No stage registered");
                run.fail();
                stream
                    .finish(ProgressEvent::error(
                        "Internal pipeline fault",
                        json!({ "stage": stage_id, "message": "stage not configured" }),
                    ))
                    .await;
                fault = Some(format!("{stage_id} not configured"));
                break;
            };

            run.enter(stage_id);
            stream
                .emit(ProgressEvent::stage_status(
                    stage_id,
                    stage_marker(stage_id, request.kind, run.completed().last().copied()),
                ))
                .await;

            let (progress, mut progress_rx) = ProgressSender::channel(self.progress_buffer);
            let ctx = StageContext::new(run.id(), request.kind, request.working_dir.clone(), progress)
                .with_instruction(request.instruction.clone())
                .with_commit_message(request.commit_message.clone());

            let timer = SpanTimer::start(stage_id.to_string());
            let mut handle = tokio::spawn(async move { stage.execute(&ctx).await });

            let joined = loop {
                tokio::select! {
                    biased;
                    Some(event) = progress_rx.recv() => {
                        stream.emit(event).await;
                    }
                    result = &mut handle => break result,
                }
            };
            while let Ok(event) = progress_rx.try_recv() {
                stream.emit(event).await;
            }

            let duration_ms = timer.finish();
            match settle(stage_id, joined) {
                StageRun::Finished(outcome) => {
                    let attrs = StageSpanAttributes::new(stage_id)
                        .with_status(outcome.status)
                        .with_duration_ms(duration_ms);
                    if outcome.success {
                        debug!(run_id = %run.id(), attributes = ?attrs.to_attributes(), "Stage finished");
                        run.stage_succeeded(stage_id);
                        stream
                            .emit(
                                ProgressEvent::stage_status(stage_id, outcome.summary.clone())
                                    .with_field("status", Value::String(outcome.status.to_string())),
                            )
                            .await;
                        outcomes.push(outcome);
                    } else {
                        let attrs = attrs.with_error(outcome.summary.clone());
                        warn!(run_id = %run.id(), attributes = ?attrs.to_attributes(), "Stage failed");
                        run.fail();
                        stream
                            .finish(ProgressEvent::error(
                                request.kind.failure_message(stage_id),
                                failure_details(&outcome),
                            ))
                            .await;
                        outcomes.push(outcome);
                        break;
                    }
                }
                StageRun::Faulted(message) => {
                    let fault_error = ShipflowError::StageFault {
                        stage: stage_id,
                        message: message.clone(),
                    };
                    error!(run_id = %run.id(), error = %fault_error, "Stage task faulted");
                    run.fail();
                    stream
                        .finish(ProgressEvent::error(
                            "Internal pipeline fault",
                            json!({ "stage": stage_id, "message": message }),
                        ))
                        .await;
                    fault = Some(fault_error.to_string());
                    break;
                }
            }
        }

        if run.succeed() {
            stream
                .finish(ProgressEvent::complete(
                    completion_message(request.kind, &outcomes),
                    completion_details(&outcomes),
                ))
                .await;
        }
        stream.close().await;
        drop(guard);

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(
            run_id = %run.id(),
            kind = %request.kind,
            status = %run.status(),
            duration_ms,
            delivered = stream.delivered(),
            dropped = stream.dropped(),
            "Run finished"
        );

        RunReport {
            run_id: run.id(),
            kind: request.kind,
            status: run.status(),
            outcomes,
            fault,
            duration_ms,
        }
    }
}

impl Default for PipelineOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stages: Vec<_> = self.stages.keys().map(ToString::to_string).collect();
        stages.sort();
        f.debug_struct("PipelineOrchestrator")
            .field("stages", &stages)
            .field("progress_buffer", &self.progress_buffer)
            .finish_non_exhaustive()
    }
}

fn settle(stage: StageId, joined: Result<StageOutcome, JoinError>) -> StageRun {
    match joined {
        Ok(outcome) => StageRun::Finished(outcome),
        Err(err) if err.is_panic() => {
            let payload = err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "stage panicked".to_string());
            StageRun::Faulted(format!("{stage} panicked: {message}"))
        }
        Err(err) => StageRun::Faulted(format!("{stage} task aborted: {err}")),
    }
}

fn stage_marker(stage: StageId, kind: RunKind, previous: Option<StageId>) -> &'static str {
    match stage {
        StageId::Generation => "Generating changes...",
        StageId::Build => "Starting build process...",
        StageId::VersionControl if previous == Some(StageId::Build) => "Build complete. Committing changes...",
        StageId::VersionControl => "Committing changes...",
        StageId::Publish => match kind.destination() {
            Destination::Development => "Uploading to development...",
            Destination::Production => "Uploading to production...",
        },
    }
}

fn failure_details(outcome: &StageOutcome) -> Value {
    let mut details = match outcome.error_detail.as_ref().map(crate::core::ErrorDetail::to_value) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    details.insert("stage".to_string(), Value::String(outcome.stage.to_string()));
    details.insert("summary".to_string(), Value::String(outcome.summary.clone()));
    Value::Object(details)
}

fn completion_message(kind: RunKind, outcomes: &[StageOutcome]) -> String {
    match (kind, outcomes.last()) {
        (RunKind::CommitOnly, Some(outcome)) => outcome.summary.clone(),
        _ => kind.completion_message().to_string(),
    }
}

fn completion_details(outcomes: &[StageOutcome]) -> Value {
    let stages = outcomes
        .iter()
        .map(|outcome| {
            let mut summary = outcome.summary_value();
            if let Value::Object(map) = &mut summary {
                map.insert("stage".to_string(), Value::String(outcome.stage.to_string()));
            }
            summary
        })
        .collect::<Vec<_>>();
    json!({ "stages": stages })
}
