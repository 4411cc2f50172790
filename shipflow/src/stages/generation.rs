//! Code generation from a natural-language instruction.

use super::{Stage, StageContext};
use crate::core::{ErrorDetail, ProgressEvent, StageId, StageOutcome};
use crate::generation::{is_completion, is_turn, EngineSupervisor, GenerationRequest, DEFAULT_MAX_TURNS};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives the generation engine and forwards every message as it arrives.
#[derive(Debug, Clone)]
pub struct GenerationStage {
    supervisor: Arc<EngineSupervisor>,
    max_turns: u32,
}

impl GenerationStage {
    /// Creates the stage with the default turn bound.
    #[must_use]
    pub fn new(supervisor: Arc<EngineSupervisor>) -> Self {
        Self {
            supervisor,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    /// Sets the turn bound.
    #[must_use]
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }
}

/// Returns true for a completion message that reports a failure other than
/// running out of turns.
fn is_failed_result(message: &Value) -> bool {
    let is_error = message.get("is_error").and_then(Value::as_bool).unwrap_or(false);
    let subtype = message.get("subtype").and_then(Value::as_str).unwrap_or_default();
    is_error && subtype != "error_max_turns"
}

#[async_trait]
impl Stage for GenerationStage {
    fn id(&self) -> StageId {
        StageId::Generation
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        let engine = match self.supervisor.ready_engine() {
            Ok(engine) => engine,
            Err(err) => {
                warn!(run_id = %ctx.run_id(), error = %err, "Generation engine not ready");
                return StageOutcome::failed(StageId::Generation, "Generation engine not ready", ErrorDetail::new(err.to_string()));
            }
        };

        let Some(instruction) = ctx.instruction().filter(|s| !s.trim().is_empty()) else {
            return StageOutcome::failed(
                StageId::Generation,
                "Generation failed",
                ErrorDetail::new("Message is required"),
            );
        };

        let request = GenerationRequest::new(instruction, ctx.working_dir()).with_max_turns(self.max_turns);
        let mut stream = match engine.start(request).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(run_id = %ctx.run_id(), error = %err, "Generation failed to start");
                return StageOutcome::failed(StageId::Generation, "Generation failed to start", ErrorDetail::new(err.to_string()));
            }
        };

        let mut transcript = Vec::new();
        let mut turns: u32 = 0;
        let mut completed = false;
        let mut failed_result = None;

        while let Some(item) = stream.next().await {
            let message = match item {
                Ok(message) => message,
                Err(err) => {
                    warn!(run_id = %ctx.run_id(), error = %err, "Generation stream failed");
                    let detail = ErrorDetail {
                        output: Some(transcript.join("\n")).filter(|s: &String| !s.is_empty()),
                        ..ErrorDetail::new(err.to_string())
                    };
                    return StageOutcome::failed(StageId::Generation, "Generation failed", detail);
                }
            };

            if is_turn(&message) {
                turns += 1;
            }
            transcript.push(message.to_string());
            let done = is_completion(&message);
            if done && is_failed_result(&message) {
                failed_result = Some(message.clone());
            }
            ctx.emit(ProgressEvent::generation_message(message)).await;

            if done {
                completed = true;
                break;
            }
            if turns >= self.max_turns {
                info!(run_id = %ctx.run_id(), turns, "Generation stopped at turn limit");
                break;
            }
        }
        drop(stream);
        debug!(run_id = %ctx.run_id(), turns, messages = transcript.len(), "Generation stream finished");

        let message_count = transcript.len();
        let output = transcript.join("\n");

        if let Some(result) = failed_result {
            let reason = result
                .get("result")
                .and_then(Value::as_str)
                .unwrap_or("Generation engine reported an error")
                .to_string();
            return StageOutcome::failed(
                StageId::Generation,
                "Generation failed",
                ErrorDetail {
                    output: Some(output.clone()),
                    ..ErrorDetail::new(reason)
                },
            )
            .with_output(output);
        }

        StageOutcome::succeeded(StageId::Generation, "Generation complete", output)
            .with_metadata("turns", Value::from(turns))
            .with_metadata("messages", Value::from(message_count))
            .with_metadata("completed", Value::Bool(completed))
    }
}
