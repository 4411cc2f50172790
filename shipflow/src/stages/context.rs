//! Per-stage execution context.

use super::Destination;
use crate::core::ProgressEvent;
use crate::pipeline::RunKind;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

/// Pushes progress events from a running stage to the orchestrator.
///
/// Events are queued in order and forwarded by the orchestrator while the
/// stage is still running.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSender {
    /// Creates a sender and the receiver that drains it.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// Creates a sender that discards every event.
    #[must_use]
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Queues an event. Returns false if nobody is listening.
    pub async fn send(&self, event: ProgressEvent) -> bool {
        match &self.tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => {
                trace!(event_type = %event.kind, "Progress event discarded");
                false
            }
        }
    }
}

/// Everything a stage needs to run.
#[derive(Debug, Clone)]
pub struct StageContext {
    run_id: Uuid,
    kind: RunKind,
    working_dir: PathBuf,
    instruction: Option<String>,
    commit_message: Option<String>,
    destination: Destination,
    progress: ProgressSender,
}

impl StageContext {
    /// Creates a context for a run.
    #[must_use]
    pub fn new(run_id: Uuid, kind: RunKind, working_dir: impl Into<PathBuf>, progress: ProgressSender) -> Self {
        Self {
            run_id,
            kind,
            working_dir: working_dir.into(),
            instruction: None,
            commit_message: None,
            destination: kind.destination(),
            progress,
        }
    }

    /// Creates a context whose progress events go nowhere.
    #[must_use]
    pub fn detached(kind: RunKind, working_dir: impl Into<PathBuf>) -> Self {
        Self::new(Uuid::new_v4(), kind, working_dir, ProgressSender::disconnected())
    }

    /// Sets the natural-language instruction.
    #[must_use]
    pub fn with_instruction(mut self, instruction: Option<String>) -> Self {
        self.instruction = instruction;
        self
    }

    /// Sets the commit message.
    #[must_use]
    pub fn with_commit_message(mut self, message: Option<String>) -> Self {
        self.commit_message = message;
        self
    }

    /// Overrides the publish destination.
    #[must_use]
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the run kind.
    #[must_use]
    pub fn kind(&self) -> RunKind {
        self.kind
    }

    /// Returns the project directory.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Returns the instruction, if any.
    #[must_use]
    pub fn instruction(&self) -> Option<&str> {
        self.instruction.as_deref()
    }

    /// Returns the commit message, if any.
    #[must_use]
    pub fn commit_message(&self) -> Option<&str> {
        self.commit_message.as_deref()
    }

    /// Returns the publish destination.
    #[must_use]
    pub fn destination(&self) -> Destination {
        self.destination
    }

    /// Queues a progress event for the orchestrator.
    pub async fn emit(&self, event: ProgressEvent) -> bool {
        self.progress.send(event).await
    }
}
