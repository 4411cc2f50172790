//! Generation engine seam and message stream.

use crate::errors::GenerationError;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default upper bound on engine turns per run.
pub const DEFAULT_MAX_TURNS: u32 = 50;

/// Queue depth between the engine producer task and the stage.
pub const MESSAGE_BUFFER: usize = 32;

/// What the generation engine is asked to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The natural-language instruction.
    pub prompt: String,
    /// The project directory the engine edits.
    pub working_dir: PathBuf,
    /// Upper bound on engine turns.
    pub max_turns: u32,
}

impl GenerationRequest {
    /// Creates a request with the default turn bound.
    #[must_use]
    pub fn new(prompt: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            working_dir: working_dir.into(),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    /// Sets the turn bound.
    #[must_use]
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }
}

/// Returns true if the message is the engine's completion signal.
#[must_use]
pub fn is_completion(message: &Value) -> bool {
    message.get("type").and_then(Value::as_str) == Some("result")
}

/// Returns true if the message counts as one engine turn.
#[must_use]
pub fn is_turn(message: &Value) -> bool {
    message.get("type").and_then(Value::as_str) == Some("assistant")
}

/// A lazy, finite, non-restartable sequence of engine messages.
///
/// Backed by a bounded queue fed by a producer task. Dropping the stream
/// aborts the producer.
#[derive(Debug)]
pub struct MessageStream {
    rx: mpsc::Receiver<Result<Value, GenerationError>>,
    producer: Option<JoinHandle<()>>,
}

impl MessageStream {
    /// Creates a stream from a receiver and the task feeding it.
    #[must_use]
    pub fn new(
        rx: mpsc::Receiver<Result<Value, GenerationError>>,
        producer: Option<JoinHandle<()>>,
    ) -> Self {
        Self { rx, producer }
    }

    /// Creates a stream that yields the given messages and ends.
    #[must_use]
    pub fn from_messages(messages: Vec<Value>) -> Self {
        Self::from_results(messages.into_iter().map(Ok).collect())
    }

    /// Creates a stream that yields the given results and ends.
    #[must_use]
    pub fn from_results(results: Vec<Result<Value, GenerationError>>) -> Self {
        let (tx, rx) = mpsc::channel(results.len().max(1));
        for result in results {
            // Capacity equals the item count, so this never fails.
            let _ = tx.try_send(result);
        }
        Self::new(rx, None)
    }
}

impl Stream for MessageStream {
    type Item = Result<Value, GenerationError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

/// An external code-generation engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationEngine: Send + Sync + fmt::Debug {
    /// Checks the engine is installed and usable. Returns a version string.
    async fn probe(&self) -> Result<String, GenerationError>;

    /// Starts a generation session and returns its message stream.
    async fn start(&self, request: GenerationRequest) -> Result<MessageStream, GenerationError>;
}
