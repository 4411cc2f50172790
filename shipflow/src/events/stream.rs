//! The per-run writer half of the push protocol.

use super::EventSink;
use crate::core::ProgressEvent;
use crate::errors::SinkError;
use crate::utils::{clamp_monotonic, Timestamp};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Single-writer wrapper around an [`EventSink`] for one pipeline run.
///
/// Guarantees, regardless of the sink implementation:
/// - every event carries the run id;
/// - timestamps never decrease;
/// - at most one terminal event is forwarded, and nothing after it;
/// - the sink is closed at most once.
///
/// Sink failures are transport errors. They are logged and counted but never
/// abort the run.
///
/// A stream dropped before it was closed (the run panicked or its task was
/// aborted) sends an `Internal pipeline fault` error if no terminal event went
/// out, then closes the sink.
pub struct EventStream {
    run_id: Uuid,
    sink: Arc<dyn EventSink>,
    last_timestamp: Option<Timestamp>,
    terminal_sent: bool,
    closed: bool,
    delivered: usize,
    dropped: usize,
}

impl EventStream {
    /// Opens a stream for the given run.
    #[must_use]
    pub fn new(run_id: Uuid, sink: Arc<dyn EventSink>) -> Self {
        Self {
            run_id,
            sink,
            last_timestamp: None,
            terminal_sent: false,
            closed: false,
            delivered: 0,
            dropped: 0,
        }
    }

    /// Returns the run id stamped on every event.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Forwards a non-terminal or terminal event.
    ///
    /// Returns true if the sink accepted it. Events after the terminal event
    /// are discarded.
    pub async fn emit(&mut self, mut event: ProgressEvent) -> bool {
        if self.closed || self.terminal_sent {
            warn!(
                run_id = %self.run_id,
                event_type = %event.kind,
                "Discarding event emitted after the run ended"
            );
            return false;
        }

        event.run_id = Some(self.run_id);
        event.timestamp = clamp_monotonic(event.timestamp, self.last_timestamp);
        self.last_timestamp = Some(event.timestamp);
        if event.is_terminal() {
            self.terminal_sent = true;
        }

        match self.sink.emit(event).await {
            Ok(()) => {
                self.delivered += 1;
                true
            }
            Err(err) => {
                self.dropped += 1;
                if self.dropped == 1 || err == SinkError::Closed {
                    warn!(run_id = %self.run_id, error = %err, "Event delivery failed; run continues");
                } else {
                    debug!(run_id = %self.run_id, error = %err, "Event delivery failed");
                }
                false
            }
        }
    }

    /// Emits the terminal event (if none was sent yet) and closes the sink.
    pub async fn finish(&mut self, terminal: ProgressEvent) {
        debug_assert!(terminal.is_terminal());
        if !self.terminal_sent {
            self.emit(terminal).await;
        }
        self.close().await;
    }

    /// Closes the sink. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.sink.close().await;
    }

    /// Returns true once a terminal event was forwarded.
    #[must_use]
    pub fn terminal_sent(&self) -> bool {
        self.terminal_sent
    }

    /// Returns true once the sink was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of events the sink accepted.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Number of events lost to transport errors.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let fault = (!self.terminal_sent).then(|| {
            let mut event = ProgressEvent::error(
                "Internal pipeline fault",
                json!({ "message": "run ended without reporting an outcome" }),
            );
            event.run_id = Some(self.run_id);
            event.timestamp = clamp_monotonic(event.timestamp, self.last_timestamp);
            event
        });
        error!(run_id = %self.run_id, terminal_sent = self.terminal_sent, "Event stream dropped while open");

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(run_id = %self.run_id, "No runtime to close the event sink");
            return;
        };
        let sink = Arc::clone(&self.sink);
        runtime.spawn(async move {
            if let Some(event) = fault {
                let _ = sink.emit(event).await;
            }
            sink.close().await;
        });
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("run_id", &self.run_id)
            .field("terminal_sent", &self.terminal_sent)
            .field("closed", &self.closed)
            .field("delivered", &self.delivered)
            .field("dropped", &self.dropped)
            .finish()
    }
}
