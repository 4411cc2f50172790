//! Event sink trait and implementations.

use crate::core::ProgressEvent;
use crate::errors::SinkError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, Level};

/// Transport-agnostic receiver of progress events.
///
/// The orchestrator is the only writer. It calls [`emit`](EventSink::emit)
/// in order and [`close`](EventSink::close) exactly once when the run ends.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Pushes one event to the consumer.
    async fn emit(&self, event: ProgressEvent) -> Result<(), SinkError>;

    /// Ends the stream. Subsequent emits fail with [`SinkError::Closed`].
    async fn close(&self);

    /// Returns true once [`close`](EventSink::close) was called.
    fn is_closed(&self) -> bool;
}

/// A no-op event sink that discards all events.
#[derive(Debug, Default)]
pub struct NoOpEventSink {
    closed: AtomicBool,
}

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: ProgressEvent) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug)]
pub struct LoggingEventSink {
    level: Level,
    closed: AtomicBool,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self {
            level,
            closed: AtomicBool::new(false),
        }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &ProgressEvent) {
        let run_id = event.run_id.map(|id| id.to_string()).unwrap_or_default();
        if self.level == Level::DEBUG {
            debug!(
                event_type = %event.kind,
                run_id = %run_id,
                payload = ?event.payload,
                "Event: {}", event.kind
            );
        } else {
            info!(
                event_type = %event.kind,
                run_id = %run_id,
                payload = ?event.payload,
                "Event: {}", event.kind
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: ProgressEvent) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        self.log_event(&event);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A sink that forwards events into a bounded channel.
///
/// This is the bridge to streaming transports: the HTTP layer turns the
/// receiver into a server-sent event stream. Closing drops the sender, which
/// ends the receiver's stream.
#[derive(Debug)]
pub struct ChannelEventSink {
    sender: Mutex<Option<mpsc::Sender<ProgressEvent>>>,
}

impl ChannelEventSink {
    /// Creates a sink and the receiver that drains it.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: ProgressEvent) -> Result<(), SinkError> {
        // Clone out of the lock so it is not held across the await.
        let sender = self.sender.lock().clone().ok_or(SinkError::Closed)?;
        sender.send(event).await.map_err(|_| SinkError::Disconnected)
    }

    async fn close(&self) {
        self.sender.lock().take();
    }

    fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<ProgressEvent>>,
    close_calls: AtomicUsize,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Returns how many times `close` was called.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Returns the last collected event.
    #[must_use]
    pub fn last(&self) -> Option<ProgressEvent> {
        self.events.lock().last().cloned()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: ProgressEvent) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        self.events.lock().push(event);
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.close_calls() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventKind;

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpEventSink::default();
        assert!(sink.emit(ProgressEvent::status("x")).await.is_ok());
        sink.close().await;
        assert_eq!(sink.emit(ProgressEvent::status("y")).await, Err(SinkError::Closed));
    }

    #[tokio::test]
    async fn test_logging_sink() {
        let sink = LoggingEventSink::debug();
        assert!(sink.emit(ProgressEvent::status("building")).await.is_ok());
        sink.close().await;
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelEventSink::new(8);
        sink.emit(ProgressEvent::status("one")).await.unwrap();
        sink.emit(ProgressEvent::status("two")).await.unwrap();
        sink.close().await;

        assert_eq!(rx.recv().await.unwrap().message(), Some("one"));
        assert_eq!(rx.recv().await.unwrap().message(), Some("two"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_channel_sink_reports_disconnect() {
        let (sink, rx) = ChannelEventSink::new(1);
        drop(rx);
        let result = sink.emit(ProgressEvent::status("lost")).await;
        assert_eq!(result, Err(SinkError::Disconnected));
    }

    #[tokio::test]
    async fn test_channel_sink_rejects_after_close() {
        let (sink, _rx) = ChannelEventSink::new(1);
        sink.close().await;
        assert!(sink.is_closed());
        let result = sink.emit(ProgressEvent::status("late")).await;
        assert_eq!(result, Err(SinkError::Closed));
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(ProgressEvent::status("a")).await.unwrap();
        sink.emit(ProgressEvent::complete("done", serde_json::json!({}))).await.unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.last().unwrap().kind, EventKind::Complete);

        sink.close().await;
        assert_eq!(sink.close_calls(), 1);
        assert!(sink.emit(ProgressEvent::status("late")).await.is_err());
    }
}
