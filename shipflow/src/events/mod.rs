//! Event sink system for the push protocol.
//!
//! [`EventSink`] is the transport-agnostic consumer interface and
//! [`EventStream`] is the orchestrator's single-writer handle onto one.

mod sink;
mod stream;

pub use sink::{ChannelEventSink, CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
pub use stream::EventStream;
