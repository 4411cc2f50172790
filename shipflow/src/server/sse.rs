//! Streams a run to the client as server-sent events.

use super::state::AppState;
use crate::events::ChannelEventSink;
use crate::pipeline::RunRequest;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, Instrument};

/// Starts `request` in the background and returns its event stream.
///
/// The run is owned by its task; a client that disconnects stops receiving
/// events but does not stop the run.
pub fn stream_run(
    state: &AppState,
    request: RunRequest,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (sink, rx) = ChannelEventSink::new(state.config.event_buffer);
    let orchestrator = Arc::clone(&state.orchestrator);
    let cancel = state.shutdown.child();
    let span = tracing::info_span!("run", kind = %request.kind);

    tokio::spawn(
        async move {
            let report = orchestrator
                .run_with_cancellation(request, Arc::new(sink), cancel)
                .await;
            debug!(run_id = %report.run_id, status = %report.status, "Streamed run ended");
        }
        .instrument(span),
    );

    let events = ReceiverStream::new(rx).map(|event| Ok(Event::default().data(event.to_json())));
    Sse::new(events).keep_alive(KeepAlive::default())
}
