//! Assertions over recorded event streams.

use crate::core::{EventKind, ProgressEvent};

/// Asserts that exactly one terminal event was recorded and that it is last.
pub fn assert_single_terminal_last(events: &[ProgressEvent]) {
    let terminals: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_terminal())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(
        terminals.len(),
        1,
        "Expected exactly one terminal event, found {}: {:?}",
        terminals.len(),
        kinds(events)
    );
    assert_eq!(
        terminals[0],
        events.len() - 1,
        "Terminal event is not last: {:?}",
        kinds(events)
    );
}

/// Asserts the exact sequence of event kinds.
pub fn assert_event_kinds(events: &[ProgressEvent], expected: &[EventKind]) {
    assert_eq!(kinds(events), expected, "Unexpected event sequence");
}

/// Asserts that timestamps never decrease.
pub fn assert_timestamps_monotonic(events: &[ProgressEvent]) {
    for pair in events.windows(2) {
        assert!(
            pair[0].timestamp <= pair[1].timestamp,
            "Timestamp went backwards: {} then {}",
            pair[0].timestamp,
            pair[1].timestamp
        );
    }
}

/// Returns the `message` fields of status events, in order.
#[must_use]
pub fn status_messages(events: &[ProgressEvent]) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.kind == EventKind::Status)
        .filter_map(|e| e.message().map(String::from))
        .collect()
}

fn kinds(events: &[ProgressEvent]) -> Vec<EventKind> {
    events.iter().map(|e| e.kind).collect()
}
