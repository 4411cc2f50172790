//! Testing utilities for shipflow runs.
//!
//! This module provides:
//! - A scripted command runner and generation engine
//! - Assertions over recorded event streams

mod assertions;
mod mocks;

pub use assertions::{
    assert_event_kinds, assert_single_terminal_last, assert_timestamps_monotonic, status_messages,
};
pub use mocks::{ScriptedEngine, ScriptedResponse, ScriptedRunner};
