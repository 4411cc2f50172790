//! Run orchestration.
//!
//! This module provides:
//! - Run kinds and the per-run state machine
//! - Per-directory workspace locks
//! - The orchestrator that sequences stages and drives the event stream

mod locks;
mod orchestrator;
mod run;

pub use locks::{WorkspaceGuard, WorkspaceLocks};
pub use orchestrator::{PipelineOrchestrator, RunReport, DEFAULT_PROGRESS_BUFFER};
pub use run::{PendingPatch, PipelineRun, RunKind, RunRequest, CONFIG_COMMIT_MESSAGE};

#[cfg(test)]
mod integration_tests;
