//! Core domain model types for shipflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage identifiers and run status enums
//! - Stage outcomes with error details
//! - Progress events for the push protocol

mod event;
mod outcome;
mod status;

pub use event::{EventKind, ProgressEvent};
pub use outcome::{ErrorDetail, OutcomeStatus, StageOutcome};
pub use status::{PipelineState, RunStatus, StageId};
