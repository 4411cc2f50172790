//! # Shipflow
//!
//! A release pipeline service for a single web project.
//!
//! Shipflow turns three kinds of request into ordered stage runs and streams
//! their progress to the caller:
//!
//! - **Instructions**: an external generation engine edits the project, then
//!   it is built, committed, and published to the development bucket
//! - **Configuration patches**: a partial JSON document is deep-merged into the
//!   project configuration, then built, committed, and published
//! - **Promotion**: the existing build output is published to production
//!
//! Every run emits exactly one terminal event (`complete` or `error`), last.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shipflow::prelude::*;
//!
//! let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
//! let orchestrator = PipelineOrchestrator::new()
//!     .with_stage(Arc::new(BuildStage::new(runner.clone())))
//!     .with_stage(Arc::new(VersionControlStage::new(runner.clone())))
//!     .with_stage(Arc::new(PublishStage::new(runner)));
//!
//! let store = ConfigStore::new("./project/manifest.config.json");
//! let patch = serde_json::json!({"theme": {"color": "red"}});
//! let report = orchestrator
//!     .run(RunRequest::config_patch("./project", store, patch), Arc::new(LoggingEventSink::default()))
//!     .await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod generation;
pub mod observability;
pub mod pipeline;
pub mod project;
pub mod runner;
pub mod stages;
pub mod testing;
pub mod utils;

#[cfg(feature = "server")]
pub mod server;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{deep_merge, ConfigStore, ServiceConfig};
    pub use crate::core::{
        ErrorDetail, EventKind, OutcomeStatus, PipelineState, ProgressEvent, RunStatus, StageId,
        StageOutcome,
    };
    pub use crate::errors::{CommandError, ConfigError, GenerationError, ShipflowError};
    pub use crate::events::{
        ChannelEventSink, CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::generation::{
        EngineSupervisor, GenerationEngine, GenerationRequest, ProcessGenerationEngine,
    };
    pub use crate::pipeline::{PipelineOrchestrator, RunKind, RunReport, RunRequest};
    pub use crate::runner::{CommandRunner, CommandSpec, ProcessRunner};
    pub use crate::stages::{
        BuildStage, GenerationStage, PublishStage, Stage, StageContext, VersionControlStage,
    };
    pub use crate::utils::{iso_timestamp, Timestamp};
    pub use std::sync::Arc;
}
