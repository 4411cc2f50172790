//! Shared state behind every handler.

use crate::cancellation::CancellationToken;
use crate::config::{ConfigStore, ServiceConfig};
use crate::errors::ConfigError;
use crate::generation::{EngineSupervisor, GenerationEngine};
use crate::pipeline::PipelineOrchestrator;
use crate::runner::CommandRunner;
use crate::stages::{BuildStage, GenerationStage, PublishStage, VersionControlStage};
use std::sync::Arc;

/// Application state shared across requests.
#[derive(Debug)]
pub struct AppState {
    /// Service settings.
    pub config: ServiceConfig,
    /// The project configuration document.
    pub store: ConfigStore,
    /// Generation engine lifecycle.
    pub supervisor: Arc<EngineSupervisor>,
    /// Runs stage sequences.
    pub orchestrator: Arc<PipelineOrchestrator>,
    /// Parent of every run's cancellation token.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wires the four stages from `config`.
    pub fn new(
        config: ServiceConfig,
        runner: Arc<dyn CommandRunner>,
        engine: Arc<dyn GenerationEngine>,
    ) -> Result<Self, ConfigError> {
        let supervisor = Arc::new(EngineSupervisor::new(engine));

        let orchestrator = PipelineOrchestrator::new()
            .with_progress_buffer(config.event_buffer)
            .with_stage(Arc::new(
                GenerationStage::new(Arc::clone(&supervisor)).with_max_turns(config.engine_max_turns),
            ))
            .with_stage(Arc::new(
                BuildStage::new(Arc::clone(&runner)).with_command(config.build_command_spec()?),
            ))
            .with_stage(Arc::new(
                VersionControlStage::new(Arc::clone(&runner))
                    .with_identity(config.bot_identity())
                    .with_remote(config.git_remote.clone()),
            ))
            .with_stage(Arc::new(
                PublishStage::new(runner)
                    .with_targets(config.publish_targets())
                    .with_output_dir(config.build_output_dir.clone()),
            ));

        Ok(Self {
            store: ConfigStore::new(config.config_path()),
            config,
            supervisor,
            orchestrator: Arc::new(orchestrator),
            shutdown: CancellationToken::new(),
        })
    }
}
