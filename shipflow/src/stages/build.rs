//! Project build stage.

use super::{Stage, StageContext};
use crate::core::{ErrorDetail, StageId, StageOutcome};
use crate::runner::{CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Default build command line.
pub const DEFAULT_BUILD_COMMAND: &str = "npm run build";

/// Runs the project's build command in the working directory.
///
/// A non-zero exit is a hard failure. Partial artifacts are left in place.
#[derive(Debug, Clone)]
pub struct BuildStage {
    runner: Arc<dyn CommandRunner>,
    command: CommandSpec,
}

impl BuildStage {
    /// Creates a build stage running `npm run build`.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            command: CommandSpec::new("npm").args(["run", "build"]),
        }
    }

    /// Replaces the build command.
    #[must_use]
    pub fn with_command(mut self, command: CommandSpec) -> Self {
        self.command = command;
        self
    }

    /// Returns the build command.
    #[must_use]
    pub fn command(&self) -> &CommandSpec {
        &self.command
    }
}

#[async_trait]
impl Stage for BuildStage {
    fn id(&self) -> StageId {
        StageId::Build
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        let working_dir = ctx.working_dir();
        if !working_dir.is_dir() {
            return StageOutcome::failed(
                StageId::Build,
                "Build failed",
                ErrorDetail::new(format!("Project directory not found: {}", working_dir.display())),
            );
        }

        match self.runner.run(&self.command, working_dir).await {
            Ok(output) => {
                info!(run_id = %ctx.run_id(), command = %self.command, "Build succeeded");
                StageOutcome::succeeded(StageId::Build, "Build complete", output.combined())
            }
            Err(err) => {
                warn!(run_id = %ctx.run_id(), error = %err, "Build failed");
                StageOutcome::command_failed(StageId::Build, "Build failed", &err)
            }
        }
    }
}
