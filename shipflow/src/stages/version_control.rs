//! Stage, commit and push.

use super::{Stage, StageContext};
use crate::core::{StageId, StageOutcome};
use crate::errors::CommandError;
use crate::runner::{CommandRunner, CommandSpec};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

/// Commit message used when the run supplies none.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Update from shipflow";

/// Matches git's output for an empty commit.
static NOTHING_TO_COMMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)nothing to commit|no changes added to commit").expect("nothing-to-commit regex is valid")
});

/// Author identity configured when the repository has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    /// `user.name`.
    pub name: String,
    /// `user.email`.
    pub email: String,
}

impl Default for BotIdentity {
    fn default() -> Self {
        Self {
            name: "Shipflow Bot".to_string(),
            email: "shipflow@example.com".to_string(),
        }
    }
}

/// Records the working tree in version control and pushes it.
///
/// An empty commit is a successful no-op with status `no_changes`.
#[derive(Debug, Clone)]
pub struct VersionControlStage {
    runner: Arc<dyn CommandRunner>,
    identity: BotIdentity,
    remote: Option<String>,
}

impl VersionControlStage {
    /// Creates the stage with the default bot identity, pushing to the default remote.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            identity: BotIdentity::default(),
            remote: None,
        }
    }

    /// Sets the bot identity.
    #[must_use]
    pub fn with_identity(mut self, identity: BotIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Pushes to a named remote instead of the default.
    #[must_use]
    pub fn with_remote(mut self, remote: Option<String>) -> Self {
        self.remote = remote.filter(|r| !r.trim().is_empty());
        self
    }

    async fn git(&self, args: &[&str], cwd: &Path) -> Result<String, CommandError> {
        let spec = CommandSpec::new("git").args(args.iter().copied());
        self.runner.run(&spec, cwd).await.map(|out| out.combined())
    }

    async fn ensure_identity(&self, cwd: &Path) -> Result<(), CommandError> {
        if self.git(&["config", "user.name"], cwd).await.is_ok() {
            return Ok(());
        }
        debug!(name = %self.identity.name, "Configuring bot identity");
        self.git(&["config", "user.name", self.identity.name.as_str()], cwd).await?;
        self.git(&["config", "user.email", self.identity.email.as_str()], cwd).await?;
        Ok(())
    }

    async fn commit_and_push(&self, message: &str, cwd: &Path) -> Result<Vec<String>, CommandError> {
        self.ensure_identity(cwd).await?;

        let mut log = Vec::new();
        log.push(self.git(&["add", "."], cwd).await?);
        log.push(self.git(&["commit", "-m", message], cwd).await?);
        let push = match &self.remote {
            Some(remote) => self.git(&["push", remote.as_str()], cwd).await?,
            None => self.git(&["push"], cwd).await?,
        };
        log.push(push);
        Ok(log)
    }
}

/// Returns true if a failed git step only reported an empty commit.
#[must_use]
pub fn is_nothing_to_commit(err: &CommandError) -> bool {
    NOTHING_TO_COMMIT.is_match(&err.output_text())
}

#[async_trait]
impl Stage for VersionControlStage {
    fn id(&self) -> StageId {
        StageId::VersionControl
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        let message = ctx.commit_message().unwrap_or(DEFAULT_COMMIT_MESSAGE);

        match self.commit_and_push(message, ctx.working_dir()).await {
            Ok(log) => {
                info!(run_id = %ctx.run_id(), "Committed and pushed changes");
                let output = log
                    .into_iter()
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                StageOutcome::succeeded(
                    StageId::VersionControl,
                    "Successfully committed and pushed changes",
                    output,
                )
            }
            Err(err) if is_nothing_to_commit(&err) => {
                info!(run_id = %ctx.run_id(), "Nothing to commit");
                StageOutcome::no_changes(
                    StageId::VersionControl,
                    "No changes to commit - working directory is clean",
                    err.output_text(),
                )
                .with_metadata(
                    "details",
                    Value::String("There are no modified files to commit and push".to_string()),
                )
            }
            Err(err) => {
                warn!(run_id = %ctx.run_id(), error = %err, "Version control step failed");
                StageOutcome::command_failed(
                    StageId::VersionControl,
                    "Failed to commit and push changes",
                    &err,
                )
            }
        }
    }
}
