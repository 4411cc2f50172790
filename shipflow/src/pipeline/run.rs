//! Run kinds, run requests and the per-run state machine.

use crate::config::ConfigStore;
use crate::core::{PipelineState, RunStatus, StageId};
use crate::stages::Destination;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Commit message for configuration-triggered runs.
pub const CONFIG_COMMIT_MESSAGE: &str = "Update configuration via API";

/// What triggered a run. Determines the stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Generate, build, commit, publish to development.
    Instruction,
    /// Build, commit, publish to development after a config merge.
    ConfigPatch,
    /// Publish the existing build to production.
    Promote,
    /// Commit and push only.
    CommitOnly,
}

impl RunKind {
    /// Returns the ordered stages for this kind.
    #[must_use]
    pub fn stages(&self) -> &'static [StageId] {
        match self {
            Self::Instruction => &[
                StageId::Generation,
                StageId::Build,
                StageId::VersionControl,
                StageId::Publish,
            ],
            Self::ConfigPatch => &[StageId::Build, StageId::VersionControl, StageId::Publish],
            Self::Promote => &[StageId::Publish],
            Self::CommitOnly => &[StageId::VersionControl],
        }
    }

    /// Returns where the publish stage sends artifacts.
    #[must_use]
    pub fn destination(&self) -> Destination {
        match self {
            Self::Promote => Destination::Production,
            _ => Destination::Development,
        }
    }

    /// Returns the first status message of a run.
    #[must_use]
    pub fn opening_message(&self) -> &'static str {
        match self {
            Self::Instruction => "Starting generation...",
            Self::ConfigPatch => "Configuration saved. Starting build process...",
            Self::Promote => "Starting deployment to production...",
            Self::CommitOnly => "Committing project changes...",
        }
    }

    /// Returns the message of the `complete` event.
    #[must_use]
    pub fn completion_message(&self) -> &'static str {
        match self {
            Self::Instruction | Self::ConfigPatch => "Build and deployment completed successfully",
            Self::Promote => "Deployment to production completed successfully",
            Self::CommitOnly => "Commit completed successfully",
        }
    }

    /// Returns the `error` event text for a failure in `stage`.
    #[must_use]
    pub fn failure_message(&self, stage: StageId) -> String {
        format!("{} failed", stage.label())
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instruction => write!(f, "instruction"),
            Self::ConfigPatch => write!(f, "config_patch"),
            Self::Promote => write!(f, "promote"),
            Self::CommitOnly => write!(f, "commit_only"),
        }
    }
}

/// A configuration patch waiting for the run to own its workspace.
#[derive(Debug, Clone)]
pub struct PendingPatch {
    /// The document the patch merges into.
    pub store: ConfigStore,
    /// A JSON object merged over the stored document.
    pub patch: Value,
}

/// Everything the orchestrator needs to start a run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// The run kind.
    pub kind: RunKind,
    /// The project directory.
    pub working_dir: PathBuf,
    /// Natural-language instruction for generation.
    pub instruction: Option<String>,
    /// Commit message; stage default applies when absent.
    pub commit_message: Option<String>,
    /// Applied under the workspace lock, then announced before the first stage.
    pub config_patch: Option<PendingPatch>,
}

impl RunRequest {
    /// Creates an instruction run. The instruction doubles as the commit message.
    #[must_use]
    pub fn instruction(working_dir: impl Into<PathBuf>, instruction: impl Into<String>) -> Self {
        let instruction = instruction.into();
        Self {
            kind: RunKind::Instruction,
            working_dir: working_dir.into(),
            commit_message: Some(instruction.clone()),
            instruction: Some(instruction),
            config_patch: None,
        }
    }

    /// Creates a run that merges `patch` into `store` and then rebuilds.
    #[must_use]
    pub fn config_patch(working_dir: impl Into<PathBuf>, store: ConfigStore, patch: Value) -> Self {
        Self {
            kind: RunKind::ConfigPatch,
            working_dir: working_dir.into(),
            instruction: None,
            commit_message: Some(CONFIG_COMMIT_MESSAGE.to_string()),
            config_patch: Some(PendingPatch { store, patch }),
        }
    }

    /// Creates a promote-to-production run.
    #[must_use]
    pub fn promote(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            kind: RunKind::Promote,
            working_dir: working_dir.into(),
            instruction: None,
            commit_message: None,
            config_patch: None,
        }
    }

    /// Creates a commit-only run.
    #[must_use]
    pub fn commit_only(working_dir: impl Into<PathBuf>, commit_message: Option<String>) -> Self {
        Self {
            kind: RunKind::CommitOnly,
            working_dir: working_dir.into(),
            instruction: None,
            commit_message,
            config_patch: None,
        }
    }
}

/// Mutable state of one run. Only the orchestrator writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineRun {
    id: Uuid,
    kind: RunKind,
    status: RunStatus,
    state: PipelineState,
    completed: Vec<StageId>,
}

impl PipelineRun {
    /// Creates a pending run with a fresh id.
    #[must_use]
    pub fn new(kind: RunKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: RunStatus::Pending,
            state: PipelineState::Pending,
            completed: Vec::new(),
        }
    }

    /// Returns the run id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the run kind.
    #[must_use]
    pub fn kind(&self) -> RunKind {
        self.kind
    }

    /// Returns the coarse status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Returns the fine-grained state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Returns the stages that finished successfully, in order.
    #[must_use]
    pub fn completed(&self) -> &[StageId] {
        &self.completed
    }

    /// Enters `stage`. Returns false once the run is terminal.
    pub fn enter(&mut self, stage: StageId) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = RunStatus::Running;
        self.state = stage.state();
        true
    }

    /// Records that `stage` succeeded.
    pub fn stage_succeeded(&mut self, stage: StageId) {
        if !self.status.is_terminal() {
            self.completed.push(stage);
        }
    }

    /// Marks the run succeeded. Returns false if it was already terminal.
    pub fn succeed(&mut self) -> bool {
        self.finish(RunStatus::Succeeded, PipelineState::Succeeded)
    }

    /// Marks the run failed. Returns false if it was already terminal.
    pub fn fail(&mut self) -> bool {
        self.finish(RunStatus::Failed, PipelineState::Failed)
    }

    fn finish(&mut self, status: RunStatus, state: PipelineState) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.state = state;
        true
    }
}
