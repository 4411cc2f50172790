//! Stage identifiers and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The stages a release pipeline can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Code generation from a natural-language instruction.
    Generation,
    /// Project build.
    Build,
    /// Stage, commit and push.
    VersionControl,
    /// Mirror sync of the build output to an artifact bucket.
    Publish,
}

impl StageId {
    /// Returns the pipeline state entered while this stage runs.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        match self {
            Self::Generation => PipelineState::Generating,
            Self::Build => PipelineState::Building,
            Self::VersionControl => PipelineState::Committing,
            Self::Publish => PipelineState::Publishing,
        }
    }

    /// Returns a human-readable label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Generation => "Generation",
            Self::Build => "Build",
            Self::VersionControl => "Version control",
            Self::Publish => "Publish",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generation => write!(f, "generation"),
            Self::Build => write!(f, "build"),
            Self::VersionControl => write!(f, "version_control"),
            Self::Publish => write!(f, "publish"),
        }
    }
}

/// Coarse status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, no stage started yet.
    #[default]
    Pending,
    /// A stage is executing.
    Running,
    /// Every stage succeeded.
    Succeeded,
    /// A stage failed or the run was cancelled.
    Failed,
}

impl RunStatus {
    /// Returns true if no further transition is allowed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Fine-grained state of a run, one per executing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Not started.
    Pending,
    /// Generation stage running.
    Generating,
    /// Build stage running.
    Building,
    /// Version control stage running.
    Committing,
    /// Publish stage running.
    Publishing,
    /// Finished successfully.
    Succeeded,
    /// Finished with a failure.
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Building => "building",
            Self::Committing => "committing",
            Self::Publishing => "publishing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}
