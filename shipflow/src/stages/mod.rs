//! Stage trait and the release pipeline stages.
//!
//! Stages are the units of work the orchestrator sequences. Every stage
//! folds its failures into a [`StageOutcome`]; none of them returns `Err`.

mod build;
mod context;
mod generation;
mod publish;
mod version_control;

pub use build::{BuildStage, DEFAULT_BUILD_COMMAND};
pub use context::{ProgressSender, StageContext};
pub use generation::GenerationStage;
pub use publish::{artifact_digest, Destination, PublishStage, PublishTargets, DEFAULT_OUTPUT_DIR};
pub use version_control::{BotIdentity, VersionControlStage, DEFAULT_COMMIT_MESSAGE};

use crate::core::{StageId, StageOutcome};
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns which stage this is.
    fn id(&self) -> StageId;

    /// Executes the stage.
    ///
    /// Implementations must not panic; if one does, the orchestrator turns
    /// the panic into a fatal run error.
    async fn execute(&self, ctx: &StageContext) -> StageOutcome;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageContext) -> StageOutcome + Send + Sync,
{
    id: StageId,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext) -> StageOutcome + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(id: StageId, func: F) -> Self {
        Self { id, func }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext) -> StageOutcome + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("id", &self.id).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageContext) -> StageOutcome + Send + Sync,
{
    fn id(&self) -> StageId {
        self.id
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        (self.func)(ctx)
    }
}
