//! Code-generation engine integration.
//!
//! The engine is an opaque collaborator that yields structured JSON
//! messages. [`GenerationEngine`] is the seam, [`ProcessGenerationEngine`]
//! drives a command-line agent, and [`EngineSupervisor`] tracks whether the
//! engine is usable.

mod engine;
mod process;
mod supervisor;

pub use engine::{
    is_completion, is_turn, GenerationEngine, GenerationRequest, MessageStream, DEFAULT_MAX_TURNS,
    MESSAGE_BUFFER,
};
#[cfg(test)]
pub use engine::MockGenerationEngine;
pub use process::{ProcessGenerationEngine, DEFAULT_ENGINE_COMMAND};
pub use supervisor::{EngineState, EngineStatus, EngineSupervisor};
