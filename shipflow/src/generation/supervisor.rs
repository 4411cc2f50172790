//! Engine lifecycle: one writer initializes, many readers check readiness.

use super::engine::GenerationEngine;
use crate::errors::GenerationError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Lifecycle state of the generation engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum EngineState {
    /// Initialization has not started.
    #[default]
    Uninitialized,
    /// The engine is being probed.
    Initializing,
    /// The engine accepted the probe.
    Ready,
    /// The probe failed.
    Failed(String),
}

impl EngineState {
    /// Returns true if generation requests may be served.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initializing => write!(f, "initializing"),
            Self::Ready => write!(f, "ready"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Snapshot of the lifecycle for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Current lifecycle state.
    #[serde(flatten)]
    pub state: EngineState,
    /// True once the engine is ready.
    pub is_initialized: bool,
    /// True while the probe runs.
    pub is_initializing: bool,
    /// Engine version reported by the probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Reason for the most recent failure.
    #[serde(default)]
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Lifecycle {
    state: EngineState,
    version: Option<String>,
    last_error: Option<String>,
}

/// Owns the engine and its lifecycle.
pub struct EngineSupervisor {
    engine: Arc<dyn GenerationEngine>,
    lifecycle: RwLock<Lifecycle>,
}

impl EngineSupervisor {
    /// Creates a supervisor in the `Uninitialized` state.
    #[must_use]
    pub fn new(engine: Arc<dyn GenerationEngine>) -> Self {
        Self {
            engine,
            lifecycle: RwLock::new(Lifecycle::default()),
        }
    }

    /// Probes the engine and moves to `Ready` or `Failed`.
    ///
    /// Concurrent or repeated calls while `Initializing` or `Ready` are no-ops.
    /// A `Failed` engine may be initialized again.
    pub async fn initialize(&self) -> Result<(), GenerationError> {
        {
            let mut lifecycle = self.lifecycle.write();
            match lifecycle.state {
                EngineState::Initializing => {
                    info!("Generation engine initialization already in progress");
                    return Ok(());
                }
                EngineState::Ready => return Ok(()),
                EngineState::Uninitialized | EngineState::Failed(_) => {
                    lifecycle.state = EngineState::Initializing;
                    lifecycle.last_error = None;
                }
            }
        }

        info!("Initializing generation engine");
        match self.engine.probe().await {
            Ok(version) => {
                info!(version = %version, "Generation engine ready");
                let mut lifecycle = self.lifecycle.write();
                lifecycle.state = EngineState::Ready;
                lifecycle.version = Some(version);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "Generation engine initialization failed");
                let mut lifecycle = self.lifecycle.write();
                lifecycle.state = EngineState::Failed(err.to_string());
                lifecycle.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.lifecycle.read().state.clone()
    }

    /// Returns true if the engine is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.lifecycle.read().state.is_ready()
    }

    /// Returns a status snapshot.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let lifecycle = self.lifecycle.read();
        EngineStatus {
            state: lifecycle.state.clone(),
            is_initialized: lifecycle.state.is_ready(),
            is_initializing: lifecycle.state == EngineState::Initializing,
            version: lifecycle.version.clone(),
            last_error: lifecycle.last_error.clone(),
        }
    }

    /// Returns the engine if it is ready.
    pub fn ready_engine(&self) -> Result<Arc<dyn GenerationEngine>, GenerationError> {
        let state = self.state();
        if state.is_ready() {
            Ok(Arc::clone(&self.engine))
        } else {
            Err(GenerationError::NotReady {
                state: state.to_string(),
            })
        }
    }
}

impl fmt::Debug for EngineSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSupervisor")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::MockGenerationEngine;
    use serde_json::json;

    fn supervisor_with_probe(result: Result<String, GenerationError>) -> EngineSupervisor {
        let mut engine = MockGenerationEngine::new();
        engine.expect_probe().times(1).return_once(move || result);
        EngineSupervisor::new(Arc::new(engine))
    }

    #[tokio::test]
    async fn test_starts_uninitialized() {
        let supervisor = EngineSupervisor::new(Arc::new(MockGenerationEngine::new()));
        assert_eq!(supervisor.state(), EngineState::Uninitialized);
        assert!(matches!(
            supervisor.ready_engine(),
            Err(GenerationError::NotReady { .. })
        ));
    }

    #[tokio::test]
    async fn test_successful_probe_is_ready() {
        let supervisor = supervisor_with_probe(Ok("1.0.3".to_string()));
        supervisor.initialize().await.unwrap();

        assert!(supervisor.is_ready());
        assert!(supervisor.ready_engine().is_ok());
        let status = supervisor.status();
        assert!(status.is_initialized);
        assert_eq!(status.version.as_deref(), Some("1.0.3"));
    }

    #[tokio::test]
    async fn test_repeated_initialize_probes_once() {
        let supervisor = supervisor_with_probe(Ok("1.0.3".to_string()));
        supervisor.initialize().await.unwrap();
        supervisor.initialize().await.unwrap();
        assert!(supervisor.is_ready());
    }

    #[tokio::test]
    async fn test_failed_probe_records_reason() {
        let supervisor = supervisor_with_probe(Err(GenerationError::Start("not installed".to_string())));
        assert!(supervisor.initialize().await.is_err());

        let status = supervisor.status();
        assert!(!status.is_initialized);
        assert!(!status.is_initializing);
        assert!(status.last_error.unwrap().contains("not installed"));

        let err = supervisor.ready_engine().unwrap_err();
        assert!(err.to_string().contains("failed"));
    }

    #[test]
    fn test_status_serialization() {
        let status = EngineStatus {
            state: EngineState::Failed("boom".to_string()),
            is_initialized: false,
            is_initializing: false,
            version: None,
            last_error: Some("boom".to_string()),
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["state"], json!("failed"));
        assert_eq!(value["reason"], json!("boom"));
        assert_eq!(value["last_error"], json!("boom"));
    }
}
