//! Precondition failures reported as plain JSON before any stream opens.

use crate::errors::{ConfigError, ShipflowError};
use crate::utils::iso_timestamp;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// `message` was missing or blank.
    #[error("Message is required")]
    MissingMessage,

    /// The generation engine is not ready.
    #[error("Generation engine not initialized")]
    EngineNotReady {
        /// Current lifecycle state.
        state: String,
    },

    /// The configuration document does not exist.
    #[error("Config file not found")]
    ConfigNotFound,

    /// The request body was not a usable patch.
    #[error("Invalid configuration patch: {0}")]
    InvalidPatch(String),

    /// Promote was requested with no build output.
    #[error("Build not found. Please build the project first.")]
    BuildNotFound,

    /// The project directory does not exist.
    #[error("Project directory not found")]
    ProjectNotFound(PathBuf),

    /// Anything else.
    #[error("{message}: {error}")]
    Internal {
        /// What the handler was doing.
        message: &'static str,
        /// The underlying error.
        error: String,
    },
}

impl ApiError {
    /// Wraps an unexpected error.
    pub fn internal(message: &'static str, error: impl ToString) -> Self {
        Self::Internal {
            message,
            error: error.to_string(),
        }
    }

    /// Maps configuration errors; `context` describes the failed operation.
    pub fn from_config(context: &'static str, err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { .. } => Self::ConfigNotFound,
            ConfigError::InvalidPatch(reason) => Self::InvalidPatch(reason),
            other => Self::internal(context, other),
        }
    }

    /// Returns the HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingMessage | Self::InvalidPatch(_) | Self::BuildNotFound => StatusCode::BAD_REQUEST,
            Self::EngineNotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::ConfigNotFound | Self::ProjectNotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ShipflowError> for ApiError {
    fn from(err: ShipflowError) -> Self {
        match err {
            ShipflowError::ProjectNotFound(path) => Self::ProjectNotFound(path),
            ShipflowError::ArtifactsMissing(_) => Self::BuildNotFound,
            ShipflowError::Config(err) => Self::from_config("Configuration error", err),
            other => Self::internal("Internal error", other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let timestamp = iso_timestamp();
        let body = match &self {
            Self::MissingMessage | Self::BuildNotFound => json!({
                "error": self.to_string(),
                "status": "error",
                "timestamp": timestamp,
            }),
            Self::EngineNotReady { state } => json!({
                "error": self.to_string(),
                "state": state,
                "status": "error",
                "timestamp": timestamp,
            }),
            Self::ConfigNotFound | Self::InvalidPatch(_) => json!({
                "message": self.to_string(),
                "status": "error",
                "timestamp": timestamp,
            }),
            Self::ProjectNotFound(path) => json!({
                "message": self.to_string(),
                "status": "error",
                "path": path.display().to_string(),
                "timestamp": timestamp,
            }),
            Self::Internal { message, error } => json!({
                "message": message,
                "status": "error",
                "error": error,
                "timestamp": timestamp,
            }),
        };
        (status, Json(body)).into_response()
    }
}
