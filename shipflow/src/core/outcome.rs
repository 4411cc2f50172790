//! The result every stage returns.

use super::StageId;
use crate::errors::CommandError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Status reported alongside a stage outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The stage did its work.
    Success,
    /// The stage found nothing to do. Counts as success.
    NoChanges,
    /// The stage failed.
    Error,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::NoChanges => write!(f, "no_changes"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Diagnostic detail attached to a failed outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// What went wrong.
    pub message: String,

    /// The command line that failed, when an external command was involved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// The command's exit code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Captured error text from the command or engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ErrorDetail {
    /// Creates a detail with only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            command: None,
            exit_code: None,
            output: None,
        }
    }

    /// Builds a detail from a failed command.
    #[must_use]
    pub fn from_command_error(err: &CommandError) -> Self {
        let output = err.output_text();
        Self {
            message: err.to_string(),
            command: Some(err.command().to_string()),
            exit_code: err.exit_code(),
            output: (!output.is_empty()).then_some(output),
        }
    }

    /// Converts the detail to a JSON value for event payloads.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::String(self.message.clone()))
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The outcome of executing one stage.
///
/// Stages never return `Err`; every failure is folded into an outcome with
/// `success == false` and an [`ErrorDetail`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// The stage that produced this outcome.
    pub stage: StageId,

    /// Whether the run may proceed to the next stage.
    pub success: bool,

    /// Finer status; `no_changes` is a successful no-op.
    pub status: OutcomeStatus,

    /// Short human-readable summary.
    pub summary: String,

    /// Captured command output or engine transcript.
    #[serde(default)]
    pub output: String,

    /// Present iff `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,

    /// Stage-specific facts (destination, digest, turn count).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl StageOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn succeeded(stage: StageId, summary: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            stage,
            success: true,
            status: OutcomeStatus::Success,
            summary: summary.into(),
            output: output.into(),
            error_detail: None,
            metadata: Map::new(),
        }
    }

    /// Creates a successful no-op outcome.
    #[must_use]
    pub fn no_changes(stage: StageId, summary: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::NoChanges,
            ..Self::succeeded(stage, summary, output)
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(stage: StageId, summary: impl Into<String>, detail: ErrorDetail) -> Self {
        Self {
            stage,
            success: false,
            status: OutcomeStatus::Error,
            summary: summary.into(),
            output: String::new(),
            error_detail: Some(detail),
            metadata: Map::new(),
        }
    }

    /// Creates a failed outcome from a command error.
    #[must_use]
    pub fn command_failed(stage: StageId, summary: impl Into<String>, err: &CommandError) -> Self {
        let mut outcome = Self::failed(stage, summary, ErrorDetail::from_command_error(err));
        outcome.output = err.output_text();
        outcome
    }

    /// Replaces the captured output.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns a metadata entry.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Summarizes the outcome for a `complete` event, without the full output.
    #[must_use]
    pub fn summary_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("status".to_string(), Value::String(self.status.to_string()));
        map.insert("message".to_string(), Value::String(self.summary.clone()));
        if !self.metadata.is_empty() {
            map.insert("metadata".to_string(), Value::Object(self.metadata.clone()));
        }
        Value::Object(map)
    }
}
