//! Progress events pushed to the caller during a pipeline run.

use super::StageId;
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// The kind of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Free-text progress marker.
    Status,
    /// A message forwarded verbatim from the generation engine.
    GenerationMessage,
    /// Terminal success.
    Complete,
    /// Terminal failure.
    Error,
    /// The merged configuration document, sent before a config-triggered build.
    ConfigUpdated,
}

impl EventKind {
    /// Returns true for `complete` and `error`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => write!(f, "status"),
            Self::GenerationMessage => write!(f, "generation_message"),
            Self::Complete => write!(f, "complete"),
            Self::Error => write!(f, "error"),
            Self::ConfigUpdated => write!(f, "config_updated"),
        }
    }
}

/// A single unit of the push protocol.
///
/// Serializes flat: `{"type": ..., <payload fields>, "run_id": ..., "timestamp": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Kind-specific payload fields.
    #[serde(flatten)]
    pub payload: Map<String, Value>,

    /// The run that emitted this event. Stamped by the event stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,

    /// When the event was emitted.
    pub timestamp: Timestamp,
}

impl ProgressEvent {
    /// Creates an event with an empty payload.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            payload: Map::new(),
            run_id: None,
            timestamp: crate::utils::now_utc(),
        }
    }

    /// Adds a payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Sets the run identifier.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Returns a payload field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Returns the `message` payload field as a string, if present.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.get("message").and_then(Value::as_str)
    }

    /// Returns the stage this event is attributed to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<StageId> {
        self.get("stage")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Returns true for `complete` and `error` events.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Encodes the event as a single JSON line.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","error":"event encoding failed","details":"{e}"}}"#)
        })
    }

    /// Creates a "status" event.
    #[must_use]
    pub fn status(message: impl Into<String>) -> Self {
        Self::new(EventKind::Status).with_field("message", Value::String(message.into()))
    }

    /// Creates a "status" event attributed to a stage.
    #[must_use]
    pub fn stage_status(stage: StageId, message: impl Into<String>) -> Self {
        Self::status(message).with_field("stage", Value::String(stage.to_string()))
    }

    /// Creates a "generation_message" event wrapping an engine message.
    #[must_use]
    pub fn generation_message(message: Value) -> Self {
        Self::new(EventKind::GenerationMessage).with_field("message", message)
    }

    /// Creates a "complete" event.
    #[must_use]
    pub fn complete(message: impl Into<String>, details: Value) -> Self {
        Self::new(EventKind::Complete)
            .with_field("message", Value::String(message.into()))
            .with_field("status", Value::String("success".to_string()))
            .with_field("details", details)
    }

    /// Creates an "error" event.
    #[must_use]
    pub fn error(error: impl Into<String>, details: Value) -> Self {
        Self::new(EventKind::Error)
            .with_field("error", Value::String(error.into()))
            .with_field("details", details)
    }

    /// Creates a "config_updated" event carrying the full merged document.
    #[must_use]
    pub fn config_updated(config: Value) -> Self {
        Self::new(EventKind::ConfigUpdated).with_field("config", config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_event_shape() {
        let event = ProgressEvent::status("Starting build process...");
        let value: Value = serde_json::from_str(&event.to_json()).unwrap();

        assert_eq!(value["type"], "status");
        assert_eq!(value["message"], "Starting build process...");
        assert!(value.get("timestamp").is_some());
        assert!(value.get("run_id").is_none());
    }

    #[test]
    fn test_payload_is_flattened() {
        let run_id = Uuid::new_v4();
        let event = ProgressEvent::error("Build failed", json!({"command": "npm run build"}))
            .with_run_id(run_id);
        let value: Value = serde_json::from_str(&event.to_json()).unwrap();

        assert_eq!(value["type"], "error");
        assert_eq!(value["error"], "Build failed");
        assert_eq!(value["details"]["command"], "npm run build");
        assert_eq!(value["run_id"], run_id.to_string());
    }

    #[test]
    fn test_event_roundtrip_keeps_payload() {
        let event = ProgressEvent::config_updated(json!({"theme": {"color": "blue"}}));
        let decoded: ProgressEvent = serde_json::from_str(&event.to_json()).unwrap();

        assert_eq!(decoded.kind, EventKind::ConfigUpdated);
        assert_eq!(decoded.get("config"), Some(&json!({"theme": {"color": "blue"}})));
        assert_eq!(decoded.timestamp, event.timestamp);
    }

    #[test]
    fn test_stage_status_carries_stage() {
        let event = ProgressEvent::stage_status(StageId::Build, "Starting build process...");
        assert_eq!(event.stage(), Some(StageId::Build));
        assert_eq!(event.message(), Some("Starting build process..."));
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(EventKind::Complete.is_terminal());
        assert!(EventKind::Error.is_terminal());
        assert!(!EventKind::Status.is_terminal());
        assert!(!EventKind::GenerationMessage.is_terminal());
        assert!(!EventKind::ConfigUpdated.is_terminal());
    }
}
