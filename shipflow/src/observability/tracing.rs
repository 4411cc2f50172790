//! Tracing subscriber setup and span helpers for pipeline runs.

use crate::core::{OutcomeStatus, StageId};
use crate::errors::ShipflowError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Output format for the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses `LOG_FORMAT`; anything other than `json` selects pretty output.
    #[must_use]
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Installs the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to `info`.
pub fn init_tracing(format: LogFormat) -> Result<(), ShipflowError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .try_init(),
    };

    result.map_err(|e| ShipflowError::Internal(format!("tracing init failed: {e}")))
}

/// Span attributes recorded when a stage finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpanAttributes {
    /// Stage name.
    pub stage: StageId,
    /// Outcome status.
    pub status: Option<OutcomeStatus>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Error message if failed.
    pub error: Option<String>,
}

impl StageSpanAttributes {
    /// Creates new stage span attributes.
    #[must_use]
    pub fn new(stage: StageId) -> Self {
        Self {
            stage,
            status: None,
            duration_ms: None,
            error: None,
        }
    }

    /// Sets the outcome status.
    #[must_use]
    pub fn with_status(mut self, status: OutcomeStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Flattens the attributes into dotted keys.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();

        attrs.insert("stage.name".to_string(), self.stage.to_string());

        if let Some(v) = self.status {
            attrs.insert("stage.status".to_string(), v.to_string());
        }
        if let Some(v) = self.duration_ms {
            attrs.insert("stage.duration_ms".to_string(), v.to_string());
        }
        if let Some(ref v) = self.error {
            attrs.insert("stage.error".to_string(), v.clone());
        }

        attrs
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::from_env_value(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some("pretty")), LogFormat::Pretty);
        assert_eq!(LogFormat::from_env_value(None), LogFormat::Pretty);
    }

    #[test]
    fn test_stage_span_attributes() {
        let attrs = StageSpanAttributes::new(StageId::Build)
            .with_status(OutcomeStatus::Success)
            .with_duration_ms(123.45);

        let flat = attrs.to_attributes();
        assert_eq!(flat.get("stage.name"), Some(&"build".to_string()));
        assert_eq!(flat.get("stage.status"), Some(&"success".to_string()));
        assert_eq!(flat.get("stage.duration_ms"), Some(&"123.45".to_string()));
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("build");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(timer.name(), "build");
        let duration = timer.finish();
        assert!(duration >= 10.0);
    }
}
