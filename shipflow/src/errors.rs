//! Error types for the shipflow release pipeline.
//!
//! Each concern gets its own enum; [`ShipflowError`] is the umbrella type
//! returned by fallible library entry points.

use crate::core::StageId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for shipflow operations.
#[derive(Debug, Error)]
pub enum ShipflowError {
    /// An external command failed.
    #[error("{0}")]
    Command(#[from] CommandError),

    /// The generation engine failed or is unavailable.
    #[error("{0}")]
    Generation(#[from] GenerationError),

    /// Reading, merging or writing the configuration document failed.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The project directory does not exist.
    #[error("Project directory not found: {}", .0.display())]
    ProjectNotFound(PathBuf),

    /// The build output directory does not exist.
    #[error("Build artifacts missing: {}", .0.display())]
    ArtifactsMissing(PathBuf),

    /// A stage panicked or its task was aborted.
    #[error("Stage fault in {stage}: {message}")]
    StageFault {
        /// The stage that faulted.
        stage: StageId,
        /// The panic or join message.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by a [`CommandRunner`](crate::runner::CommandRunner).
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process could not be started.
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        /// The rendered command line.
        command: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The process exited with a non-zero status.
    #[error("`{command}` exited with {status}: {}", failure_text(.stderr, .stdout))]
    NonZeroExit {
        /// The rendered command line.
        command: String,
        /// Display form of the exit status.
        status: String,
        /// Exit code, if the process was not killed by a signal.
        exit_code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The command exceeded a caller-imposed deadline.
    #[error("`{command}` timed out after {}s", .timeout.as_secs_f64())]
    TimedOut {
        /// The rendered command line.
        command: String,
        /// The deadline that elapsed.
        timeout: Duration,
    },
}

fn failure_text(stderr: &str, stdout: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.to_string()
    }
}

impl CommandError {
    /// Returns the rendered command line that failed.
    #[must_use]
    pub fn command(&self) -> &str {
        match self {
            Self::Spawn { command, .. }
            | Self::NonZeroExit { command, .. }
            | Self::TimedOut { command, .. } => command,
        }
    }

    /// Returns the exit code, if the process ran to a normal exit.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Returns all captured text (stderr followed by stdout).
    ///
    /// Tools disagree about which stream carries the interesting message
    /// (git prints "nothing to commit" on stdout), so classification looks
    /// at both.
    #[must_use]
    pub fn output_text(&self) -> String {
        match self {
            Self::NonZeroExit { stdout, stderr, .. } => {
                let mut text = String::with_capacity(stdout.len() + stderr.len() + 1);
                text.push_str(stderr.trim_end());
                if !text.is_empty() && !stdout.trim().is_empty() {
                    text.push('\n');
                }
                text.push_str(stdout.trim_end());
                text
            }
            other => other.to_string(),
        }
    }
}

/// Errors raised by the generation engine.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// The engine has not finished initializing, or initialization failed.
    #[error("Generation engine not initialized ({state})")]
    NotReady {
        /// The current lifecycle state.
        state: String,
    },

    /// The engine could not be started.
    #[error("Failed to start generation engine: {0}")]
    Start(String),

    /// The engine produced output that is not a message.
    #[error("Malformed engine message: {0}")]
    Malformed(String),

    /// The engine process exited without signalling completion.
    #[error("Generation engine exited with {status}: {stderr}")]
    Exited {
        /// Display form of the exit status.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
}

/// Errors raised while loading, merging or persisting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document does not exist.
    #[error("Config file not found: {}", .path.display())]
    NotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// The configuration document could not be read or written.
    #[error("Config IO error at {}: {source}", .path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is not valid JSON.
    #[error("Config file {} is not valid JSON: {source}", .path.display())]
    Parse {
        /// The path being parsed.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The caller-supplied patch cannot be merged.
    #[error("Invalid configuration patch: {0}")]
    InvalidPatch(String),

    /// A service setting has an unusable value.
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// The setting name.
        key: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors raised by an [`EventSink`](crate::events::EventSink).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The sink was already closed by its writer.
    #[error("event sink already closed")]
    Closed,

    /// The consumer went away.
    #[error("event consumer disconnected")]
    Disconnected,
}
