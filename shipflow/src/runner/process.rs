//! Process-backed command runners.

use super::{CommandOutput, CommandRunner, CommandSpec};
use crate::errors::CommandError;
use crate::observability::SpanTimer;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs commands as child processes via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a new process runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &CommandSpec, working_dir: &Path) -> Result<CommandOutput, CommandError> {
        let rendered = command.to_string();
        let timer = SpanTimer::start(rendered.clone());
        debug!(command = %rendered, cwd = %working_dir.display(), "Running command");

        let mut cmd = Command::new(command.program());
        cmd.args(command.arguments())
            .envs(command.envs().iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(|source| CommandError::Spawn {
            command: rendered.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let duration_ms = timer.finish();

        if output.status.success() {
            debug!(command = %rendered, duration_ms, "Command succeeded");
            Ok(CommandOutput { stdout, stderr })
        } else {
            warn!(
                command = %rendered,
                status = %output.status,
                duration_ms,
                "Command failed"
            );
            Err(CommandError::NonZeroExit {
                command: rendered,
                status: output.status.to_string(),
                exit_code: output.status.code(),
                stdout,
                stderr,
            })
        }
    }
}

/// Wraps another runner with a deadline.
///
/// The inner future is dropped when the deadline elapses; [`ProcessRunner`]
/// spawns with `kill_on_drop`, so the child is killed too.
#[derive(Debug, Clone)]
pub struct TimeoutRunner<R> {
    inner: R,
    timeout: Duration,
}

impl<R> TimeoutRunner<R> {
    /// Creates a runner that fails with [`CommandError::TimedOut`] after `timeout`.
    #[must_use]
    pub fn new(inner: R, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<R: CommandRunner> CommandRunner for TimeoutRunner<R> {
    async fn run(&self, command: &CommandSpec, working_dir: &Path) -> Result<CommandOutput, CommandError> {
        match tokio::time::timeout(self.timeout, self.inner.run(command, working_dir)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(command = %command, timeout_s = self.timeout.as_secs_f64(), "Command timed out");
                Err(CommandError::TimedOut {
                    command: command.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }
}
