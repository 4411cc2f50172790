//! Generation engine backed by a command-line agent emitting NDJSON.

use super::engine::{is_completion, GenerationEngine, GenerationRequest, MessageStream, MESSAGE_BUFFER};
use crate::errors::GenerationError;
use crate::runner::{CommandRunner, CommandSpec, ProcessRunner};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default engine program.
pub const DEFAULT_ENGINE_COMMAND: &str = "claude";

/// Spawns the engine program once per request and streams its stdout.
///
/// Each stdout line is one message. Lines that are not JSON are wrapped as
/// `{"type": "text", "text": <line>}`. A `"type": "result"` message ends the
/// session.
#[derive(Debug, Clone)]
pub struct ProcessGenerationEngine {
    program: String,
    extra_args: Vec<String>,
    probe_runner: Arc<dyn CommandRunner>,
}

impl ProcessGenerationEngine {
    /// Creates an engine for the given program.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
            probe_runner: Arc::new(ProcessRunner::new()),
        }
    }

    /// Appends arguments passed on every session.
    #[must_use]
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replaces the runner used by [`probe`](GenerationEngine::probe).
    #[must_use]
    pub fn with_probe_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.probe_runner = runner;
        self
    }

    /// Returns the command line for a session.
    #[must_use]
    pub fn session_command(&self, request: &GenerationRequest) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(["-p", request.prompt.as_str()])
            .args(["--output-format", "stream-json", "--verbose"])
            .arg("--max-turns")
            .arg(request.max_turns.to_string())
            .args(["--permission-mode", "acceptEdits"])
            .args(self.extra_args.iter().cloned())
    }
}

impl Default for ProcessGenerationEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE_COMMAND)
    }
}

/// Parses one stdout line into a message.
pub(crate) fn parse_line(line: &str) -> Option<Value> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => Some(json!({"type": "text", "text": trimmed})),
    }
}

#[async_trait]
impl GenerationEngine for ProcessGenerationEngine {
    async fn probe(&self) -> Result<String, GenerationError> {
        let spec = CommandSpec::new(&self.program).arg("--version");
        let output = self
            .probe_runner
            .run(&spec, Path::new("."))
            .await
            .map_err(|e| GenerationError::Start(e.to_string()))?;
        Ok(output.stdout.trim().to_string())
    }

    async fn start(&self, request: GenerationRequest) -> Result<MessageStream, GenerationError> {
        let spec = self.session_command(&request);
        info!(
            program = %self.program,
            cwd = %request.working_dir.display(),
            max_turns = request.max_turns,
            "Starting generation session"
        );

        let mut child = Command::new(spec.program())
            .args(spec.arguments())
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GenerationError::Start(format!("{}: {e}", spec.program())))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GenerationError::Start("engine stdout not captured".to_string()))?;
        let stderr = child.stderr.take();

        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
        let producer = tokio::spawn(async move {
            let stderr_task = tokio::spawn(async move {
                let mut text = String::new();
                if let Some(mut stderr) = stderr {
                    let _ = stderr.read_to_string(&mut text).await;
                }
                text
            });

            let mut lines = BufReader::new(stdout).lines();
            let mut completed = false;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(message) = parse_line(&line) else {
                            continue;
                        };
                        completed = is_completion(&message);
                        if tx.send(Ok(message)).await.is_err() {
                            debug!("Generation consumer went away");
                            return;
                        }
                        if completed {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(GenerationError::Malformed(e.to_string()))).await;
                        return;
                    }
                }
            }

            if completed {
                return;
            }

            let stderr_text = stderr_task.await.unwrap_or_default();
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    warn!(status = %status, "Generation engine exited without completing");
                    let _ = tx
                        .send(Err(GenerationError::Exited {
                            status: status.to_string(),
                            stderr: stderr_text.trim().to_string(),
                        }))
                        .await;
                }
                Err(e) => {
                    let _ = tx
                        .send(Err(GenerationError::Exited {
                            status: "unknown".to_string(),
                            stderr: e.to_string(),
                        }))
                        .await;
                }
            }
        });

        Ok(MessageStream::new(rx, Some(producer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_session_command_layout() {
        let engine = ProcessGenerationEngine::new("claude");
        let request = GenerationRequest::new("Add a pricing page", "/tmp/project").with_max_turns(7);
        let spec = engine.session_command(&request);

        assert_eq!(spec.program(), "claude");
        assert_eq!(
            spec.arguments(),
            [
                "-p",
                "Add a pricing page",
                "--output-format",
                "stream-json",
                "--verbose",
                "--max-turns",
                "7",
                "--permission-mode",
                "acceptEdits",
            ]
        );
    }

    #[test]
    fn test_parse_line_wraps_text() {
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line(r#"{"type":"assistant"}"#), Some(json!({"type": "assistant"})));
        assert_eq!(
            parse_line("warming up"),
            Some(json!({"type": "text", "text": "warming up"}))
        );
        assert_eq!(parse_line("42"), Some(json!({"type": "text", "text": "42"})));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_streams_until_result() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("engine.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             echo '{\"type\":\"system\"}'\n\
             echo '{\"type\":\"assistant\",\"n\":1}'\n\
             echo '{\"type\":\"result\",\"subtype\":\"success\"}'\n\
             echo '{\"type\":\"after\"}'\n",
        )
        .unwrap();

        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let engine = ProcessGenerationEngine::new(script.to_string_lossy().to_string());

        let mut stream = engine
            .start(GenerationRequest::new("hello", dir.path()))
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while let Some(item) = stream.next().await {
            kinds.push(item.unwrap()["type"].as_str().unwrap().to_string());
        }
        assert_eq!(kinds, ["system", "assistant", "result"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_reports_failed_exit() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("engine.sh");
        std::fs::write(&script, "#!/bin/sh\necho '{\"type\":\"system\"}'\necho 'auth failed' >&2\nexit 2\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let engine = ProcessGenerationEngine::new(script.to_string_lossy().to_string());
        let mut stream = engine
            .start(GenerationRequest::new("hello", dir.path()))
            .await
            .unwrap();

        assert!(stream.next().await.unwrap().is_ok());
        match stream.next().await.unwrap() {
            Err(GenerationError::Exited { stderr, .. }) => assert_eq!(stderr, "auth failed"),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_start_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ProcessGenerationEngine::new("definitely-not-an-engine-4242");
        let err = engine
            .start(GenerationRequest::new("hello", dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Start(_)));
    }
}
