//! Scripted doubles for command runners and generation engines.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::Path;

use crate::errors::{CommandError, GenerationError};
use crate::generation::{GenerationEngine, GenerationRequest, MessageStream};
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};

/// A canned result for a scripted command.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Exit zero with this stdout.
    Ok(String),
    /// Exit non-zero.
    Fail {
        /// Exit code.
        code: i32,
        /// Captured stdout.
        stdout: String,
        /// Captured stderr.
        stderr: String,
    },
    /// The program could not be started.
    SpawnError(String),
}

impl ScriptedResponse {
    /// Exit zero with `stdout`.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::Ok(stdout.into())
    }

    /// Exit `code` with `stderr`.
    #[must_use]
    pub fn fail(code: i32, stderr: impl Into<String>) -> Self {
        Self::Fail {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Exit `code` with `stdout` and empty stderr.
    #[must_use]
    pub fn fail_stdout(code: i32, stdout: impl Into<String>) -> Self {
        Self::Fail {
            code,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Fail to spawn with `reason`.
    #[must_use]
    pub fn spawn_error(reason: impl Into<String>) -> Self {
        Self::SpawnError(reason.into())
    }

    fn resolve(&self, command: &CommandSpec) -> Result<CommandOutput, CommandError> {
        match self {
            Self::Ok(stdout) => Ok(CommandOutput::from_stdout(stdout.clone())),
            Self::Fail { code, stdout, stderr } => Err(CommandError::NonZeroExit {
                command: command.to_string(),
                status: format!("exit status: {code}"),
                exit_code: Some(*code),
                stdout: stdout.clone(),
                stderr: stderr.clone(),
            }),
            Self::SpawnError(reason) => Err(CommandError::Spawn {
                command: command.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, reason.clone()),
            }),
        }
    }
}

#[derive(Debug)]
enum Rule {
    Exact(String, ScriptedResponse),
    Prefix(String, ScriptedResponse),
}

/// A [`CommandRunner`] that records every command and answers from a script.
///
/// Exact rules win over prefix rules; among prefix rules the first match
/// wins. Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    /// Creates a runner where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers commands starting with `prefix`.
    #[must_use]
    pub fn on(mut self, prefix: impl Into<String>, response: ScriptedResponse) -> Self {
        self.rules.push(Rule::Prefix(prefix.into(), response));
        self
    }

    /// Answers exactly `command`.
    #[must_use]
    pub fn on_exact(mut self, command: impl Into<String>, response: ScriptedResponse) -> Self {
        self.rules.push(Rule::Exact(command.into(), response));
        self
    }

    /// Rendered commands in call order.
    #[must_use]
    pub fn invocations(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of calls starting with `prefix`.
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn response_for(&self, rendered: &str) -> Option<&ScriptedResponse> {
        let exact = self.rules.iter().find_map(|rule| match rule {
            Rule::Exact(cmd, response) if cmd == rendered => Some(response),
            _ => None,
        });
        exact.or_else(|| {
            self.rules.iter().find_map(|rule| match rule {
                Rule::Prefix(prefix, response) if rendered.starts_with(prefix.as_str()) => Some(response),
                _ => None,
            })
        })
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec, _working_dir: &Path) -> Result<CommandOutput, CommandError> {
        let rendered = command.to_string();
        self.calls.lock().push(rendered.clone());
        match self.response_for(&rendered) {
            Some(response) => response.resolve(command),
            None => Ok(CommandOutput::default()),
        }
    }
}

/// A [`GenerationEngine`] that replays a fixed transcript.
#[derive(Debug)]
pub struct ScriptedEngine {
    version: Result<String, GenerationError>,
    start_error: Option<GenerationError>,
    messages: Vec<Result<Value, GenerationError>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedEngine {
    /// An engine that streams `messages` on every start.
    #[must_use]
    pub fn new(messages: Vec<Value>) -> Self {
        Self {
            version: Ok("scripted 1.0.0".to_string()),
            start_error: None,
            messages: messages.into_iter().map(Ok).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Appends a mid-stream failure after the scripted messages.
    #[must_use]
    pub fn then_fail(mut self, error: GenerationError) -> Self {
        self.messages.push(Err(error));
        self
    }

    /// Makes the probe fail.
    #[must_use]
    pub fn with_probe_error(mut self, error: GenerationError) -> Self {
        self.version = Err(error);
        self
    }

    /// Makes every start fail.
    #[must_use]
    pub fn with_start_error(mut self, error: GenerationError) -> Self {
        self.start_error = Some(error);
        self
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl GenerationEngine for ScriptedEngine {
    async fn probe(&self) -> Result<String, GenerationError> {
        self.version.clone()
    }

    async fn start(&self, request: GenerationRequest) -> Result<MessageStream, GenerationError> {
        self.requests.lock().push(request);
        if let Some(err) = &self.start_error {
            return Err(err.clone());
        }
        Ok(MessageStream::from_results(self.messages.clone()))
    }
}
