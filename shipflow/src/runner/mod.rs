//! External command execution.
//!
//! Build tools, version control and object storage are all driven through
//! [`CommandRunner`]. Exit status is the success signal: zero is success,
//! anything else is a [`CommandError::NonZeroExit`].

mod process;

pub use process::{ProcessRunner, TimeoutRunner};

use crate::errors::CommandError;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

/// Describes a command to execute: program, arguments and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Creates a command for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Parses a whitespace-separated command line such as `npm run build`.
    ///
    /// Returns `None` for a blank line. No shell quoting is interpreted.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).args(parts))
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the child process.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Returns the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the arguments.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Returns the extra environment variables.
    #[must_use]
    pub fn envs(&self) -> &[(String, String)] {
        &self.env
    }

    /// Returns true if the rendered command line starts with `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.to_string().starts_with(prefix)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Creates an output with only stdout.
    #[must_use]
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Returns stdout followed by stderr.
    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.trim_end(), self.stderr.trim_end()) {
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

/// Executes external commands.
///
/// Implementations block the caller until the process exits; partial output
/// is never streamed. No timeout is imposed here; wrap a runner in
/// [`TimeoutRunner`] when bounded latency is needed.
#[async_trait]
pub trait CommandRunner: Send + Sync + fmt::Debug {
    /// Runs `command` in `working_dir`.
    async fn run(&self, command: &CommandSpec, working_dir: &Path) -> Result<CommandOutput, CommandError>;
}
