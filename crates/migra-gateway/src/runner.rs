//! External command execution
//!
//! Commands run without a shell: a program plus an argument vector, an
//! optional working directory and extra environment variables. The
//! [`CommandRunner`] trait is the seam tests replace with canned output.

use crate::error::GatewayError;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// A single external command
#[derive(Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Create a command with no arguments
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run inside `dir`
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Add an environment variable for the child only
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Whether any argument contains `needle`
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a.contains(needle))
    }

    /// Printable form with secret-bearing arguments masked
    #[must_use]
    pub fn display_redacted(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            if arg.starts_with("--password=") {
                out.push_str("--password=****");
            } else {
                out.push_str(arg);
            }
        }
        out
    }
}

// Env values may carry passwords, so only their keys are printed.
impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("command", &self.display_redacted())
            .field("cwd", &self.cwd)
            .field("env_keys", &self.env.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
}

impl ProcessOutput {
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.returncode == 0
    }
}

/// Executes external commands
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output.
    ///
    /// A non-zero exit is *not* an error here; only failing to start,
    /// read, or finish within the timeout is.
    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, GatewayError>;
}

/// Runs commands on the local host through `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    /// Runner without a timeout; long dumps may take hours
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill commands that run longer than `timeout`
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, GatewayError> {
        let started = Instant::now();
        tracing::debug!(command = %command.display_redacted(), "command_started");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|source| GatewayError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| GatewayError::Timeout {
                    program: command.program.clone(),
                    secs: limit.as_secs(),
                })??,
            None => child.wait_with_output().await?,
        };

        // Signal-terminated children have no exit code.
        let returncode = output.status.code().unwrap_or(crate::envelope::NO_RETURNCODE);
        tracing::debug!(
            program = %command.program,
            returncode,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "command_finished"
        );

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            returncode,
        })
    }
}
