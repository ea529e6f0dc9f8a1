//! Host command execution
//!
//! Every external process the harness starts (container CLI calls) goes
//! through a `CommandExecutor`, which is injected into the environment
//! instead of being reached through global state.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::core::HarnessError;

/// Command specification for execution
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
    /// Working directory
    pub work_dir: Option<PathBuf>,
    /// Upper bound on wall-clock time
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: None,
            timeout: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.clone());
        v
    }

    /// Human-readable command line for logs and errors
    pub fn display(&self) -> String {
        self.to_vec().join(" ")
    }
}

/// Raw outcome of a finished command (no interpretation of the exit code)
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, or `128 + signal` when the process was killed
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code,
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.stdout.len() + self.stderr.len());
        out.extend_from_slice(&self.stdout);
        out.extend_from_slice(&self.stderr);
        out
    }

    /// Turn a non-zero exit into `HarnessError::ExternalProcess`
    pub fn check(self, spec: &CommandSpec) -> Result<Self, HarnessError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(HarnessError::ExternalProcess {
                command: spec.display(),
                returncode: self.exit_code,
                output: self.combined(),
            })
        }
    }
}

/// Executor trait for running host commands
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion, honoring `spec.timeout`
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, HarnessError>;

    /// Blocking variant, only for cleanup paths that cannot await (e.g. `Drop`)
    fn run_blocking(&self, spec: &CommandSpec) -> Result<CommandOutput, HarnessError>;
}

/// Executor that spawns real processes on the host
#[derive(Debug, Default, Clone)]
pub struct HostExecutor;

impl HostExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for HostExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, HarnessError> {
        debug!("Running host command: {:?}", spec.to_vec());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.work_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| HarnessError::Spawn {
            command: spec.display(),
            source,
        })?;

        let output = match spec.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| HarnessError::Timeout {
                    command: spec.display(),
                    after: limit,
                })??,
            None => child.wait_with_output().await?,
        };

        Ok(CommandOutput {
            exit_code: exit_code_of(&output.status),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn run_blocking(&self, spec: &CommandSpec) -> Result<CommandOutput, HarnessError> {
        debug!("Running blocking host command: {:?}", spec.to_vec());

        let mut cmd = std::process::Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null());
        if let Some(dir) = &spec.work_dir {
            cmd.current_dir(dir);
        }
        let output = cmd.output().map_err(|source| HarnessError::Spawn {
            command: spec.display(),
            source,
        })?;

        Ok(CommandOutput {
            exit_code: exit_code_of(&output.status),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Exit code with shell semantics: `128 + signo` for signal deaths
pub fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => 128 + sig,
        (None, None) => -1,
    }
}
