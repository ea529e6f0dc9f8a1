//! Thin wrapper around the container CLI (`docker` or a compatible program)

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::executor::{CommandExecutor, CommandOutput, CommandSpec};
use crate::core::HarnessError;

#[derive(Clone)]
pub struct ContainerCli {
    program: String,
    executor: Arc<dyn CommandExecutor>,
    default_timeout: Duration,
}

impl fmt::Debug for ContainerCli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerCli")
            .field("program", &self.program)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl ContainerCli {
    pub fn new(
        program: impl Into<String>,
        executor: Arc<dyn CommandExecutor>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            executor,
            default_timeout,
        }
    }

    /// Container CLI invocation with the default timeout
    pub fn command(&self, args: impl IntoIterator<Item = impl Into<String>>) -> CommandSpec {
        CommandSpec::new(&self.program)
            .with_args(args)
            .with_timeout(self.default_timeout)
    }

    /// Invocation of some other host program with the default timeout
    pub fn raw(&self, program: &str) -> CommandSpec {
        CommandSpec::new(program).with_timeout(self.default_timeout)
    }

    pub async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, HarnessError> {
        let output = self.executor.run(spec).await?;
        debug!("`{}` exited with {}", spec.display(), output.exit_code);
        Ok(output)
    }

    pub async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput, HarnessError> {
        self.run(spec).await?.check(spec)
    }

    /// Run the container CLI and fail on a non-zero exit
    pub async fn checked(
        &self,
        args: impl IntoIterator<Item = impl Into<String>>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, HarnessError> {
        let mut spec = self.command(args);
        if let Some(timeout) = timeout {
            spec = spec.with_timeout(timeout);
        }
        self.run_checked(&spec).await
    }

    /// Like `checked`, but from inside `dir`
    pub async fn checked_in(
        &self,
        args: impl IntoIterator<Item = impl Into<String>>,
        dir: &Path,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, HarnessError> {
        let mut spec = self.command(args).with_work_dir(dir);
        if let Some(timeout) = timeout {
            spec = spec.with_timeout(timeout);
        }
        self.run_checked(&spec).await
    }

    /// Run the container CLI and hand back the raw outcome whatever the exit code
    pub async fn unchecked(
        &self,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<CommandOutput, HarnessError> {
        self.run(&self.command(args)).await
    }

    /// Blocking call for cleanup paths
    pub fn blocking(
        &self,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<CommandOutput, HarnessError> {
        self.executor.run_blocking(&self.command(args))
    }
}
