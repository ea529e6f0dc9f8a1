//! Container environment management
//!
//! One `Environment` is one disposable container instance for one subject.
//! It builds (or reuses) the subject's image, starts a uniquely named
//! instance, provisions helper files, copies inputs in, runs commands and
//! finally kills and removes the instance.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::cli::ContainerCli;
use super::image::{image_exists, ImageRecipe};
use crate::core::{HarnessError, Subject};

/// Directory (under the user's home) receiving the bootstrap helpers
pub const HELPER_DIR: &str = "alhazen_scripts";

/// Lifecycle of the underlying container instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// No instance exists
    Stopped,
    /// Instance is up and accepts commands
    Running,
    /// Instance was killed but not removed yet
    Killed,
}

/// Timeouts applied to container operations
#[derive(Debug, Clone)]
pub struct EnvironmentLimits {
    /// Default for every container command
    pub command: Duration,
    /// Image builds
    pub build: Duration,
}

impl Default for EnvironmentLimits {
    fn default() -> Self {
        Self {
            command: Duration::from_secs(600),
            build: Duration::from_secs(2 * 3600),
        }
    }
}

#[derive(Debug)]
pub struct Environment {
    name: String,
    image_ref: String,
    tool: String,
    recipe: ImageRecipe,
    helpers: Vec<PathBuf>,
    cli: ContainerCli,
    limits: EnvironmentLimits,
    state: InstanceState,
}

impl Environment {
    /// Create an environment handle; nothing is started yet
    pub fn new(
        subject: &Subject,
        recipe: ImageRecipe,
        helpers: Vec<PathBuf>,
        cli: ContainerCli,
        limits: EnvironmentLimits,
    ) -> Self {
        Self {
            name: unique_name(&subject.id),
            image_ref: subject.image_ref.clone(),
            tool: subject.tool().to_string(),
            recipe,
            helpers,
            cli,
            limits,
            state: InstanceState::Stopped,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image_ref(&self) -> &str {
        &self.image_ref
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == InstanceState::Running
    }

    /// Home directory of `user` inside the instance
    pub fn home_dir(user: &str) -> PathBuf {
        if user == "root" {
            PathBuf::from("/root/Desktop")
        } else {
            PathBuf::from(format!("/home/{}", user))
        }
    }

    /// Build the image unless the registry already has it
    pub async fn ensure_image(&self) -> Result<(), HarnessError> {
        match image_exists(&self.cli, &self.image_ref).await? {
            Some(id) => {
                info!("Using existing image {} with ID {}", self.image_ref, id);
                Ok(())
            }
            None => {
                self.recipe
                    .build(
                        &self.cli,
                        &self.image_ref,
                        &self.tool,
                        &self.name,
                        self.limits.build,
                    )
                    .await
            }
        }
    }

    /// Ensure the image, launch the instance and provision the helper files
    pub async fn start(&mut self, user: &str) -> Result<(), HarnessError> {
        if self.is_running() {
            debug!("Environment {} already running", self.name);
            return Ok(());
        }
        self.ensure_image().await?;

        info!(
            "Starting container {} from image {}",
            self.name, self.image_ref
        );
        self.cli
            .checked(
                ["run", "-dt", "--name", self.name.as_str(), self.image_ref.as_str()],
                None,
            )
            .await?;
        self.state = InstanceState::Running;

        if !self.helpers.is_empty() {
            let helper_dir = Self::home_dir(user).join(HELPER_DIR);
            self.mkdir(&helper_dir).await?;
            let helpers = self.helpers.clone();
            self.copy_in(&helpers, &helper_dir, user).await?;
        }

        info!("Container {} is running", self.name);
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), HarnessError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(HarnessError::NotRunning {
                name: self.name.clone(),
            })
        }
    }

    /// `mkdir -p` inside the instance
    pub async fn mkdir(&self, dir: &Path) -> Result<(), HarnessError> {
        let dir = dir.to_string_lossy().into_owned();
        self.exec(&["mkdir".to_string(), "-p".to_string(), dir], None)
            .await?;
        Ok(())
    }

    /// Copy host paths into `dest` (an existing directory) and hand them to `user`
    pub async fn copy_in(
        &self,
        paths: &[PathBuf],
        dest: &Path,
        user: &str,
    ) -> Result<(), HarnessError> {
        self.ensure_running()?;

        let dest_str = dest.to_string_lossy().into_owned();
        for path in paths {
            let source = tokio::fs::canonicalize(path).await?;
            let target = format!("{}:{}/", self.name, dest_str);
            debug!("Copying {:?} into {}", source, target);
            self.cli
                .checked(
                    ["cp".to_string(), source.to_string_lossy().into_owned(), target],
                    None,
                )
                .await?;
        }

        let owner = format!("{}:{}", user, user);
        let chown = self
            .cli
            .unchecked([
                "exec",
                "-u",
                "root",
                self.name.as_str(),
                "chown",
                "-R",
                owner.as_str(),
                dest_str.as_str(),
            ])
            .await;
        match chown {
            Ok(output) if output.is_success() => {}
            Ok(output) => warn!(
                "chown of {} in {} failed ({}): {}",
                dest_str,
                self.name,
                output.exit_code,
                String::from_utf8_lossy(&output.combined()).trim()
            ),
            Err(e) => warn!("chown of {} in {} failed: {}", dest_str, self.name, e),
        }
        Ok(())
    }

    /// Run `cmd` inside the instance; returns stdout followed by stderr
    pub async fn exec(&self, cmd: &[String], cwd: Option<&Path>) -> Result<Vec<u8>, HarnessError> {
        self.exec_with_timeout(cmd, cwd, self.limits.command).await
    }

    /// `exec` with an explicit time budget
    pub async fn exec_with_timeout(
        &self,
        cmd: &[String],
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<Vec<u8>, HarnessError> {
        self.ensure_running()?;

        let mut args = vec!["exec".to_string()];
        if let Some(dir) = cwd {
            args.push("-w".to_string());
            args.push(dir.to_string_lossy().into_owned());
        }
        args.push(self.name.clone());
        args.extend(cmd.iter().cloned());

        let output = self.cli.checked(args, Some(timeout)).await?;
        Ok(output.combined())
    }

    /// Kill and remove the instance; safe to call again after a failure
    pub async fn stop(&mut self) -> Result<(), HarnessError> {
        if self.state == InstanceState::Running {
            info!("Stopping container {}", self.name);
            let out = self.cli.checked(["kill", self.name.as_str()], None).await?;
            debug!("Kill result: {}", String::from_utf8_lossy(&out.stdout).trim());
            self.state = InstanceState::Killed;
        }
        if self.state == InstanceState::Killed {
            let out = self.cli.checked(["rm", self.name.as_str()], None).await?;
            debug!("Remove result: {}", String::from_utf8_lossy(&out.stdout).trim());
            self.state = InstanceState::Stopped;
            info!("Container {} removed", self.name);
        }
        Ok(())
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if self.state == InstanceState::Stopped {
            return;
        }
        warn!(
            "Environment {} dropped while {:?}; force-removing",
            self.name, self.state
        );
        match self.cli.blocking(["rm", "-f", self.name.as_str()]) {
            Ok(output) if output.is_success() => {}
            Ok(output) => warn!(
                "Force-removing {} failed: {}",
                self.name,
                String::from_utf8_lossy(&output.combined()).trim()
            ),
            Err(e) => warn!("Force-removing {} failed: {}", self.name, e),
        }
    }
}

/// `dbgbench_<subject>_<uuid>`; unique across concurrent runs of one subject
fn unique_name(subject_id: &str) -> String {
    format!("dbgbench_{}_{}", subject_id, uuid::Uuid::new_v4())
}
