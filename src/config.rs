//! Harness configuration
//!
//! Loaded from `HARNESS_*` environment variables with fixed defaults and passed
//! explicitly to the components that need it.

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::oracle::InapplicablePolicy;

/// Harness configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Container CLI program (default: `docker`)
    pub docker: String,
    /// User the environment runs commands as (default: `root`)
    pub user: String,
    /// Host path of the `sample-runner` binary provisioned into every environment
    pub runner_binary: PathBuf,
    /// Ceiling for one remote batch (default: 4h)
    pub batch_timeout: Duration,
    /// Ceiling for building an image (default: 2h)
    pub build_timeout: Duration,
    /// Ceiling for every other container command (default: 10min)
    pub command_timeout: Duration,
    /// Where undecodable runner output is persisted for postmortem
    pub diagnostics_dir: PathBuf,
    /// Optional TOML file replacing the built-in subject registry
    pub subjects_file: Option<PathBuf>,
    /// Verdict for oracle short-circuits
    pub inapplicable: InapplicablePolicy,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
            user: "root".to_string(),
            runner_binary: default_runner_binary(),
            batch_timeout: Duration::from_secs(4 * 3600),
            build_timeout: Duration::from_secs(2 * 3600),
            command_timeout: Duration::from_secs(600),
            diagnostics_dir: PathBuf::from("harness-diagnostics"),
            subjects_file: None,
            inapplicable: InapplicablePolicy::Passing,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            docker: std::env::var("HARNESS_DOCKER").unwrap_or(defaults.docker),
            user: std::env::var("HARNESS_USER").unwrap_or(defaults.user),
            runner_binary: std::env::var("HARNESS_RUNNER_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.runner_binary),
            batch_timeout: secs_var("HARNESS_BATCH_TIMEOUT_SECS").unwrap_or(defaults.batch_timeout),
            build_timeout: secs_var("HARNESS_BUILD_TIMEOUT_SECS").unwrap_or(defaults.build_timeout),
            command_timeout: secs_var("HARNESS_COMMAND_TIMEOUT_SECS")
                .unwrap_or(defaults.command_timeout),
            diagnostics_dir: std::env::var("HARNESS_DIAGNOSTICS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.diagnostics_dir),
            subjects_file: std::env::var("HARNESS_SUBJECTS").ok().map(PathBuf::from),
            inapplicable: std::env::var("HARNESS_INAPPLICABLE")
                .ok()
                .and_then(|v| parse_policy(&v))
                .unwrap_or(defaults.inapplicable),
        }
    }
}

fn secs_var(key: &str) -> Option<Duration> {
    let value = std::env::var(key).ok()?;
    match value.trim().parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a number of seconds", key, value);
            None
        }
    }
}

fn parse_policy(value: &str) -> Option<InapplicablePolicy> {
    match value.trim().to_lowercase().as_str() {
        "passing" => Some(InapplicablePolicy::Passing),
        "undefined" => Some(InapplicablePolicy::Undefined),
        other => {
            warn!("Ignoring HARNESS_INAPPLICABLE={:?}", other);
            None
        }
    }
}

/// `sample-runner` next to the running executable
fn default_runner_binary() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("sample-runner")))
        .unwrap_or_else(|| PathBuf::from("sample-runner"))
}
