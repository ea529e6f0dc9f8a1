//! Image recipes
//!
//! An image is looked up by tag in the local registry and only built when
//! missing. Concurrent builds of the same tag are not serialized here.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::cli::ContainerCli;
use crate::core::HarnessError;

/// How to produce an image when the registry does not have it yet
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRecipe {
    /// `docker build -t <tag> .` inside `context`
    Dockerfile { context: PathBuf },
    /// Snapshot of the upstream benchmark container after running a setup script
    Dbgbench {
        /// Directory holding the benchmark's `run.sh`
        docker_dir: PathBuf,
        /// Script executed inside the container before it is committed
        setup_script: PathBuf,
    },
}

/// Directory scripts are copied to inside the benchmark container
const SETUP_DIR: &str = "/root/Desktop";

/// Query the registry for `image_ref`; an empty answer means absent
pub async fn image_exists(cli: &ContainerCli, image_ref: &str) -> Result<Option<String>, HarnessError> {
    let output = cli.checked(["images", "-q", image_ref], None).await?;
    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(if id.is_empty() { None } else { Some(id) })
}

impl ImageRecipe {
    /// Build `image_ref`; `scratch_name` names any intermediate container
    pub async fn build(
        &self,
        cli: &ContainerCli,
        image_ref: &str,
        tool: &str,
        scratch_name: &str,
        timeout: Duration,
    ) -> Result<(), HarnessError> {
        match self {
            ImageRecipe::Dockerfile { context } => {
                info!("Building image {} from {:?}", image_ref, context);
                cli.checked_in(["build", "-t", image_ref, "."], context, Some(timeout))
                    .await?;
            }
            ImageRecipe::Dbgbench {
                docker_dir,
                setup_script,
            } => {
                let orig = format!("{}_orig", scratch_name);
                info!(
                    "Re-creating image {} for {} via container {}",
                    image_ref, tool, orig
                );

                let result =
                    snapshot(cli, docker_dir, setup_script, tool, &orig, image_ref, timeout).await;
                if let Err(e) = result {
                    match cli.unchecked(["rm", "-f", orig.as_str()]).await {
                        Ok(out) if out.is_success() => {}
                        Ok(out) => warn!(
                            "Removing {} failed: {}",
                            orig,
                            String::from_utf8_lossy(&out.combined()).trim()
                        ),
                        Err(rm_err) => warn!("Removing {} failed: {}", orig, rm_err),
                    }
                    return Err(e);
                }
            }
        }
        info!("Image {} is ready", image_ref);
        Ok(())
    }
}

/// Start the benchmark container `orig`, run the setup script in it and commit it
async fn snapshot(
    cli: &ContainerCli,
    docker_dir: &Path,
    setup_script: &Path,
    tool: &str,
    orig: &str,
    image_ref: &str,
    timeout: Duration,
) -> Result<(), HarnessError> {
    let run_sh = cli
        .raw("bash")
        .with_args(["run.sh", tool, orig, "exit"])
        .with_work_dir(docker_dir)
        .with_timeout(timeout);
    cli.run_checked(&run_sh).await?;

    let script = tokio::fs::canonicalize(setup_script).await?;
    let script_name = script
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "machine_setup.sh".to_string());
    let script_arg = script.to_string_lossy().into_owned();
    let dest = format!("{}:{}/", orig, SETUP_DIR);
    cli.checked(["cp", script_arg.as_str(), dest.as_str()], None)
        .await?;

    let inside = format!("{}/{}", SETUP_DIR, script_name);
    cli.checked(["exec", orig, "bash", inside.as_str()], Some(timeout))
        .await?;

    cli.checked(["kill", orig], None).await?;
    cli.checked(["commit", orig, image_ref], Some(timeout)).await?;
    cli.checked(["rm", orig], None).await?;
    Ok(())
}
