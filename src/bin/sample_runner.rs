//! Runs staged samples inside the environment and prints the framed result table
//!
//! Usage: `sample-runner <identifier> <working-dir> [rm]`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use oracle_harness::remote::{disable_core_dumps, SampleRunner, DEFAULT_ROOT};

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the result table; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("oracle_harness=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 && args.len() != 4 {
        let program = args.first().map(String::as_str).unwrap_or("sample-runner");
        println!("Usage: {} <identifier> <working_dir> [rm]", program);
        std::process::exit(1);
    }
    let identifier = &args[1];
    let working_dir = PathBuf::from(&args[2]);

    disable_core_dumps();
    let runner = SampleRunner::locate(Path::new(DEFAULT_ROOT), identifier)
        .with_context(|| format!("Cannot locate subject {}", identifier))?;

    let count = runner
        .run_dir(&working_dir, std::io::stdout())
        .await
        .with_context(|| format!("Failed to run samples in {:?}", working_dir))?;
    info!("Ran {} samples for {}", count, identifier);

    if args.get(3).map(String::as_str) == Some("rm") {
        std::fs::remove_dir_all(&working_dir)
            .with_context(|| format!("Failed to remove {:?}", working_dir))?;
    }
    Ok(())
}
