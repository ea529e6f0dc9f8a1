use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info};

use oracle_harness::sandbox::HostExecutor;
use oracle_harness::{
    escape, HarnessConfig, SampleProvider, SubjectRegistry, SubjectSession, Verdict,
};

/// One line of output per invocation
#[derive(Debug, Serialize)]
struct VerdictLine<'a> {
    invocation: &'a str,
    verdict: Verdict,
    return_code: i32,
    file: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("oracle_harness=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 && args.len() != 3 {
        let program = args.first().map(String::as_str).unwrap_or("harness");
        eprintln!("Usage: {} <subject-id> [invocations-file]", program);
        std::process::exit(1);
    }

    let config = HarnessConfig::from_env();
    info!("Harness config: {:?}", config);

    let registry = SubjectRegistry::from_config(&config)?;
    let entry = registry.get(&args[1]).with_context(|| {
        format!(
            "Unknown subject {} (known: {})",
            args[1],
            registry.ids().collect::<Vec<_>>().join(", ")
        )
    })?;

    let invocations = match args.get(2) {
        Some(path) => read_invocations(path)?,
        None => entry
            .sample_provider()
            .with_context(|| format!("Subject {} has no bundled samples", entry.id))?
            .sample_inputs()?,
    };
    info!("Loaded {} invocations for {}", invocations.len(), entry.id);

    let mut session = SubjectSession::new(entry, &config, Arc::new(HostExecutor::new()))?;
    let result = run_batch(&mut session, &invocations).await;
    if let Err(e) = session.tear_down().await {
        error!("Failed to tear down environment: {}", e);
    }
    result
}

/// One invocation per non-empty line, escaped for the sample channel
fn read_invocations(path: &str) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read invocations from {}", path))?;
    Ok(text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(escape)
        .collect())
}

async fn run_batch(session: &mut SubjectSession, invocations: &[String]) -> Result<()> {
    let pairs = session.execute(invocations).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut failing = 0;
    for (invocation, record) in &pairs {
        let verdict = session.oracle().apply(record);
        if verdict.is_failing() {
            failing += 1;
        }
        let line = VerdictLine {
            invocation,
            verdict,
            return_code: record.return_code,
            file: &record.file_key,
        };
        serde_json::to_writer(&mut out, &line)?;
        writeln!(out)?;
    }
    out.flush()?;

    info!(
        "{}: {} of {} invocations failing",
        session.subject().id,
        failing,
        pairs.len()
    );
    Ok(())
}
