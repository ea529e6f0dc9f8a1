//! Runner module - batched execution inside an environment
//!
//! `BatchRunner` stages a batch of invocations as files, ships them into a
//! started environment, runs the remote runner once for the whole batch and
//! maps the framed result rows back to the submitted invocations.
//!
//! The runner module does NOT:
//! - Apply oracles (that's a separate step over the returned records)
//! - Retry failed batches
//! - Own the environment's lifecycle beyond lazily starting it and stopping
//!   it when a batch times out

pub mod protocol;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::HarnessConfig;
use crate::core::{unescape, ExecutionRecord, HarnessError, Subject};
use crate::oracle::canonicalize::contains;
use crate::sandbox::Environment;
use crate::subjects::{ContainerSetup, SAMPLE_SUFFIX};
use protocol::ResultRow;

#[derive(Debug, Clone)]
pub struct BatchRunner {
    setup: Arc<dyn ContainerSetup>,
    user: String,
    batch_timeout: Duration,
    diagnostics_dir: PathBuf,
}

impl BatchRunner {
    pub fn new(setup: Arc<dyn ContainerSetup>, config: &HarnessConfig) -> Self {
        Self {
            setup,
            user: config.user.clone(),
            batch_timeout: config.batch_timeout,
            diagnostics_dir: config.diagnostics_dir.clone(),
        }
    }

    /// Start the environment on first use
    pub async fn ensure_started(&self, env: &mut Environment) -> Result<(), HarnessError> {
        if env.is_running() {
            return Ok(());
        }
        env.start(&self.user).await
    }

    /// Run `invocations` in one remote call
    ///
    /// Every invocation comes back exactly once, paired with its record. The
    /// order of the pairs follows the remote runner, not the input.
    pub async fn execute(
        &self,
        env: &mut Environment,
        subject: &Subject,
        invocations: &[String],
    ) -> Result<Vec<(String, ExecutionRecord)>, HarnessError> {
        if invocations.is_empty() {
            return Ok(Vec::new());
        }
        info!(
            "Executing batch of {} invocations for {}",
            invocations.len(),
            subject.id
        );

        let staging = tempfile::Builder::new()
            .prefix("harness-batch-")
            .tempdir()?;
        let width = invocations.len().to_string().len();
        let mut mapping = HashMap::with_capacity(invocations.len());
        let mut files = Vec::with_capacity(invocations.len());
        for (idx, invocation) in invocations.iter().enumerate() {
            let name = format!("sample_{:0width$}.{}", idx, SAMPLE_SUFFIX, width = width);
            let path = staging.path().join(&name);
            tokio::fs::write(&path, unescape(invocation)).await?;
            mapping.insert(name, invocation.clone());
            files.push(path);
        }

        self.ensure_started(env).await?;
        // The remote runner removes the sample directory after every batch
        self.setup.prepare(env).await?;
        let remote_dir = self.setup.sample_dir();
        env.copy_in(&files, &remote_dir, &self.user).await?;

        let cmd = self.setup.runner_command(subject, &remote_dir);
        let raw = match env.exec_with_timeout(&cmd, None, self.batch_timeout).await {
            Ok(raw) => raw,
            Err(e @ HarnessError::Timeout { .. }) => {
                // Killing the exec client leaves the remote runner alive inside the instance
                warn!("Batch for {} timed out, stopping {}", subject.id, env.name());
                if let Err(stop_err) = env.stop().await {
                    error!("Failed to stop {} after timeout: {}", env.name(), stop_err);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        debug!("Remote runner produced {} bytes", raw.len());

        let rows = match protocol::parse_table(&protocol::extract_frames(&raw)) {
            Ok(rows) => rows,
            Err(reason) => {
                let dump = self.dump_raw(env.name(), &raw).await?;
                error!("Malformed runner output ({}), saved to {:?}", reason, dump);
                return Err(HarnessError::MalformedFrame { dump, reason });
            }
        };

        match pair_rows(subject, rows, mapping, invocations.len()) {
            Ok(pairs) => {
                info!("Batch for {} finished with {} records", subject.id, pairs.len());
                Ok(pairs)
            }
            Err(HarnessError::ProtocolMismatch {
                expected,
                actual,
                detail,
                ..
            }) => {
                let dump = self.dump_raw(env.name(), &raw).await?;
                error!(
                    "Runner returned {} of {} records ({}), saved to {:?}",
                    actual, expected, detail, dump
                );
                Err(HarnessError::ProtocolMismatch {
                    expected,
                    actual,
                    detail,
                    dump: Some(dump),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn dump_raw(&self, env_name: &str, raw: &[u8]) -> Result<PathBuf, HarnessError> {
        tokio::fs::create_dir_all(&self.diagnostics_dir).await?;
        let path = self
            .diagnostics_dir
            .join(format!("errordata-{}.csv", env_name));
        tokio::fs::write(&path, raw).await?;
        Ok(path)
    }
}

/// Bind every row to the invocation staged under its file name
fn pair_rows(
    subject: &Subject,
    rows: Vec<ResultRow>,
    mut mapping: HashMap<String, String>,
    expected: usize,
) -> Result<Vec<(String, ExecutionRecord)>, HarnessError> {
    let actual = rows.len();
    if actual != expected {
        return Err(HarnessError::ProtocolMismatch {
            expected,
            actual,
            detail: "row count differs from batch size".to_string(),
            dump: None,
        });
    }

    let marker = subject.termination_marker.as_deref();
    let mut pairs = Vec::with_capacity(actual);
    for row in rows {
        let invocation = mapping
            .remove(&row.file)
            .ok_or_else(|| HarnessError::ProtocolMismatch {
                expected,
                actual,
                detail: format!("unknown or repeated file `{}`", row.file),
                dump: None,
            })?;
        let termination_observed =
            marker.is_some_and(|m| contains(&row.output, m.as_bytes()));
        let record = ExecutionRecord {
            file_key: row.file,
            invocation_text: row.line,
            subject_id: row.subject,
            captured_output: Some(row.output),
            return_code: row.return_code,
            extracted_input: row.input,
            termination_observed,
        };
        pairs.push((invocation, record));
    }
    Ok(pairs)
}
