//! Error taxonomy shared by the environment, the batch runner and the registry
//!
//! Every variant is fatal to the current batch. Nothing here is retried
//! automatically; callers decide whether to resubmit.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Operation attempted before the environment was started
    #[error("environment {name} is not running")]
    NotRunning { name: String },

    /// An external command exited non-zero; the captured output is kept for diagnosis
    #[error("command `{command}` exited with {returncode}: {}", preview(.output))]
    ExternalProcess {
        command: String,
        returncode: i32,
        output: Vec<u8>,
    },

    /// Parsed record count or identity does not match what was submitted
    #[error(
        "protocol mismatch: expected {expected} records, got {actual} ({detail}){}",
        dump_note(.dump)
    )]
    ProtocolMismatch {
        expected: usize,
        actual: usize,
        detail: String,
        /// Raw runner output, once it has been saved
        dump: Option<PathBuf>,
    },

    /// The framed table could not be parsed; raw bytes were written to `dump`
    #[error("malformed framed output ({reason}), raw data in {}", .dump.display())]
    MalformedFrame { dump: PathBuf, reason: String },

    /// An external command exceeded its time budget
    #[error("command `{command}` timed out after {}s", .after.as_secs())]
    Timeout { command: String, after: Duration },

    /// An external command could not be spawned at all
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid subject registry: {0}")]
    Registry(String),

    #[error("invalid canonicalization pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Captured output attached to the error, if any
    pub fn captured_output(&self) -> Option<&[u8]> {
        match self {
            HarnessError::ExternalProcess { output, .. } => Some(output),
            _ => None,
        }
    }
}

fn dump_note(dump: &Option<PathBuf>) -> String {
    match dump {
        Some(path) => format!(", raw data in {}", path.display()),
        None => String::new(),
    }
}

fn preview(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    let trimmed = text.trim();
    if trimmed.chars().count() > 500 {
        let head: String = trimmed.chars().take(500).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}
