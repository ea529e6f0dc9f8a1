use serde::{Deserialize, Serialize};

/// Return code the `timeout` utility reports for an expired command
pub const RC_TIMEOUT: i32 = 124;
/// Return code of a process aborted by SIGABRT (assertion failure)
pub const RC_ABORT: i32 = 134;
/// Return code of a process killed by SIGSEGV
pub const RC_SEGFAULT: i32 = 139;

/// A specific buggy build of a command-line utility
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Stable key, e.g. `grep.3c3bdace`
    pub id: String,
    /// Image tag used as the build/cache key for the environment
    pub image_ref: String,
    /// Text the remote runner emits once a run completed
    pub termination_marker: Option<String>,
}

impl Subject {
    pub fn new(id: impl Into<String>, image_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image_ref: image_ref.into(),
            termination_marker: None,
        }
    }

    pub fn with_termination_marker(mut self, marker: impl Into<String>) -> Self {
        self.termination_marker = Some(marker.into());
        self
    }

    /// Utility name, i.e. the identifier up to the first `.`
    pub fn tool(&self) -> &str {
        tool_of(&self.id)
    }
}

/// Utility name for a subject identifier (`grep.3c3bdace` -> `grep`)
pub fn tool_of(id: &str) -> &str {
    id.split('.').next().unwrap_or(id)
}

/// One row per submitted invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Per-batch identifier binding the record to its invocation
    pub file_key: String,
    /// Command line as it was executed inside the environment
    pub invocation_text: String,
    pub subject_id: String,
    /// Combined stdout+stderr, truncated by the remote runner; `None` when not reported
    pub captured_output: Option<Vec<u8>>,
    pub return_code: i32,
    /// Raw bytes of the piped literal payload, when one could be recovered
    pub extracted_input: Option<Vec<u8>>,
    pub termination_observed: bool,
}

impl ExecutionRecord {
    pub fn output(&self) -> &[u8] {
        self.captured_output.as_deref().unwrap_or_default()
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(self.output()).into_owned()
    }
}
