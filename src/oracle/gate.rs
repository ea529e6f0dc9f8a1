//! Composable oracle wrappers

use super::canonicalize::contains;
use super::Oracle;
use crate::core::{ExecutionRecord, Verdict};

/// Undefined unless the run reached the termination marker
///
/// A missing marker means the harness lost track of the run (the runner
/// itself crashed or was killed), so nothing can be said about the subject.
#[derive(Debug)]
pub struct PreconditionGate {
    inner: Box<dyn Oracle>,
    marker: String,
}

impl PreconditionGate {
    pub fn new(inner: Box<dyn Oracle>, marker: impl Into<String>) -> Self {
        Self {
            inner,
            marker: marker.into(),
        }
    }
}

impl Oracle for PreconditionGate {
    fn apply(&self, record: &ExecutionRecord) -> Verdict {
        match record.captured_output.as_deref() {
            Some(output) if contains(output, self.marker.as_bytes()) => self.inner.apply(record),
            _ => Verdict::Undefined,
        }
    }
}

/// Failing when the output contains a fixed text
#[derive(Debug, Clone)]
pub struct OutputContains {
    needle: Vec<u8>,
}

impl OutputContains {
    pub fn new(needle: impl Into<Vec<u8>>) -> Self {
        Self {
            needle: needle.into(),
        }
    }
}

impl Oracle for OutputContains {
    fn apply(&self, record: &ExecutionRecord) -> Verdict {
        if contains(record.output(), &self.needle) {
            Verdict::Failing
        } else {
            Verdict::Passing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::exit_code::CrashCodeOracle;
    use crate::oracle::testing::record;

    fn gated_hang() -> PreconditionGate {
        PreconditionGate::new(Box::new(CrashCodeOracle::hang()), "Grep terminated")
    }

    #[test]
    fn test_gate_passes_through_when_marker_present() {
        let gate = gated_hang();
        assert_eq!(
            gate.apply(&record("grep a", b"\nGrep terminated\n", 124)),
            Verdict::Failing
        );
        assert_eq!(
            gate.apply(&record("grep a", b"a\n\nGrep terminated\n", 0)),
            Verdict::Passing
        );
    }

    #[test]
    fn test_gate_undefined_without_marker() {
        let gate = gated_hang();
        assert_eq!(gate.apply(&record("grep a", b"", 124)), Verdict::Undefined);

        let mut missing = record("grep a", b"", 124);
        missing.captured_output = None;
        assert_eq!(gate.apply(&missing), Verdict::Undefined);
    }

    #[test]
    fn test_output_contains() {
        let oracle = OutputContains::new("AddressSanitizer");
        assert_eq!(
            oracle.apply(&record("grep a", b"==1==ERROR: AddressSanitizer: heap", 1)),
            Verdict::Failing
        );
        assert_eq!(oracle.apply(&record("grep a", b"a\n", 0)), Verdict::Passing);
    }
}
