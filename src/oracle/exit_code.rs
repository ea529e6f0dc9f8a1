//! Oracles that only look at the return code

use std::collections::BTreeSet;

use super::Oracle;
use crate::core::record::{RC_ABORT, RC_SEGFAULT, RC_TIMEOUT};
use crate::core::{ExecutionRecord, Verdict};

/// Failing when the return code is in a fixed set
#[derive(Debug, Clone)]
pub struct CrashCodeOracle {
    codes: BTreeSet<i32>,
}

impl CrashCodeOracle {
    pub fn new(codes: impl IntoIterator<Item = i32>) -> Self {
        Self {
            codes: codes.into_iter().collect(),
        }
    }

    /// Segmentation fault; aborts count too since sanitizers report through them
    pub fn segv() -> Self {
        Self::new([RC_SEGFAULT, RC_ABORT])
    }

    pub fn assertion() -> Self {
        Self::new([RC_ABORT])
    }

    /// Killed by the `timeout` wrapper
    pub fn hang() -> Self {
        Self::new([RC_TIMEOUT])
    }

    pub fn codes(&self) -> impl Iterator<Item = i32> + '_ {
        self.codes.iter().copied()
    }
}

impl Oracle for CrashCodeOracle {
    fn apply(&self, record: &ExecutionRecord) -> Verdict {
        if self.codes.contains(&record.return_code) {
            Verdict::Failing
        } else {
            Verdict::Passing
        }
    }
}
