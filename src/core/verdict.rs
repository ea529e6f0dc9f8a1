use serde::{Deserialize, Serialize};
use std::fmt;

/// Ternary oracle verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Oracle-confirmed bug-indicating behavior
    Failing,
    /// Behavior consistent with correct operation, or oracle not applicable
    Passing,
    /// Oracle cannot decide (precondition not met)
    Undefined,
}

impl Verdict {
    pub fn is_failing(&self) -> bool {
        matches!(self, Verdict::Failing)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Failing => "failing",
            Verdict::Passing => "passing",
            Verdict::Undefined => "undefined",
        };
        write!(f, "{}", s)
    }
}
