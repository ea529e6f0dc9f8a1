//! Oracle engine: maps execution records to verdicts
//!
//! Oracles are pure functions of a single record. Subject-specific ones are
//! built from the name in the subject registry and, when the subject has a
//! termination marker, wrapped in a [`PreconditionGate`].

pub mod canonicalize;
pub mod exit_code;
pub mod flags;
pub mod gate;
pub mod invariants;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::{ExecutionRecord, HarnessError, Subject, Verdict};

pub use canonicalize::Canonicalizer;
pub use exit_code::CrashCodeOracle;
pub use gate::{OutputContains, PreconditionGate};
pub use invariants::{CharacterSubset, LineSubset, TrailingTerminator};

pub trait Oracle: Send + Sync + fmt::Debug {
    fn apply(&self, record: &ExecutionRecord) -> Verdict;
}

/// Verdict returned when an oracle's preconditions are not met
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InapplicablePolicy {
    #[default]
    Passing,
    Undefined,
}

impl InapplicablePolicy {
    pub fn verdict(self) -> Verdict {
        match self {
            InapplicablePolicy::Passing => Verdict::Passing,
            InapplicablePolicy::Undefined => Verdict::Undefined,
        }
    }
}

/// Oracle names as they appear in the subject registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleKind {
    Segv,
    Assertion,
    Hang,
    NoNewText,
    Line,
    TrailingNewline,
    OutputContains(String),
}

impl FromStr for OracleKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(text) = s.strip_prefix("output_contains:") {
            return Ok(OracleKind::OutputContains(text.to_string()));
        }
        match s {
            "segv" => Ok(OracleKind::Segv),
            "assertion" => Ok(OracleKind::Assertion),
            "hang" => Ok(OracleKind::Hang),
            "no_new_text" => Ok(OracleKind::NoNewText),
            "line" => Ok(OracleKind::Line),
            "trailing_newline" => Ok(OracleKind::TrailingNewline),
            other => Err(HarnessError::Registry(format!("unknown oracle `{}`", other))),
        }
    }
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleKind::Segv => write!(f, "segv"),
            OracleKind::Assertion => write!(f, "assertion"),
            OracleKind::Hang => write!(f, "hang"),
            OracleKind::NoNewText => write!(f, "no_new_text"),
            OracleKind::Line => write!(f, "line"),
            OracleKind::TrailingNewline => write!(f, "trailing_newline"),
            OracleKind::OutputContains(text) => write!(f, "output_contains:{}", text),
        }
    }
}

impl OracleKind {
    /// Oracle for `subject`, gated on its termination marker when it has one
    pub fn build(
        &self,
        subject: &Subject,
        policy: InapplicablePolicy,
    ) -> Result<Box<dyn Oracle>, HarnessError> {
        let marker = subject.termination_marker.as_deref();
        let canonicalizer = || Canonicalizer::for_tool(subject.tool(), marker);

        let inner: Box<dyn Oracle> = match self {
            OracleKind::Segv => Box::new(CrashCodeOracle::segv()),
            OracleKind::Assertion => Box::new(CrashCodeOracle::assertion()),
            OracleKind::Hang => Box::new(CrashCodeOracle::hang()),
            OracleKind::NoNewText => Box::new(CharacterSubset::new(canonicalizer()?, policy)),
            OracleKind::Line => Box::new(LineSubset::new(canonicalizer()?, policy)),
            OracleKind::TrailingNewline => Box::new(TrailingTerminator::new(canonicalizer()?)),
            OracleKind::OutputContains(text) => Box::new(OutputContains::new(text.as_bytes())),
        };

        Ok(match marker {
            Some(marker) => Box::new(PreconditionGate::new(inner, marker)),
            None => inner,
        })
    }
}

/// Pair every invocation with its verdict, keeping input order
pub fn classify(
    pairs: Vec<(String, ExecutionRecord)>,
    oracle: &dyn Oracle,
) -> Vec<(String, Verdict)> {
    pairs
        .into_iter()
        .map(|(invocation, record)| {
            let verdict = oracle.apply(&record);
            (invocation, verdict)
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::testing::record;
    use super::*;

    fn grep_subject() -> Subject {
        Subject::new("grep.5fa8c7c9", "alhazen_grep.5fa8c7c9")
            .with_termination_marker("Grep terminated")
    }

    #[test]
    fn test_oracle_kind_parsing() {
        for name in ["segv", "assertion", "hang", "no_new_text", "line", "trailing_newline"] {
            let kind: OracleKind = name.parse().unwrap();
            assert_eq!(kind.to_string(), name);
        }
        assert_eq!(
            "output_contains:heap-buffer-overflow".parse::<OracleKind>().unwrap(),
            OracleKind::OutputContains("heap-buffer-overflow".to_string())
        );
        assert!("telepathy".parse::<OracleKind>().is_err());
    }

    #[test]
    fn test_built_oracle_is_gated() {
        let oracle = OracleKind::Hang
            .build(&grep_subject(), InapplicablePolicy::Passing)
            .unwrap();
        assert_eq!(
            oracle.apply(&record("grep a", b"\nGrep terminated\n", 124)),
            Verdict::Failing
        );
        assert_eq!(oracle.apply(&record("grep a", b"", 124)), Verdict::Undefined);

        let ungated = OracleKind::Hang
            .build(&Subject::new("grep.x", "img"), InapplicablePolicy::Passing)
            .unwrap();
        assert_eq!(ungated.apply(&record("grep a", b"", 124)), Verdict::Failing);
    }

    #[test]
    fn test_classify_keeps_order() {
        let oracle = CrashCodeOracle::hang();
        let pairs = vec![
            ("b".to_string(), record("b", b"", 0)),
            ("a".to_string(), record("a", b"", 124)),
        ];
        assert_eq!(
            classify(pairs, &oracle),
            vec![
                ("b".to_string(), Verdict::Passing),
                ("a".to_string(), Verdict::Failing),
            ]
        );
    }

    #[test]
    fn test_policy_verdicts() {
        assert_eq!(InapplicablePolicy::default().verdict(), Verdict::Passing);
        assert_eq!(InapplicablePolicy::Undefined.verdict(), Verdict::Undefined);
    }
}
