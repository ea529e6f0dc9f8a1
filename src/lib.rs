//! Differential-oracle execution harness
//!
//! Runs candidate invocations of a buggy command-line utility inside a
//! disposable container, collects one execution record per invocation and
//! labels each record with a ternary verdict.
//!
//! - `sandbox`: host commands and the container environment lifecycle
//! - `runner`: batched execution and the framed result protocol
//! - `remote`: the sample runner that executes inside the environment
//! - `oracle`: verdicts over execution records
//! - `subjects` / `session`: per-subject wiring

pub mod config;
pub mod core;
pub mod oracle;
pub mod remote;
pub mod runner;
pub mod sandbox;
pub mod session;
pub mod subjects;

pub use crate::config::HarnessConfig;
pub use crate::core::{escape, unescape, ExecutionRecord, HarnessError, Subject, Verdict};
pub use crate::oracle::{classify, InapplicablePolicy, Oracle, OracleKind};
pub use crate::runner::BatchRunner;
pub use crate::session::SubjectSession;
pub use crate::subjects::{SampleProvider, SubjectRegistry};
