//! Core module - data model shared by every component
//!
//! - Escaping codec for the ASCII-only sample channel
//! - Subjects, execution records and verdicts
//! - The error taxonomy

pub mod codec;
pub mod error;
pub mod record;
pub mod verdict;

pub use codec::{escape, unescape, unescape_bytes};
pub use error::HarnessError;
pub use record::{ExecutionRecord, Subject};
pub use verdict::Verdict;
