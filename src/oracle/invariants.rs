//! Output-shape invariants
//!
//! These oracles relate the canonicalized output to the input that was piped
//! into the subject. They only apply to plain line-printing runs; every
//! other configuration short-circuits to the inapplicable verdict.

use std::collections::HashSet;

use super::canonicalize::{split_lines, Canonicalizer};
use super::flags::{InvocationFlags, NULL_DATA, PARTIAL_LINES, SUPPRESS_OUTPUT};
use super::{InapplicablePolicy, Oracle};
use crate::core::{ExecutionRecord, Verdict};

/// Canonicalized output, or the verdict to return instead
fn applicable_output(
    record: &ExecutionRecord,
    canonicalizer: &Canonicalizer,
    policy: InapplicablePolicy,
    extra_exclusions: &[&str],
) -> Result<(Vec<u8>, Vec<u8>), Verdict> {
    let output = record
        .captured_output
        .as_deref()
        .ok_or(policy.verdict())?;
    let flags = InvocationFlags::new(&record.invocation_text);

    if flags.has_any(SUPPRESS_OUTPUT) || flags.has_any(extra_exclusions) {
        return Err(policy.verdict());
    }
    if !matches!(record.return_code, 0 | 1) {
        return Err(policy.verdict());
    }
    // The label replaces the file name, so the prefix rules no longer match
    if flags.overrides_label() {
        return Err(Verdict::Passing);
    }
    let input = record
        .extracted_input
        .clone()
        .ok_or(policy.verdict())?;

    let canonical = canonicalizer.canonicalize(&flags, output);
    if canonicalizer.has_back_reference_error(&canonical) {
        return Err(Verdict::Passing);
    }
    Ok((canonical, input))
}

/// Output without its final byte (the trailing terminator)
fn body(output: &[u8]) -> &[u8] {
    &output[..output.len().saturating_sub(1)]
}

/// Every output byte must occur somewhere in the input
#[derive(Debug, Clone)]
pub struct CharacterSubset {
    canonicalizer: Canonicalizer,
    policy: InapplicablePolicy,
}

impl CharacterSubset {
    pub fn new(canonicalizer: Canonicalizer, policy: InapplicablePolicy) -> Self {
        Self {
            canonicalizer,
            policy,
        }
    }
}

impl Oracle for CharacterSubset {
    fn apply(&self, record: &ExecutionRecord) -> Verdict {
        let (output, input) = match applicable_output(record, &self.canonicalizer, self.policy, &[])
        {
            Ok(pair) => pair,
            Err(verdict) => return verdict,
        };

        let mut seen = [false; 256];
        for b in &input {
            seen[*b as usize] = true;
        }
        if body(&output).iter().all(|b| seen[*b as usize]) {
            Verdict::Passing
        } else {
            Verdict::Failing
        }
    }
}

/// Every output line must be a line of the input
#[derive(Debug, Clone)]
pub struct LineSubset {
    canonicalizer: Canonicalizer,
    policy: InapplicablePolicy,
}

impl LineSubset {
    pub fn new(canonicalizer: Canonicalizer, policy: InapplicablePolicy) -> Self {
        Self {
            canonicalizer,
            policy,
        }
    }
}

impl Oracle for LineSubset {
    fn apply(&self, record: &ExecutionRecord) -> Verdict {
        let (output, input) =
            match applicable_output(record, &self.canonicalizer, self.policy, PARTIAL_LINES) {
                Ok(pair) => pair,
                Err(verdict) => return verdict,
            };

        let input_lines: HashSet<&[u8]> = split_lines(&input).into_iter().collect();
        if split_lines(body(&output))
            .iter()
            .all(|line| input_lines.contains(line))
        {
            Verdict::Passing
        } else {
            Verdict::Failing
        }
    }
}

/// Non-empty output must end with the line terminator
///
/// The terminator is NUL under `-z`, newline otherwise. Error messages of
/// the tool itself are exempt.
#[derive(Debug, Clone)]
pub struct TrailingTerminator {
    canonicalizer: Canonicalizer,
}

impl TrailingTerminator {
    pub fn new(canonicalizer: Canonicalizer) -> Self {
        Self { canonicalizer }
    }
}

impl Oracle for TrailingTerminator {
    fn apply(&self, record: &ExecutionRecord) -> Verdict {
        let flags = InvocationFlags::new(&record.invocation_text);
        let terminator = if flags.has_any(NULL_DATA) { b'\0' } else { b'\n' };

        let output = self.canonicalizer.strip_termination(record.output());
        if self.canonicalizer.is_tool_error(&output) {
            return Verdict::Passing;
        }
        match output.last() {
            Some(last) if *last != terminator => Verdict::Failing,
            _ => Verdict::Passing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::{record, record_with_input};

    fn canonicalizer() -> Canonicalizer {
        Canonicalizer::for_tool("grep", Some("Grep terminated")).unwrap()
    }

    fn chars(policy: InapplicablePolicy) -> CharacterSubset {
        CharacterSubset::new(canonicalizer(), policy)
    }

    fn lines() -> LineSubset {
        LineSubset::new(canonicalizer(), InapplicablePolicy::Passing)
    }

    #[test]
    fn test_character_subset_detects_new_bytes() {
        let oracle = chars(InapplicablePolicy::Passing);
        let ok = record_with_input(
            "printf 'abc\\n' | grep -H 'b'",
            b"abc\n",
            b"(standard input):abc\n\nGrep terminated\n",
            0,
        );
        assert_eq!(oracle.apply(&ok), Verdict::Passing);

        let bad = record_with_input("printf 'abc\\n' | grep 'b'", b"abc\n", b"abz\n", 0);
        assert_eq!(oracle.apply(&bad), Verdict::Failing);
    }

    #[test]
    fn test_character_subset_ignores_final_byte() {
        // No newline in the input, but the output terminator is exempt
        let oracle = chars(InapplicablePolicy::Passing);
        let rec = record_with_input("printf 'abc' | grep 'b'", b"abc", b"abc\n", 0);
        assert_eq!(oracle.apply(&rec), Verdict::Passing);
    }

    #[test]
    fn test_character_subset_short_circuits() {
        for policy in [InapplicablePolicy::Passing, InapplicablePolicy::Undefined] {
            let oracle = chars(policy);
            let expected = policy.verdict();

            let count = record_with_input("printf 'a' | grep -c 'a'", b"a", b"1\n", 0);
            assert_eq!(oracle.apply(&count), expected);

            let crashed = record_with_input("printf 'a' | grep 'a'", b"a", b"zzz\n", 2);
            assert_eq!(oracle.apply(&crashed), expected);

            let no_input = record("grep 'a' file.txt", b"zzz\n", 0);
            assert_eq!(oracle.apply(&no_input), expected);

            let mut no_output = record_with_input("printf 'a' | grep 'a'", b"a", b"", 0);
            no_output.captured_output = None;
            assert_eq!(oracle.apply(&no_output), expected);

            // Label override and a rejected back reference pass regardless of policy
            let label = record_with_input("printf 'a' | grep --label=zz -H 'a'", b"a", b"zz:a\n", 0);
            assert_eq!(oracle.apply(&label), Verdict::Passing);

            let backref = record_with_input(
                "printf 'a' | grep '\\1'",
                b"a",
                b"grep: Invalid back reference\n",
                1,
            );
            assert_eq!(oracle.apply(&backref), Verdict::Passing);
        }
    }

    #[test]
    fn test_line_subset() {
        let oracle = lines();
        let ok = record_with_input(
            "printf 'one\\ntwo\\n' | grep -n 'o'",
            b"one\ntwo\n",
            b"1:one\n2:two\n",
            0,
        );
        assert_eq!(oracle.apply(&ok), Verdict::Passing);

        let merged = record_with_input(
            "printf 'one\\ntwo\\n' | grep 'o'",
            b"one\ntwo\n",
            b"onetwo\n",
            0,
        );
        assert_eq!(oracle.apply(&merged), Verdict::Failing);

        // Partial-line output is excluded
        let only = record_with_input("printf 'one\\n' | grep -o 'n'", b"one\n", b"n\n", 0);
        assert_eq!(oracle.apply(&only), Verdict::Passing);
    }

    #[test]
    fn test_line_subset_universal_newlines() {
        let oracle = lines();
        let rec = record_with_input(
            "printf 'a\\r\\nb\\n' | grep '.'",
            b"a\r\nb\n",
            b"a\rb\n",
            0,
        );
        assert_eq!(oracle.apply(&rec), Verdict::Passing);
    }

    #[test]
    fn test_trailing_terminator() {
        let oracle = TrailingTerminator::new(canonicalizer());
        assert_eq!(
            oracle.apply(&record("grep 'a'", b"a\n\nGrep terminated\n", 0)),
            Verdict::Passing
        );
        // Banner glued to the output: the subject dropped its final newline
        assert_eq!(
            oracle.apply(&record("grep 'a'", b"a\nGrep terminated\n", 0)),
            Verdict::Failing
        );
        assert_eq!(
            oracle.apply(&record("grep 'a'", b"a\nab\nGrep terminated\n", 0)),
            Verdict::Failing
        );
        assert_eq!(oracle.apply(&record("grep 'a'", b"", 1)), Verdict::Passing);
        assert_eq!(
            oracle.apply(&record("grep 'a'", b"grep: warning", 2)),
            Verdict::Passing
        );
    }

    #[test]
    fn test_trailing_terminator_null_data() {
        let oracle = TrailingTerminator::new(canonicalizer());
        assert_eq!(oracle.apply(&record("grep -z 'a'", b"a\x00", 0)), Verdict::Passing);
        assert_eq!(oracle.apply(&record("grep -z 'a'", b"a\n", 0)), Verdict::Failing);
    }
}
