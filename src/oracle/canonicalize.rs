//! Output canonicalization
//!
//! Captured output is normalized before invariant checks by an ordered list
//! of rules. Each rule is guarded by a predicate over the invocation flags
//! and removes decorations the subject is allowed to add (banners, file
//! names, colors, counters). New flags only need a new rule.

use regex::bytes::Regex;
use std::fmt;

use super::flags::{InvocationFlags, BYTE_OFFSETS, LINE_NUMBERS, NULL_NAMES, WITH_FILENAME};
use crate::core::HarnessError;

/// Printed instead of matches when the input looks binary
pub const BINARY_BANNER: &[u8] = b"Binary file (standard input) matches\n";

#[derive(Debug, Clone)]
enum Transform {
    /// Drop every occurrence of a literal
    Remove(Vec<u8>),
    /// Drop every match of a pattern
    Strip(Regex),
}

impl Transform {
    fn apply(&self, data: Vec<u8>) -> Vec<u8> {
        match self {
            Transform::Remove(needle) => remove_all(&data, needle),
            Transform::Strip(re) => re.replace_all(&data, &b""[..]).into_owned(),
        }
    }
}

#[derive(Clone)]
struct Rule {
    name: &'static str,
    applies: fn(&InvocationFlags<'_>) -> bool,
    transforms: Vec<Transform>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("transforms", &self.transforms)
            .finish()
    }
}

/// Ordered, flag-guarded output normalization for one tool
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    rules: Vec<Rule>,
    termination_banner: Option<Vec<u8>>,
    error_prefix: Vec<u8>,
    back_reference_error: Vec<u8>,
}

fn always(_: &InvocationFlags<'_>) -> bool {
    true
}

fn names_with_nul(flags: &InvocationFlags<'_>) -> bool {
    flags.has_any(WITH_FILENAME) && flags.has_any(NULL_NAMES)
}

fn names_with_colon(flags: &InvocationFlags<'_>) -> bool {
    flags.has_any(WITH_FILENAME) && !flags.has_any(NULL_NAMES)
}

fn colored(flags: &InvocationFlags<'_>) -> bool {
    flags.wants_color()
}

fn line_numbered(flags: &InvocationFlags<'_>) -> bool {
    flags.has_any(LINE_NUMBERS)
}

fn byte_offsets(flags: &InvocationFlags<'_>) -> bool {
    flags.has_any(BYTE_OFFSETS)
}

fn counter() -> Result<Transform, HarnessError> {
    Ok(Transform::Strip(Regex::new(r"(?m-u)^ *[0-9]+\t?\x08?[:\-]")?))
}

impl Canonicalizer {
    /// Rules for `tool`; `termination_marker` is the text the runner appends after each run
    pub fn for_tool(tool: &str, termination_marker: Option<&str>) -> Result<Self, HarnessError> {
        let termination_banner =
            termination_marker.map(|marker| format!("\n{}\n", marker).into_bytes());

        let mut banners = vec![Transform::Remove(BINARY_BANNER.to_vec())];
        if let Some(banner) = &termination_banner {
            banners.push(Transform::Remove(banner.clone()));
        }

        let rules = vec![
            Rule {
                name: "banners",
                applies: always,
                transforms: banners,
            },
            Rule {
                name: "nul-terminated file names",
                applies: names_with_nul,
                transforms: vec![Transform::Strip(Regex::new(r"(?m-u)^[^\x00]+\x00")?)],
            },
            Rule {
                name: "file names",
                applies: names_with_colon,
                transforms: vec![Transform::Strip(Regex::new(r"(?m-u)^[^:]+:")?)],
            },
            Rule {
                name: "colors",
                applies: colored,
                transforms: vec![
                    Transform::Strip(Regex::new(r"(?-u)\x1b\[[01]*;[0-9][0-9]m")?),
                    Transform::Strip(Regex::new(r"(?-u)\x1b\[([0-9][0-9])?[Km]")?),
                ],
            },
            Rule {
                name: "line numbers",
                applies: line_numbered,
                transforms: vec![counter()?],
            },
            Rule {
                name: "byte offsets",
                applies: byte_offsets,
                transforms: vec![counter()?],
            },
        ];

        Ok(Self {
            rules,
            termination_banner,
            error_prefix: format!("{}:", tool).into_bytes(),
            back_reference_error: format!("{}: Invalid back reference\n", tool).into_bytes(),
        })
    }

    /// Apply every rule whose guard holds, in order
    pub fn canonicalize(&self, flags: &InvocationFlags<'_>, output: &[u8]) -> Vec<u8> {
        let mut data = output.to_vec();
        for rule in &self.rules {
            if (rule.applies)(flags) {
                for transform in &rule.transforms {
                    data = transform.apply(data);
                }
            }
        }
        data
    }

    /// Names of the rules that fire for `flags`
    pub fn active_rules(&self, flags: &InvocationFlags<'_>) -> Vec<&'static str> {
        self.rules
            .iter()
            .filter(|rule| (rule.applies)(flags))
            .map(|rule| rule.name)
            .collect()
    }

    /// Remove only the termination banner
    pub fn strip_termination(&self, output: &[u8]) -> Vec<u8> {
        match &self.termination_banner {
            Some(banner) => remove_all(output, banner),
            None => output.to_vec(),
        }
    }

    /// Output is an error message of the tool itself (`grep: ...`)
    pub fn is_tool_error(&self, output: &[u8]) -> bool {
        output.starts_with(&self.error_prefix)
    }

    /// Output reports an invalid back reference in the pattern
    pub fn has_back_reference_error(&self, output: &[u8]) -> bool {
        contains(output, &self.back_reference_error)
    }
}

/// Byte-substring search
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// Remove all non-overlapping occurrences of `needle`, scanning left to right
pub fn remove_all(haystack: &[u8], needle: &[u8]) -> Vec<u8> {
    if needle.is_empty() {
        return haystack.to_vec();
    }
    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            i += needle.len();
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    out
}

/// Split on `\n`, `\r\n` and `\r`; no trailing empty line
pub fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'\n' => {
                lines.push(&data[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&data[start..i]);
                i += if data.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < data.len() {
        lines.push(&data[start..]);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grep() -> Canonicalizer {
        Canonicalizer::for_tool("grep", Some("Grep terminated")).unwrap()
    }

    fn canon(line: &str, output: &[u8]) -> Vec<u8> {
        grep().canonicalize(&InvocationFlags::new(line), output)
    }

    #[test]
    fn test_banners_always_removed() {
        let out = canon(
            "grep 'a'",
            b"Binary file (standard input) matches\nabc\n\nGrep terminated\n",
        );
        assert_eq!(out, b"abc\n");
    }

    #[test]
    fn test_file_name_prefix() {
        assert_eq!(canon("grep -H 'a'", b"(standard input):abc\n"), b"abc\n");
        assert_eq!(
            canon("grep -H -Z 'a'", b"(standard input)\x00abc\n"),
            b"abc\n"
        );
        // Without -H the colon is content
        assert_eq!(canon("grep 'a'", b"x:abc\n"), b"x:abc\n");
    }

    #[test]
    fn test_color_sequences() {
        let out = canon(
            "grep --color=always 'b'",
            b"a\x1b[01;31m\x1b[Kb\x1b[m\x1b[Kc\n",
        );
        assert_eq!(out, b"abc\n");
    }

    #[test]
    fn test_line_and_byte_counters() {
        assert_eq!(canon("grep -n 'a'", b"1:abc\n12-abd\n"), b"abc\nabd\n");
        assert_eq!(canon("grep -b 'a'", b"4:abc\n"), b"abc\n");
        assert_eq!(canon("grep -n -T 'a'", b"   7\t:abc\n"), b"abc\n");
        assert_eq!(canon("grep 'a'", b"1:abc\n"), b"1:abc\n");
    }

    #[test]
    fn test_active_rules_follow_flags() {
        let c = grep();
        let flags = InvocationFlags::new("grep -H -n --color 'a'");
        assert_eq!(
            c.active_rules(&flags),
            vec!["banners", "file names", "colors", "line numbers"]
        );
    }

    #[test]
    fn test_tool_error_detection() {
        let c = grep();
        assert!(c.is_tool_error(b"grep: Unmatched ( or \\(\n"));
        assert!(c.has_back_reference_error(b"grep: Invalid back reference\n"));
        assert!(!c.is_tool_error(b"abc\n"));
    }

    #[test]
    fn test_split_lines() {
        assert_eq!(split_lines(b""), Vec::<&[u8]>::new());
        assert_eq!(split_lines(b"a\nb"), vec![&b"a"[..], &b"b"[..]]);
        assert_eq!(split_lines(b"a\r\nb\rc\n"), vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
        assert_eq!(split_lines(b"\n\n"), vec![&b""[..], &b""[..]]);
    }

    #[test]
    fn test_remove_all() {
        assert_eq!(remove_all(b"aXXbXXXc", b"XX"), b"abXc");
        assert_eq!(remove_all(b"abc", b""), b"abc");
    }
}
