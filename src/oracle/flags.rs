//! Command-line flag detection over invocation text
//!
//! Invocations are tokenized on single spaces, the same way the candidate
//! generator joins them. Quoted patterns stay split, which is fine: only
//! option tokens are ever looked up.

/// Options that replace matched lines with counts, names or nothing
pub const SUPPRESS_OUTPUT: &[&str] = &[
    "-c",
    "--count",
    "-L",
    "--files-without-match",
    "-l",
    "--files-with-matches",
    "-q",
    "--quiet",
    "--silent",
];

/// Options that print only part of a line
pub const PARTIAL_LINES: &[&str] = &["-L", "-l", "-o", "--only-matching"];

/// Options that prefix each line with a file name
pub const WITH_FILENAME: &[&str] = &["-H", "--with-filename"];

/// Options that terminate file names with NUL instead of `:`
pub const NULL_NAMES: &[&str] = &["--null", "-Z"];

/// Options that prefix each line with a line counter
pub const LINE_NUMBERS: &[&str] = &["-n", "--line-number", "-T", "--null", "-Z"];

/// Options that prefix each line with a byte offset
pub const BYTE_OFFSETS: &[&str] = &["--byte-offset", "-b", "-u", "--unix-byte-offsets"];

/// Options that switch the line terminator to NUL
pub const NULL_DATA: &[&str] = &["-z", "--null-data"];

/// Tokenized view of one invocation
#[derive(Debug, Clone)]
pub struct InvocationFlags<'a> {
    line: &'a str,
    tokens: Vec<&'a str>,
}

impl<'a> InvocationFlags<'a> {
    pub fn new(line: &'a str) -> Self {
        Self {
            line,
            tokens: line.split(' ').collect(),
        }
    }

    /// Exact token match
    pub fn has(&self, option: &str) -> bool {
        self.tokens.iter().any(|t| *t == option)
    }

    pub fn has_any(&self, options: &[&str]) -> bool {
        options.iter().any(|opt| self.has(opt))
    }

    /// Some token starts with `prefix` (options given with `=value`)
    pub fn has_prefixed(&self, prefix: &str) -> bool {
        self.tokens.iter().any(|t| t.starts_with(prefix))
    }

    /// Substring anywhere in the line
    pub fn mentions(&self, needle: &str) -> bool {
        self.line.contains(needle)
    }

    /// Color output requested in any spelling
    pub fn wants_color(&self) -> bool {
        self.mentions("--color") || self.mentions("--colour")
    }

    /// `--label=...` renames standard input in the output
    pub fn overrides_label(&self) -> bool {
        self.has_prefixed("--label=") || self.has_prefixed("'--label=")
    }

    /// Values following any of `options`
    pub fn args_to(&self, options: &[&str]) -> Vec<&'a str> {
        options
            .iter()
            .filter_map(|opt| {
                let idx = self.tokens.iter().position(|t| t == opt)?;
                self.tokens.get(idx + 1).copied()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_matching_is_exact() {
        let flags = InvocationFlags::new("printf 'a-c' | timeout 0.5s grep -c 'a'");
        assert!(flags.has("-c"));
        assert!(flags.has_any(SUPPRESS_OUTPUT));
        assert!(!flags.has("-o"));
        assert!(!flags.has("a-c"));
    }

    #[test]
    fn test_label_and_color() {
        let flags = InvocationFlags::new("grep '--label=foo' -H --colour=always 'x'");
        assert!(flags.overrides_label());
        assert!(flags.wants_color());
        assert!(flags.has_any(WITH_FILENAME));

        let flags = InvocationFlags::new("grep --label=foo 'x'");
        assert!(flags.overrides_label());
        assert!(!flags.wants_color());
    }

    #[test]
    fn test_args_to() {
        let flags = InvocationFlags::new("grep -e 'a' -f patterns_1.txt");
        assert_eq!(flags.args_to(&["-f", "-e"]), vec!["patterns_1.txt", "'a'"]);
    }
}
