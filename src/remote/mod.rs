//! Environment-side sample runner
//!
//! Runs inside the container: executes every staged `.cli` sample of a
//! directory against the subject build and writes the framed result table
//! to stdout. Logs go to stderr so stdout stays a clean channel.

use regex::Regex;
use std::io::{self, Write};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::core::record::RC_TIMEOUT;
use crate::core::HarnessError;
use crate::runner::protocol::{ResultRow, RowWriter};
use crate::sandbox::exit_code_of;
use crate::subjects::SAMPLE_SUFFIX;

/// Where the benchmark keeps its bug checkouts
pub const DEFAULT_ROOT: &str = "/root/Desktop";

/// Captured output is cut to this many bytes
pub const OUTPUT_CAP: usize = 5000;

/// Safety net for a single sample; the samples carry their own `timeout`
pub const SAMPLE_TIMEOUT: Duration = Duration::from_secs(60);

const TEST_DIR: &str = "alhazen_testdir";
const SCRIPT_NAME: &str = "tmpbash.sh";

/// Tool part of a subject identifier (`grep.3c3bdace` -> `grep`)
pub fn tool_name(identifier: &str) -> &str {
    identifier
        .rfind('.')
        .map_or(identifier, |idx| &identifier[..idx])
}

/// Line printed after every sample, e.g. `Grep terminated`
pub fn termination_text(tool: &str) -> String {
    let mut chars = tool.chars();
    match chars.next() {
        Some(first) => format!("{}{} terminated", first.to_uppercase(), chars.as_str()),
        None => "terminated".to_string(),
    }
}

/// First `<root>/<tool><i>` (i = 1, 2, ...) holding a file named after the identifier
pub fn find_bug_dir(root: &Path, identifier: &str) -> Result<PathBuf, HarnessError> {
    let tool = tool_name(identifier);
    let mut i = 1;
    loop {
        let candidate = root.join(format!("{}{}", tool, i));
        if !candidate.is_dir() {
            return Err(HarnessError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "no bug directory for {} (round {}, looking in {:?})",
                    identifier, i, root
                ),
            )));
        }
        if candidate.join(identifier).exists() {
            return Ok(candidate);
        }
        i += 1;
    }
}

/// Keep crashing samples from writing core files into the scratch directories
pub fn disable_core_dumps() {
    use nix::sys::resource::{setrlimit, Resource};

    if let Err(e) = setrlimit(Resource::RLIMIT_CORE, 0, 0) {
        warn!("Could not disable core dumps: {}", e);
    }
}

#[derive(Debug, Clone)]
pub struct SampleRunner {
    identifier: String,
    banner: String,
    bin_dir: PathBuf,
    sample_timeout: Duration,
    input_pattern: Regex,
}

impl SampleRunner {
    /// Runner for the subject checked out under `root`
    pub fn locate(root: &Path, identifier: &str) -> Result<Self, HarnessError> {
        let bin_dir = find_bug_dir(root, identifier)?
            .join(tool_name(identifier))
            .join("src");
        Self::new(identifier, bin_dir)
    }

    /// Runner putting `bin_dir` first on `PATH`
    pub fn new(identifier: &str, bin_dir: PathBuf) -> Result<Self, HarnessError> {
        Ok(Self {
            identifier: identifier.to_string(),
            banner: termination_text(tool_name(identifier)),
            bin_dir,
            sample_timeout: SAMPLE_TIMEOUT,
            input_pattern: Regex::new(r"^printf '(.*)' \|")?,
        })
    }

    pub fn with_sample_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout = timeout;
        self
    }

    fn script(&self, cli: &str) -> String {
        format!(
            "exec 2>&1\n\
             mkdir {dir}\n\
             pushd {dir} > /dev/null 2>&1\n\
             touch patterns_1.txt patterns_2.txt file.txt test.txt\n\
             export PATH={bin}:$PATH\n\
             {cli}\n\
             res=$?\n\
             printf \"\\n%s\\n\" \"{banner}\"\n\
             popd > /dev/null 2>&1\n\
             rm -r {dir}\n\
             exit $res\n",
            dir = TEST_DIR,
            bin = self.bin_dir.display(),
            cli = cli,
            banner = self.banner,
        )
    }

    /// Run one sample; returns its exit code and merged output
    pub async fn run_sample(&self, cli: &str) -> Result<(i32, Vec<u8>), HarnessError> {
        let scratch = tempfile::Builder::new().prefix("sample-").tempdir()?;
        let script = scratch.path().join(SCRIPT_NAME);
        tokio::fs::write(&script, self.script(cli)).await?;

        let child = Command::new("bash")
            .arg(&script)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                command: format!("bash {}", script.display()),
                source,
            })?;

        match tokio::time::timeout(self.sample_timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                let mut merged = output.stdout;
                merged.extend_from_slice(&output.stderr);
                Ok((return_code(&output.status), merged))
            }
            Err(_) => {
                warn!(
                    "Sample exceeded {}s, reporting {}",
                    self.sample_timeout.as_secs_f32(),
                    RC_TIMEOUT
                );
                Ok((RC_TIMEOUT, Vec::new()))
            }
        }
    }

    /// Bytes a leading `printf '...' |` feeds into the subject
    pub async fn extract_input(&self, cli: &str) -> Option<Vec<u8>> {
        let payload = self.input_pattern.captures(cli)?.get(1)?.as_str();
        let script = format!("printf '{}'\n", payload);

        let result: io::Result<std::process::Output> = async {
            let scratch = tempfile::Builder::new().prefix("payload-").tempdir()?;
            let path = scratch.path().join(SCRIPT_NAME);
            tokio::fs::write(&path, &script).await?;
            let child = Command::new("bash")
                .arg(&path)
                .current_dir(scratch.path())
                .env_clear()
                .env("LANG", "C.UTF-8")
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()?;
            tokio::time::timeout(self.sample_timeout, child.wait_with_output())
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "payload timed out"))?
        }
        .await;

        match result {
            Ok(output) if output.status.success() => {
                let mut merged = output.stdout;
                merged.extend_from_slice(&output.stderr);
                Some(merged)
            }
            Ok(output) => {
                warn!(
                    "Payload extraction exited with {} for {:?}: {}",
                    return_code(&output.status),
                    cli,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Err(e) => {
                warn!("Payload extraction failed for {:?}: {}", cli, e);
                None
            }
        }
    }

    /// Run every sample in `dir` and write one framed row per sample to `out`
    pub async fn run_dir<W: Write>(&self, dir: &Path, out: W) -> Result<usize, HarnessError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == SAMPLE_SUFFIX) {
                files.push(path);
            }
        }
        files.sort();
        info!(
            "Running {} samples from {:?} against {}",
            files.len(),
            dir,
            self.identifier
        );

        let mut writer = RowWriter::new(out).map_err(io::Error::from)?;
        for path in &files {
            let line = String::from_utf8_lossy(&tokio::fs::read(path).await?).into_owned();
            let (return_code, mut output) = self.run_sample(&line).await?;
            output.truncate(OUTPUT_CAP);
            let input = self.extract_input(&line).await;

            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            debug!("{} exited with {}", file, return_code);
            writer
                .write_row(&ResultRow {
                    file,
                    line,
                    subject: self.identifier.clone(),
                    output,
                    oracle: String::new(),
                    return_code,
                    input,
                })
                .map_err(io::Error::from)?;
        }
        Ok(files.len())
    }
}

/// Shell-style exit code, naming the signal when there was one
fn return_code(status: &ExitStatus) -> i32 {
    if let Some(signo) = status.signal() {
        match nix::sys::signal::Signal::try_from(signo) {
            Ok(signal) => debug!("Sample killed by {:?}", signal),
            Err(_) => debug!("Sample killed by signal {}", signo),
        }
    }
    exit_code_of(status)
}
