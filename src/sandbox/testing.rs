//! In-memory stand-in for the container CLI used by unit tests
//!
//! Files copied into a "container" land in a host temp directory that
//! mirrors the container filesystem.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use super::cli::ContainerCli;
use super::executor::{CommandExecutor, CommandOutput, CommandSpec};
use crate::core::HarnessError;

type ExecHandler = Box<dyn Fn(&[String], &Path) -> CommandOutput + Send + Sync>;

#[derive(Default)]
struct FakeState {
    calls: Vec<Vec<String>>,
    images: HashSet<String>,
    failures: VecDeque<(String, i32, String)>,
    stalls: VecDeque<String>,
}

pub struct FakeDocker {
    mirror: TempDir,
    state: Mutex<FakeState>,
    handler: Mutex<Option<ExecHandler>>,
}

impl FakeDocker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            mirror: tempfile::tempdir().unwrap(),
            state: Mutex::new(FakeState::default()),
            handler: Mutex::new(None),
        })
    }

    pub fn cli(self: &Arc<Self>) -> ContainerCli {
        ContainerCli::new("docker", self.clone(), Duration::from_secs(30))
    }

    /// Host location of a path inside the fake container
    pub fn mirror_path(&self, inside: &str) -> PathBuf {
        self.mirror.path().join(inside.trim_start_matches('/'))
    }

    /// Make the next call of `subcommand` exit with `code`
    pub fn fail_next(&self, subcommand: &str, code: i32, message: &str) {
        self.state.lock().unwrap().failures.push_back((
            subcommand.to_string(),
            code,
            message.to_string(),
        ));
    }

    /// Make the next call mentioning `needle` run into its timeout
    pub fn stall_next(&self, needle: &str) {
        self.state.lock().unwrap().stalls.push_back(needle.to_string());
    }

    fn stalled(&self, spec: &CommandSpec) -> Option<HarnessError> {
        let argv = spec.to_vec();
        let mut state = self.state.lock().unwrap();
        let pos = state
            .stalls
            .iter()
            .position(|needle| argv.iter().any(|arg| arg.ends_with(needle.as_str())))?;
        state.stalls.remove(pos);
        state.calls.push(argv.clone());
        Some(HarnessError::Timeout {
            command: argv.join(" "),
            after: spec.timeout.unwrap_or_default(),
        })
    }

    /// Answer `docker exec` commands not handled by the fake itself
    pub fn on_exec(&self, handler: impl Fn(&[String], &Path) -> CommandOutput + Send + Sync + 'static) {
        *self.handler.lock().unwrap() = Some(Box::new(handler));
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of calls of one container CLI subcommand
    pub fn count(&self, subcommand: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.get(1).map(String::as_str) == Some(subcommand))
            .count()
    }

    fn handle(&self, spec: &CommandSpec) -> CommandOutput {
        let argv = spec.to_vec();
        let mut state = self.state.lock().unwrap();
        state.calls.push(argv.clone());

        let sub = spec.args.first().cloned().unwrap_or_default();
        if let Some(pos) = state.failures.iter().position(|(s, _, _)| *s == sub) {
            if let Some((_, code, message)) = state.failures.remove(pos) {
                return CommandOutput::failure(code, message);
            }
        }

        let args = &spec.args;
        match sub.as_str() {
            "images" => {
                let tag = args.last().cloned().unwrap_or_default();
                if state.images.contains(&tag) {
                    CommandOutput::success("0123456789ab\n")
                } else {
                    CommandOutput::success("")
                }
            }
            "build" | "commit" => {
                // `build -t <tag> .` and `commit <container> <tag>`
                let tag = args.get(2).cloned().unwrap_or_default();
                state.images.insert(tag);
                CommandOutput::success("")
            }
            "cp" => {
                drop(state);
                self.copy(&args[1], &args[2])
            }
            "exec" => {
                drop(state);
                self.exec(&args[1..])
            }
            _ => CommandOutput::success(""),
        }
    }

    fn copy(&self, source: &str, target: &str) -> CommandOutput {
        let dest = match target.split_once(':') {
            Some((_, path)) => self.mirror_path(path),
            None => return CommandOutput::failure(1, "bad copy target"),
        };
        let source = Path::new(source);
        let name = source.file_name().unwrap_or_default();
        std::fs::create_dir_all(&dest).unwrap();
        copy_recursive(source, &dest.join(name));
        CommandOutput::success("")
    }

    fn exec(&self, args: &[String]) -> CommandOutput {
        // Skip `-u user` / `-w dir` options and the container name
        let mut i = 0;
        while i < args.len() && args[i].starts_with('-') {
            i += 2;
        }
        let cmd = &args[(i + 1).min(args.len())..];
        match cmd.first().map(String::as_str) {
            Some("mkdir") => {
                if let Some(dir) = cmd.last() {
                    std::fs::create_dir_all(self.mirror_path(dir)).unwrap();
                }
                CommandOutput::success("")
            }
            Some("chown") => CommandOutput::success(""),
            _ => match self.handler.lock().unwrap().as_ref() {
                Some(handler) => handler(cmd, self.mirror.path()),
                None => CommandOutput::success(""),
            },
        }
    }
}

fn copy_recursive(source: &Path, dest: &Path) {
    if source.is_dir() {
        std::fs::create_dir_all(dest).unwrap();
        for entry in std::fs::read_dir(source).unwrap() {
            let entry = entry.unwrap();
            copy_recursive(&entry.path(), &dest.join(entry.file_name()));
        }
    } else {
        std::fs::copy(source, dest).unwrap();
    }
}

#[async_trait]
impl CommandExecutor for FakeDocker {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, HarnessError> {
        if let Some(err) = self.stalled(spec) {
            return Err(err);
        }
        Ok(self.handle(spec))
    }

    fn run_blocking(&self, spec: &CommandSpec) -> Result<CommandOutput, HarnessError> {
        Ok(self.handle(spec))
    }
}
