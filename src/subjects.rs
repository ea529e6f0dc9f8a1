//! Subject registry and per-subject capabilities
//!
//! Subjects are plain data loaded from TOML. What differs between subjects
//! (where samples come from, how the environment is prepared, how the
//! remote runner is invoked) sits behind small traits that are injected
//! into the session.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::core::{escape, HarnessError, Subject};
use crate::oracle::OracleKind;
use crate::sandbox::{Environment, ImageRecipe, HELPER_DIR};

const BUILTIN_REGISTRY: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/subjects.toml"));

/// Suffix of sample files, both bundled and staged
pub const SAMPLE_SUFFIX: &str = "cli";

/// Directory (under the user's home) receiving staged samples
pub const SAMPLE_DIR: &str = "alhazen_samples";

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    subject: Vec<SubjectEntry>,
}

/// One `[[subject]]` table
#[derive(Debug, Clone, Deserialize)]
pub struct SubjectEntry {
    pub id: String,
    pub image: String,
    pub oracle: String,
    #[serde(default)]
    pub termination_marker: Option<String>,
    /// Directory of bundled `.cli` samples
    #[serde(default)]
    pub samples: Option<PathBuf>,
    pub recipe: ImageRecipe,
}

impl SubjectEntry {
    pub fn subject(&self) -> Subject {
        let subject = Subject::new(&self.id, &self.image);
        match &self.termination_marker {
            Some(marker) => subject.with_termination_marker(marker),
            None => subject,
        }
    }

    pub fn oracle_kind(&self) -> Result<OracleKind, HarnessError> {
        self.oracle.parse()
    }

    pub fn sample_provider(&self) -> Option<DirectorySamples> {
        self.samples.as_ref().map(DirectorySamples::new)
    }
}

#[derive(Debug, Clone)]
pub struct SubjectRegistry {
    entries: Vec<SubjectEntry>,
}

impl SubjectRegistry {
    /// Registry bundled with the crate
    pub fn builtin() -> Result<Self, HarnessError> {
        Self::from_toml(BUILTIN_REGISTRY)
    }

    /// Built-in registry unless `HARNESS_SUBJECTS` points elsewhere
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        match &config.subjects_file {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()?),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read subject registry {:?}", path))?;
        let registry = Self::from_toml(&text)
            .with_context(|| format!("Failed to load subject registry {:?}", path))?;
        info!("Loaded {} subjects from {:?}", registry.entries.len(), path);
        Ok(registry)
    }

    pub fn from_toml(text: &str) -> Result<Self, HarnessError> {
        let file: RegistryFile =
            toml::from_str(text).map_err(|e| HarnessError::Registry(e.to_string()))?;

        let mut seen = HashSet::new();
        for entry in &file.subject {
            if !seen.insert(entry.id.as_str()) {
                return Err(HarnessError::Registry(format!(
                    "duplicate subject `{}`",
                    entry.id
                )));
            }
            entry.oracle_kind()?;
        }
        Ok(Self {
            entries: file.subject,
        })
    }

    pub fn get(&self, id: &str) -> Option<&SubjectEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }
}

/// Source of initial invocations for a subject
pub trait SampleProvider {
    /// Invocations in escaped form, ready for a batch
    fn sample_inputs(&self) -> Result<Vec<String>, HarnessError>;
}

/// Every `.cli` file of one directory, in file-name order
#[derive(Debug, Clone)]
pub struct DirectorySamples {
    dir: PathBuf,
}

impl DirectorySamples {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn files(&self) -> Result<Vec<PathBuf>, HarnessError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == SAMPLE_SUFFIX) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl SampleProvider for DirectorySamples {
    fn sample_inputs(&self) -> Result<Vec<String>, HarnessError> {
        let files = self.files()?;
        debug!("Reading {} samples from {:?}", files.len(), self.dir);
        files
            .iter()
            .map(|path| -> Result<String, HarnessError> {
                let text = std::fs::read_to_string(path)?;
                Ok(escape(text.trim_end_matches('\n')))
            })
            .collect()
    }
}

/// Subject-specific provisioning of a started environment
#[async_trait]
pub trait ContainerSetup: Send + Sync + fmt::Debug {
    /// Directory inside the environment receiving staged sample files
    fn sample_dir(&self) -> PathBuf;

    /// Runs before every batch; must be idempotent
    async fn prepare(&self, env: &Environment) -> Result<(), HarnessError>;

    /// Remote runner invocation for one batch staged in `staging`
    fn runner_command(&self, subject: &Subject, staging: &Path) -> Vec<String>;
}

/// The remote runner binary is provisioned as a helper and cleans up after itself
#[derive(Debug, Clone)]
pub struct RunnerSetup {
    user: String,
    runner_name: String,
}

impl RunnerSetup {
    pub fn new(user: impl Into<String>, runner_binary: &Path) -> Self {
        let runner_name = runner_binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sample-runner".to_string());
        Self {
            user: user.into(),
            runner_name,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

#[async_trait]
impl ContainerSetup for RunnerSetup {
    fn sample_dir(&self) -> PathBuf {
        Environment::home_dir(&self.user).join(SAMPLE_DIR)
    }

    async fn prepare(&self, env: &Environment) -> Result<(), HarnessError> {
        env.mkdir(&self.sample_dir()).await
    }

    fn runner_command(&self, subject: &Subject, staging: &Path) -> Vec<String> {
        let runner = Environment::home_dir(&self.user)
            .join(HELPER_DIR)
            .join(&self.runner_name);
        vec![
            runner.to_string_lossy().into_owned(),
            subject.id.clone(),
            staging.to_string_lossy().into_owned(),
            "rm".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = SubjectRegistry::builtin().unwrap();
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(
            ids,
            vec![
                "grep.3c3bdace",
                "grep.3220317a",
                "grep.5fa8c7c9",
                "grep.7aa698d3",
                "grep.c96b0f2c"
            ]
        );

        let hang = registry.get("grep.5fa8c7c9").unwrap();
        assert_eq!(hang.oracle_kind().unwrap(), OracleKind::Hang);
        let subject = hang.subject();
        assert_eq!(subject.image_ref, "alhazen_grep.5fa8c7c9");
        assert_eq!(subject.termination_marker.as_deref(), Some("Grep terminated"));
        assert!(matches!(hang.recipe, ImageRecipe::Dbgbench { .. }));

        assert_eq!(
            registry.get("grep.c96b0f2c").unwrap().oracle_kind().unwrap(),
            OracleKind::NoNewText
        );
        assert!(registry.get("find.07b941b1").is_none());
    }

    #[test]
    fn test_registry_validation() {
        let entry = r#"
[[subject]]
id = "grep.x"
image = "img"
oracle = "ORACLE"
recipe = { kind = "dockerfile", context = "." }
"#;
        let unknown = entry.replace("ORACLE", "telepathy");
        assert!(matches!(
            SubjectRegistry::from_toml(&unknown),
            Err(HarnessError::Registry(_))
        ));

        let twice = format!("{}{}", entry, entry).replace("ORACLE", "segv");
        assert!(SubjectRegistry::from_toml(&twice).is_err());

        let ok = SubjectRegistry::from_toml(&entry.replace("ORACLE", "output_contains:boom")).unwrap();
        assert!(ok.get("grep.x").unwrap().subject().termination_marker.is_none());
    }

    #[test]
    fn test_directory_samples_are_sorted_and_escaped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.cli"), "printf 'ä' | grep 'a'\n").unwrap();
        std::fs::write(dir.path().join("a.cli"), "printf 'x' | grep 'x'").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let inputs = DirectorySamples::new(dir.path()).sample_inputs().unwrap();
        assert_eq!(
            inputs,
            vec![
                "printf 'x' | grep 'x'".to_string(),
                "printf '\\xC3\\xA4' | grep 'a'".to_string(),
            ]
        );
    }

    #[test]
    fn test_bundled_grep_samples() {
        let registry = SubjectRegistry::builtin().unwrap();
        let provider = registry.get("grep.5fa8c7c9").unwrap().sample_provider().unwrap();
        let inputs = provider.sample_inputs().unwrap();
        assert_eq!(inputs.len(), 2);
        assert!(inputs.contains(&"printf 'X' | timeout 0.5s grep -E -q '(^| )*( |$)'".to_string()));
    }

    #[test]
    fn test_runner_command() {
        let setup = RunnerSetup::new("root", Path::new("/opt/harness/sample-runner"));
        let subject = Subject::new("grep.3c3bdace", "img");
        assert_eq!(setup.sample_dir(), PathBuf::from("/root/Desktop/alhazen_samples"));
        assert_eq!(
            setup.runner_command(&subject, &setup.sample_dir()),
            vec![
                "/root/Desktop/alhazen_scripts/sample-runner",
                "grep.3c3bdace",
                "/root/Desktop/alhazen_samples",
                "rm"
            ]
        );
    }
}
