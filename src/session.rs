//! One subject, one environment, one oracle
//!
//! A `SubjectSession` is what callers drive: it creates the environment on
//! first use, pushes batches through the `BatchRunner` and classifies the
//! resulting records with the subject's oracle.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::HarnessConfig;
use crate::core::{ExecutionRecord, HarnessError, Subject, Verdict};
use crate::oracle::{classify, Oracle};
use crate::runner::BatchRunner;
use crate::sandbox::{CommandExecutor, ContainerCli, Environment, EnvironmentLimits, ImageRecipe};
use crate::subjects::{RunnerSetup, SubjectEntry};

#[derive(Debug)]
pub struct SubjectSession {
    subject: Subject,
    recipe: ImageRecipe,
    helpers: Vec<PathBuf>,
    cli: ContainerCli,
    limits: EnvironmentLimits,
    runner: BatchRunner,
    oracle: Box<dyn Oracle>,
    environment: Option<Environment>,
}

impl SubjectSession {
    pub fn new(
        entry: &SubjectEntry,
        config: &HarnessConfig,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self, HarnessError> {
        let subject = entry.subject();
        let oracle = entry.oracle_kind()?.build(&subject, config.inapplicable)?;
        let setup = RunnerSetup::new(&config.user, &config.runner_binary);

        Ok(Self {
            subject,
            recipe: entry.recipe.clone(),
            helpers: vec![config.runner_binary.clone()],
            cli: ContainerCli::new(&config.docker, executor, config.command_timeout),
            limits: EnvironmentLimits {
                command: config.command_timeout,
                build: config.build_timeout,
            },
            runner: BatchRunner::new(Arc::new(setup), config),
            oracle,
            environment: None,
        })
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn oracle(&self) -> &dyn Oracle {
        self.oracle.as_ref()
    }

    /// The environment, once the first batch created it
    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    /// Execute a batch and return the raw records
    pub async fn execute(
        &mut self,
        invocations: &[String],
    ) -> Result<Vec<(String, ExecutionRecord)>, HarnessError> {
        if invocations.is_empty() {
            return Ok(Vec::new());
        }
        let env = self.environment.get_or_insert_with(|| {
            Environment::new(
                &self.subject,
                self.recipe.clone(),
                self.helpers.clone(),
                self.cli.clone(),
                self.limits.clone(),
            )
        });
        self.runner.execute(env, &self.subject, invocations).await
    }

    /// Execute a batch and classify every record
    pub async fn run(&mut self, invocations: &[String]) -> Result<Vec<(String, Verdict)>, HarnessError> {
        let pairs = self.execute(invocations).await?;
        let verdicts = classify(pairs, self.oracle.as_ref());
        let failing = verdicts.iter().filter(|(_, v)| v.is_failing()).count();
        info!(
            "{}: {} of {} invocations failing",
            self.subject.id,
            failing,
            verdicts.len()
        );
        Ok(verdicts)
    }

    /// Stop and remove the environment; calling it again is a no-op
    pub async fn tear_down(&mut self) -> Result<(), HarnessError> {
        if let Some(env) = self.environment.as_mut() {
            info!("Tearing down environment {}", env.name());
            env.stop().await?;
        }
        self.environment = None;
        Ok(())
    }
}
