//! Corpus preparation before verification.
//!
//! Compiling the reference bitcode and running the IR generator are done by
//! external tools. Either step may fail without stopping the harness:
//! verification then runs on whatever the cache already contains, and the
//! failure is recorded in the suite report.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{CorpusCommands, RunConfig};
use crate::invoker::{Invocation, ToolInvoker, LAUNCH_FAILURE_CODE};
use crate::obs;
use crate::suite::SuiteDescriptor;

/// A corpus preparation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusStep {
    /// Compile the reference bitcode.
    Compile,
    /// Regenerate textual IR from the bitcode.
    Regenerate,
}

impl fmt::Display for CorpusStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compile => "compile",
            Self::Regenerate => "regenerate",
        })
    }
}

/// What happened while preparing a suite's corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CorpusStatus {
    /// No preparation configured.
    Skipped,
    /// Every configured step exited with 0.
    Prepared,
    /// A step failed; later steps were not run.
    Failed { step: CorpusStep, exit_code: i32 },
}

impl CorpusStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Builds the corpus a suite is verified against.
#[async_trait]
pub trait CorpusBuilder: Send + Sync {
    async fn prepare(
        &self,
        suite: &str,
        descriptor: &SuiteDescriptor,
        cache_dir: &Path,
    ) -> CorpusStatus;
}

/// Leaves the cache untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExistingCorpus;

#[async_trait]
impl CorpusBuilder for ExistingCorpus {
    async fn prepare(&self, _: &str, _: &SuiteDescriptor, _: &Path) -> CorpusStatus {
        CorpusStatus::Skipped
    }
}

/// Runs the configured compile/regenerate command templates.
#[derive(Debug, Clone)]
pub struct CommandCorpusBuilder {
    commands: CorpusCommands,
    invoker: ToolInvoker,
}

impl CommandCorpusBuilder {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            commands: config.corpus.clone(),
            invoker: ToolInvoker::new(config),
        }
    }

    /// Substitute the suite placeholders in a command template.
    pub fn expand(
        template: &[String],
        suite: &str,
        descriptor: &SuiteDescriptor,
        cache_dir: &Path,
    ) -> Vec<String> {
        let cache_dir = cache_dir.to_string_lossy();
        template
            .iter()
            .map(|part| {
                part.replace("{suite}", suite)
                    .replace("{target}", &descriptor.compile_target)
                    .replace("{generator}", &descriptor.generator_id)
                    .replace("{cache_dir}", &cache_dir)
            })
            .collect()
    }

    async fn run_step(
        &self,
        step: CorpusStep,
        template: &[String],
        suite: &str,
        descriptor: &SuiteDescriptor,
        cache_dir: &Path,
    ) -> i32 {
        let argv = Self::expand(template, suite, descriptor, cache_dir);
        let invocation = match Invocation::from_argv(argv) {
            Ok(inv) => inv
                .non_fatal()
                .describe(format!("Cannot {step} corpus of suite {suite}")),
            Err(_) => return LAUNCH_FAILURE_CODE,
        };
        info!(suite, step = %step, command = %invocation.command_line(), "Preparing corpus");
        self.invoker
            .run(&invocation)
            .await
            .unwrap_or(LAUNCH_FAILURE_CODE)
    }
}

#[async_trait]
impl CorpusBuilder for CommandCorpusBuilder {
    async fn prepare(
        &self,
        suite: &str,
        descriptor: &SuiteDescriptor,
        cache_dir: &Path,
    ) -> CorpusStatus {
        if self.commands.is_empty() {
            return CorpusStatus::Skipped;
        }

        let steps = [
            (CorpusStep::Compile, &self.commands.compile),
            (CorpusStep::Regenerate, &self.commands.regenerate),
        ];
        for (step, template) in steps {
            let Some(template) = template else { continue };
            let exit_code = self
                .run_step(step, template, suite, descriptor, cache_dir)
                .await;
            if exit_code != 0 {
                warn!(
                    suite,
                    step = %step,
                    exit_code,
                    "Corpus preparation failed; verifying existing artifacts"
                );
                obs::emit_corpus_failed(suite, step, exit_code);
                return CorpusStatus::Failed { step, exit_code };
            }
        }
        CorpusStatus::Prepared
    }
}
