//! Sequential verification of several suites.

use std::io::Write;
use std::time::Instant;

use tracing::{info, Instrument};
use uuid::Uuid;

use crate::assembler::Assembler;
use crate::config::RunConfig;
use crate::corpus::CorpusBuilder;
use crate::error::HarnessResult;
use crate::interpreter::Interpreter;
use crate::obs;
use crate::report::{BatchReport, SuiteReport, SuiteVerdict};
use crate::suite::SuiteDescriptor;
use crate::toolchain::ToolchainGeneration;
use crate::verifier::{CancelFlag, ProgressSink, RoundTripVerifier};

/// Receives the summary of every finished suite.
pub trait SummarySink {
    fn suite_finished(&mut self, suite: &str, verdict: &SuiteVerdict);
}

/// Prints passing summaries to `out` and failing ones to `err`.
pub struct ConsoleSummary<O: Write, E: Write> {
    out: O,
    err: E,
}

impl<O: Write, E: Write> ConsoleSummary<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self { out, err }
    }

    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }
}

impl ConsoleSummary<std::io::Stdout, std::io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdout(), std::io::stderr())
    }
}

impl<O: Write, E: Write> SummarySink for ConsoleSummary<O, E> {
    fn suite_finished(&mut self, _suite: &str, verdict: &SuiteVerdict) {
        let stream: &mut dyn Write = if verdict.is_success() {
            &mut self.out
        } else {
            &mut self.err
        };
        for line in verdict.render_lines() {
            let _ = writeln!(stream, "{line}");
        }
        let _ = stream.flush();
    }
}

/// Result of a batch.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub run_id: String,

    /// Every requested suite ran and passed.
    pub success: bool,

    /// Stopped early by cancellation.
    pub cancelled: bool,

    pub suites: Vec<SuiteReport>,
    pub duration_ms: u64,
}

impl BatchResult {
    pub fn passed_count(&self) -> usize {
        self.suites.iter().filter(|s| s.verdict.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.suites.len() - self.passed_count()
    }

    /// Process exit status: 0 when every suite passed, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }

    pub fn to_report(&self, generation: ToolchainGeneration) -> BatchReport {
        BatchReport {
            run_id: self.run_id.clone(),
            generation: generation.label().to_string(),
            generated_at: chrono::Utc::now(),
            success: self.success,
            suites: self.suites.clone(),
            duration_ms: self.duration_ms,
        }
    }
}

/// Runs suites one after another, continuing past failing suites.
pub struct BatchRunner<'a> {
    generation: ToolchainGeneration,
    config: &'a RunConfig,
    corpus: &'a dyn CorpusBuilder,
    assembler: &'a dyn Assembler,
    interpreter: &'a dyn Interpreter,
    cancel: CancelFlag,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        generation: ToolchainGeneration,
        config: &'a RunConfig,
        corpus: &'a dyn CorpusBuilder,
        assembler: &'a dyn Assembler,
        interpreter: &'a dyn Interpreter,
    ) -> Self {
        Self {
            generation,
            config,
            corpus,
            assembler,
            interpreter,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Prepare and verify every suite in order.
    ///
    /// A failing suite never stops the batch; only an assembler that cannot
    /// run at all does, since that is a broken environment rather than a
    /// test result.
    pub async fn run(
        &self,
        suites: &[(String, SuiteDescriptor)],
        progress: &mut dyn ProgressSink,
        summary: &mut dyn SummarySink,
    ) -> HarnessResult<BatchResult> {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id, self.generation.label());
        self.run_suites(run_id, suites, progress, summary)
            .instrument(span)
            .await
    }

    async fn run_suites(
        &self,
        run_id: String,
        suites: &[(String, SuiteDescriptor)],
        progress: &mut dyn ProgressSink,
        summary: &mut dyn SummarySink,
    ) -> HarnessResult<BatchResult> {
        let start = Instant::now();
        info!(run_id = %run_id, suites = suites.len(), "Starting round-trip batch");

        let verifier =
            RoundTripVerifier::new(self.assembler, self.interpreter).with_cancel(self.cancel.clone());

        let mut reports = Vec::new();
        let mut all_passed = true;
        let mut cancelled = false;

        for (name, descriptor) in suites {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let suite_start = Instant::now();
            let cache_dir = self.config.suite_cache_dir(&descriptor.cache_dir);
            obs::emit_suite_started(name, &cache_dir);

            let corpus = self.corpus.prepare(name, descriptor, &cache_dir).await;
            let outcome = verifier.verify(&cache_dir, progress).await?;
            let verdict = SuiteVerdict::evaluate(&outcome);
            summary.suite_finished(name, &verdict);

            let duration_ms = suite_start.elapsed().as_millis() as u64;
            obs::emit_suite_finished(
                name,
                verdict.total,
                verdict.failed,
                verdict.is_success(),
                duration_ms,
            );

            all_passed &= verdict.is_success();
            cancelled |= outcome.cancelled;
            reports.push(SuiteReport {
                suite: name.clone(),
                cache_dir,
                corpus,
                verdict,
                failed_artifacts: outcome.failed,
                duration_ms,
            });
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let success = all_passed && !cancelled && reports.len() == suites.len();

        if success {
            info!(run_id = %run_id, "Round-trip batch passed");
        } else {
            info!(run_id = %run_id, cancelled, "Round-trip batch failed");
        }

        Ok(BatchResult {
            run_id,
            success,
            cancelled,
            suites: reports,
            duration_ms,
        })
    }
}
