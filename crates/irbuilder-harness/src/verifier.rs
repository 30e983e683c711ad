//! Round-trip verification of one suite cache directory.
//!
//! For every regenerated `.out.ll` the verifier reassembles the text, runs
//! the reference and the regenerated bitcode, and compares exit codes.
//! Artifacts are processed one at a time in discovery order; a failing
//! artifact is recorded and the walk goes on.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifact::{discover_artifacts, DiscoveredArtifact};
use crate::assembler::Assembler;
use crate::error::HarnessResult;
use crate::interpreter::Interpreter;
use crate::invoker::RunOutcome;
use crate::obs;

/// Progress marker written for a passing artifact.
pub const PASS_MARKER: char = '.';

/// Progress marker written for a failing artifact.
pub const FAIL_MARKER: char = 'E';

/// Receives one mark per processed artifact, in processing order.
pub trait ProgressSink {
    fn record(&mut self, passed: bool);

    /// Called once after the last artifact.
    fn finish(&mut self) {}
}

/// Writes `.`/`E` to a stream, flushing after every mark.
pub struct StreamProgress<W: Write> {
    out: W,
}

impl<W: Write> StreamProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl StreamProgress<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ProgressSink for StreamProgress<W> {
    fn record(&mut self, passed: bool) {
        let marker = if passed { PASS_MARKER } else { FAIL_MARKER };
        // Progress is cosmetic; a closed stream must not fail the run.
        let _ = write!(self.out, "{marker}").and_then(|_| self.out.flush());
    }

    fn finish(&mut self) {
        let _ = writeln!(self.out).and_then(|_| self.out.flush());
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn record(&mut self, _passed: bool) {}
}

/// Cooperative cancellation, checked between artifacts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why an artifact failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    /// The assembler rejected the regenerated text.
    AssemblyFailed { exit_code: i32 },

    /// The reference bitcode was not on disk.
    MissingReference,

    /// Reference and regenerated bitcode ended differently.
    BehaviorMismatch {
        reference: RunOutcome,
        regenerated: RunOutcome,
    },
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AssemblyFailed { exit_code } => {
                write!(f, "assembly failed with exit code {exit_code}")
            }
            Self::MissingReference => f.write_str("reference bitcode missing"),
            Self::BehaviorMismatch {
                reference,
                regenerated,
            } => write!(f, "regenerated {regenerated}, reference {reference}"),
        }
    }
}

/// Terminal state of one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactVerdict {
    /// Both binaries ended with `outcome`.
    Passed { outcome: RunOutcome },
    Failed(FailureCause),
}

impl ArtifactVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }
}

/// A failed artifact and its cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedArtifact {
    pub path: PathBuf,
    pub cause: FailureCause,
}

/// Aggregate result of verifying one directory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VerificationOutcome {
    /// Passed artifacts (regenerated text paths) in processing order.
    pub passed: Vec<PathBuf>,

    /// Failed artifacts in processing order.
    pub failed: Vec<FailedArtifact>,

    /// The walk stopped early because of cancellation.
    pub cancelled: bool,
}

impl VerificationOutcome {
    pub fn total(&self) -> usize {
        self.passed.len() + self.failed.len()
    }

    pub fn failed_paths(&self) -> impl Iterator<Item = &Path> {
        self.failed.iter().map(|f| f.path.as_path())
    }

    fn record(&mut self, path: PathBuf, verdict: ArtifactVerdict) {
        match verdict {
            ArtifactVerdict::Passed { .. } => self.passed.push(path),
            ArtifactVerdict::Failed(cause) => self.failed.push(FailedArtifact { path, cause }),
        }
    }
}

/// Drives assembler and interpreter over a suite cache.
pub struct RoundTripVerifier<'a> {
    assembler: &'a dyn Assembler,
    interpreter: &'a dyn Interpreter,
    cancel: CancelFlag,
}

impl<'a> RoundTripVerifier<'a> {
    pub fn new(assembler: &'a dyn Assembler, interpreter: &'a dyn Interpreter) -> Self {
        Self {
            assembler,
            interpreter,
            cancel: CancelFlag::new(),
        }
    }

    /// Observe `cancel` between artifacts.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Verify one artifact.
    ///
    /// The interpreter is never invoked when assembly fails. Errors are
    /// reserved for an assembler that cannot run at all.
    pub async fn verify_artifact(
        &self,
        artifact: &DiscoveredArtifact,
    ) -> HarnessResult<ArtifactVerdict> {
        let assembled = self.assembler.assemble(&artifact.regenerated_text).await?;
        if assembled != 0 {
            return Ok(ArtifactVerdict::Failed(FailureCause::AssemblyFailed {
                exit_code: assembled,
            }));
        }

        if !artifact.reference_binary.is_file() {
            warn!(
                reference = %artifact.reference_binary.display(),
                "Reference bitcode missing"
            );
            return Ok(ArtifactVerdict::Failed(FailureCause::MissingReference));
        }

        let reference = self.interpreter.interpret(&artifact.reference_binary).await;
        let regenerated = self.interpreter.interpret(&artifact.regenerated_binary).await;
        debug!(
            artifact = %artifact.regenerated_text.display(),
            reference = %reference,
            regenerated = %regenerated,
            "Interpreted both binaries"
        );

        if reference == regenerated {
            Ok(ArtifactVerdict::Passed { outcome: reference })
        } else {
            Ok(ArtifactVerdict::Failed(FailureCause::BehaviorMismatch {
                reference,
                regenerated,
            }))
        }
    }

    /// Verify every artifact below `root`.
    pub async fn verify(
        &self,
        root: &Path,
        progress: &mut dyn ProgressSink,
    ) -> HarnessResult<VerificationOutcome> {
        info!(root = %root.display(), "Testing Reassembly");

        let artifacts = discover_artifacts(root);
        debug!(count = artifacts.len(), "Discovered regenerated artifacts");

        let mut outcome = VerificationOutcome::default();
        for artifact in &artifacts {
            if self.cancel.is_cancelled() {
                warn!(
                    remaining = artifacts.len() - outcome.total(),
                    "Verification cancelled"
                );
                outcome.cancelled = true;
                break;
            }

            let verdict = self.verify_artifact(artifact).await?;
            obs::emit_artifact_verified(&artifact.regenerated_text, &verdict);
            progress.record(verdict.passed());
            outcome.record(artifact.regenerated_text.clone(), verdict);
        }
        progress.finish();

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_progress_markers() {
        let mut progress = StreamProgress::new(Vec::new());
        progress.record(true);
        progress.record(false);
        progress.record(true);
        progress.finish();
        assert_eq!(String::from_utf8(progress.into_inner()).unwrap(), ".E.\n");
    }

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_outcome_counts() {
        let mut outcome = VerificationOutcome::default();
        outcome.record(
            PathBuf::from("a.out.ll"),
            ArtifactVerdict::Passed {
                outcome: RunOutcome::Exited(0),
            },
        );
        outcome.record(
            PathBuf::from("b.out.ll"),
            ArtifactVerdict::Failed(FailureCause::AssemblyFailed { exit_code: 1 }),
        );
        assert_eq!(outcome.total(), 2);
        assert_eq!(
            outcome.failed_paths().collect::<Vec<_>>(),
            vec![Path::new("b.out.ll")]
        );
    }

    #[test]
    fn test_failure_cause_display() {
        let cause = FailureCause::BehaviorMismatch {
            reference: RunOutcome::Exited(42),
            regenerated: RunOutcome::TimedOut,
        };
        assert_eq!(cause.to_string(), "regenerated timeout, reference exit code 42");
        assert!(FailureCause::MissingReference.to_string().contains("missing"));
    }

    #[test]
    fn test_failure_cause_serde_tag() {
        let json = serde_json::to_value(FailureCause::AssemblyFailed { exit_code: 1 }).unwrap();
        assert_eq!(json["kind"], "assembly_failed");
        assert_eq!(json["exit_code"], 1);

        let json = serde_json::to_value(FailureCause::BehaviorMismatch {
            reference: RunOutcome::Signaled(2),
            regenerated: RunOutcome::TimedOut,
        })
        .unwrap();
        assert_eq!(json["kind"], "behavior_mismatch");
        assert_eq!(json["reference"]["signaled"], 2);
        assert_eq!(json["regenerated"], "timed_out");
    }
}
