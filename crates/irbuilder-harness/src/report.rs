//! Suite pass/fail decision and the reports built from it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::corpus::CorpusStatus;
use crate::error::HarnessResult;
use crate::verifier::{FailedArtifact, VerificationOutcome};

/// Overall state of one suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    /// At least one artifact, none failed.
    Passed,
    /// One or more artifacts failed.
    Failed,
    /// Nothing was discovered; the corpus is broken.
    Empty,
    /// The run was interrupted before all artifacts were processed.
    Cancelled,
}

/// Decision for one suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteVerdict {
    pub kind: VerdictKind,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,

    /// Headline of the summary.
    pub message: String,

    /// Failed artifact paths, numbered from 0 in processing order.
    pub failures: Vec<String>,
}

impl SuiteVerdict {
    /// Decide the suite result.
    ///
    /// Rules, first match wins:
    /// - any failed artifact fails the suite, even if others passed
    /// - zero artifacts fails the suite
    /// - an interrupted walk fails the suite
    /// - otherwise the suite passes
    pub fn evaluate(outcome: &VerificationOutcome) -> Self {
        let total = outcome.total();
        let failed = outcome.failed.len();
        let failures = outcome
            .failed
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{}) {}", i, f.path.display()))
            .collect();

        let (kind, message) = if failed != 0 {
            (
                VerdictKind::Failed,
                format!("Failed {failed} of {total} Tests!"),
            )
        } else if total == 0 {
            (
                VerdictKind::Empty,
                format!("There is something odd with the testsuite, {total} Tests executed!"),
            )
        } else if outcome.cancelled {
            (
                VerdictKind::Cancelled,
                format!("Cancelled after {total} Tests!"),
            )
        } else {
            (VerdictKind::Passed, format!("Passed all {total} Tests!"))
        };

        Self {
            kind,
            total,
            passed: outcome.passed.len(),
            failed,
            message,
            failures,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == VerdictKind::Passed
    }

    /// Exit status contribution of this suite (0 = passed).
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// The human-readable summary, one line per entry.
    pub fn render_lines(&self) -> Vec<String> {
        std::iter::once(self.message.clone())
            .chain(self.failures.iter().cloned())
            .collect()
    }
}

/// Result of one suite inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite: String,
    pub cache_dir: PathBuf,
    pub corpus: CorpusStatus,
    pub verdict: SuiteVerdict,
    pub failed_artifacts: Vec<FailedArtifact>,
    pub duration_ms: u64,
}

/// Machine-readable summary of a batch (`--report-json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: String,
    pub generation: String,
    pub generated_at: DateTime<Utc>,
    pub success: bool,
    pub suites: Vec<SuiteReport>,
    pub duration_ms: u64,
}

impl BatchReport {
    /// Write the report as pretty-printed JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> HarnessResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Number of suites that passed.
    pub fn passed_count(&self) -> usize {
        self.suites.iter().filter(|s| s.verdict.is_success()).count()
    }

    /// Number of suites that failed.
    pub fn failed_count(&self) -> usize {
        self.suites.len() - self.passed_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::RunOutcome;
    use crate::verifier::FailureCause;

    fn failed(path: &str) -> FailedArtifact {
        FailedArtifact {
            path: PathBuf::from(path),
            cause: FailureCause::BehaviorMismatch {
                reference: RunOutcome::Exited(0),
                regenerated: RunOutcome::Exited(1),
            },
        }
    }

    #[test]
    fn test_all_passed() {
        let outcome = VerificationOutcome {
            passed: vec![PathBuf::from("a.out.ll"), PathBuf::from("b.out.ll")],
            ..Default::default()
        };
        let verdict = SuiteVerdict::evaluate(&outcome);
        assert!(verdict.is_success());
        assert_eq!(verdict.message, "Passed all 2 Tests!");
        assert!(verdict.failures.is_empty());
        assert_eq!(verdict.exit_code(), 0);
    }

    #[test]
    fn test_empty_suite_fails() {
        let verdict = SuiteVerdict::evaluate(&VerificationOutcome::default());
        assert_eq!(verdict.kind, VerdictKind::Empty);
        assert!(!verdict.is_success());
        assert_eq!(
            verdict.message,
            "There is something odd with the testsuite, 0 Tests executed!"
        );
        assert_eq!(verdict.exit_code(), 1);
    }

    #[test]
    fn test_failures_numbered_from_zero() {
        let outcome = VerificationOutcome {
            passed: vec![PathBuf::from("ok.out.ll")],
            failed: vec![failed("x.out.ll"), failed("y.out.ll")],
            cancelled: false,
        };
        let verdict = SuiteVerdict::evaluate(&outcome);
        assert_eq!(verdict.kind, VerdictKind::Failed);
        assert_eq!(verdict.message, "Failed 2 of 3 Tests!");
        assert_eq!(verdict.failures, vec!["0) x.out.ll", "1) y.out.ll"]);
        assert_eq!(
            verdict.render_lines(),
            vec!["Failed 2 of 3 Tests!", "0) x.out.ll", "1) y.out.ll"]
        );
    }

    #[test]
    fn test_cancelled_run_fails() {
        let outcome = VerificationOutcome {
            passed: vec![PathBuf::from("a.out.ll")],
            failed: Vec::new(),
            cancelled: true,
        };
        let verdict = SuiteVerdict::evaluate(&outcome);
        assert_eq!(verdict.kind, VerdictKind::Cancelled);
        assert!(!verdict.is_success());
    }

    #[test]
    fn test_batch_report_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/roundtrip.json");
        let report = BatchReport {
            run_id: "run-1".to_string(),
            generation: "3.8".to_string(),
            generated_at: Utc::now(),
            success: false,
            suites: vec![SuiteReport {
                suite: "gcc".to_string(),
                cache_dir: PathBuf::from("tests/cache/gcc"),
                corpus: CorpusStatus::Skipped,
                verdict: SuiteVerdict::evaluate(&VerificationOutcome::default()),
                failed_artifacts: Vec::new(),
                duration_ms: 3,
            }],
            duration_ms: 5,
        };

        report.write_json(&path).expect("write");
        let loaded: BatchReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).expect("parse");
        assert_eq!(loaded.suites[0].verdict.kind, VerdictKind::Empty);
        assert_eq!(loaded.failed_count(), 1);
        assert_eq!(loaded.passed_count(), 0);
    }
}
