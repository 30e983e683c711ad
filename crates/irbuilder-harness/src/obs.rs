//! Structured lifecycle events for batch runs.
//!
//! Events are emitted at `info!` level (artifact events at `debug!`) and
//! carry an `event` field so JSON log consumers can filter on it.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::corpus::CorpusStep;
use crate::verifier::ArtifactVerdict;

/// Span that tags everything logged during a batch with its run id.
///
/// Attach it with `tracing::Instrument` so it stays correct across awaits.
pub fn run_span(run_id: &str, generation: &str) -> tracing::Span {
    tracing::info_span!("irbuilder.run", run_id = %run_id, generation = %generation)
}

pub fn emit_suite_started(suite: &str, cache_dir: &Path) {
    info!(event = "suite.started", suite = %suite, cache_dir = %cache_dir.display());
}

pub fn emit_suite_finished(suite: &str, total: usize, failed: usize, success: bool, duration_ms: u64) {
    info!(
        event = "suite.finished",
        suite = %suite,
        total = total,
        failed = failed,
        success = success,
        duration_ms = duration_ms,
    );
}

pub fn emit_artifact_verified(path: &Path, verdict: &ArtifactVerdict) {
    match verdict {
        ArtifactVerdict::Passed { outcome } => debug!(
            event = "artifact.verified",
            path = %path.display(),
            passed = true,
            outcome = %outcome,
        ),
        ArtifactVerdict::Failed(cause) => debug!(
            event = "artifact.verified",
            path = %path.display(),
            passed = false,
            cause = %cause,
        ),
    }
}

/// Corpus failures are warnings: verification continues without them.
pub fn emit_corpus_failed(suite: &str, step: CorpusStep, exit_code: i32) {
    warn!(event = "corpus.failed", suite = %suite, step = %step, exit_code = exit_code);
}
