//! Error taxonomy for the round-trip harness.
//!
//! Only environment problems surface as errors. Per-artifact outcomes
//! (assembly failures, behavior mismatches, empty suites) are recorded as
//! verdicts instead.

use std::path::PathBuf;

/// Errors produced by the harness.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("no installed {tool} matches any of the accepted versions [{}]", versions.join(", "))]
    ToolNotFound { tool: String, versions: Vec<String> },

    #[error("cannot launch `{command}`: {reason}")]
    LaunchFailure { command: String, reason: String },

    #[error("`{command}` timed out after {limit_secs} seconds")]
    Timeout { command: String, limit_secs: u64 },

    #[error("refusing to run an empty command")]
    EmptyCommand,

    #[error("unknown suite `{name}` for LLVM {generation} (known: {})", known.join(", "))]
    UnknownSuite {
        name: String,
        generation: String,
        known: Vec<String>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot read configuration {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for harness operations.
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;
