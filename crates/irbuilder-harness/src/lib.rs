//! IRBuilder round-trip harness
//!
//! Checks that regenerated LLVM IR still behaves like the bitcode it was
//! regenerated from:
//! - Discovers `.out.ll` files in a suite cache
//! - Reassembles them with `llvm-as`
//! - Runs reference and regenerated bitcode with `lli` and compares exit codes
//! - Aggregates per-suite verdicts into one batch status

pub mod artifact;
pub mod assembler;
pub mod batch;
pub mod config;
pub mod corpus;
pub mod error;
pub mod interpreter;
pub mod invoker;
pub mod obs;
pub mod report;
pub mod suite;
pub mod telemetry;
pub mod toolchain;
pub mod verifier;

// Re-export key types
pub use artifact::{discover_artifacts, DiscoveredArtifact};
pub use assembler::{Assembler, LlvmAs};
pub use batch::{BatchResult, BatchRunner, ConsoleSummary, SummarySink};
pub use config::{CorpusCommands, RunConfig};
pub use corpus::{CommandCorpusBuilder, CorpusBuilder, CorpusStatus, CorpusStep, ExistingCorpus};
pub use error::{HarnessError, HarnessResult};
pub use interpreter::{Interpreter, Lli};
pub use invoker::{
    FailureMode, Invocation, RunOutcome, ToolInvoker, LAUNCH_FAILURE_CODE, TIMEOUT_CODE,
};
pub use report::{BatchReport, SuiteReport, SuiteVerdict, VerdictKind};
pub use suite::{SuiteDescriptor, SuiteRegistry};
pub use telemetry::init_tracing;
pub use toolchain::{ToolResolver, ToolVersionSpec, ToolchainGeneration};
pub use verifier::{
    ArtifactVerdict, CancelFlag, FailedArtifact, FailureCause, NullProgress, ProgressSink,
    RoundTripVerifier, StreamProgress, VerificationOutcome,
};

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
