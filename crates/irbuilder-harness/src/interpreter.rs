//! Bitcode execution via `lli`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::RunConfig;
use crate::error::HarnessResult;
use crate::invoker::{Invocation, RunOutcome, ToolInvoker};
use crate::toolchain::{ToolResolver, ToolVersionSpec};

/// Name of the interpreter executable before version suffixes.
pub const INTERPRETER_TOOL: &str = "lli";

/// Executes one binary artifact and reports how it exited.
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Run `input` and report how it ended.
    ///
    /// The outcome is an opaque fingerprint; a crashing or hanging program
    /// is a normal result, and an interpreter that cannot start yields
    /// [`RunOutcome::LaunchFailed`].
    async fn interpret(&self, input: &Path) -> RunOutcome;
}

/// [`Interpreter`] backed by an installed `lli`.
#[derive(Debug, Clone)]
pub struct Lli {
    tool: PathBuf,
    flags: Vec<String>,
    invoker: ToolInvoker,
}

impl Lli {
    /// Resolve `lli` for the accepted versions.
    pub async fn resolve(spec: &ToolVersionSpec, config: &RunConfig) -> HarnessResult<Self> {
        let tool = ToolResolver::from_config(config)
            .resolve(INTERPRETER_TOOL, spec)
            .await?;
        Ok(Self::with_tool(tool, config))
    }

    pub fn with_tool(tool: PathBuf, config: &RunConfig) -> Self {
        Self {
            tool,
            flags: config.interpreter_flags.clone(),
            invoker: ToolInvoker::new(config),
        }
    }

    pub fn tool(&self) -> &Path {
        &self.tool
    }

    /// Run with extra flags in front of the input file.
    pub async fn interpret_with_flags(&self, input: &Path, flags: &[String]) -> RunOutcome {
        let invocation = Invocation::new(&self.tool)
            .args(self.flags.iter().chain(flags))
            .arg(input)
            .non_fatal()
            .describe(format!(
                "Cannot run {} with {}",
                input.display(),
                self.tool.display()
            ));

        match self.invoker.execute(&invocation).await {
            Ok(outcome) => outcome,
            // Only an empty program path gets here; it cannot start either.
            Err(e) => {
                tracing::error!(error = %e, "Interpreter invocation rejected");
                RunOutcome::LaunchFailed
            }
        }
    }
}

#[async_trait]
impl Interpreter for Lli {
    async fn interpret(&self, input: &Path) -> RunOutcome {
        self.interpret_with_flags(input, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_interpreter_is_not_fatal() {
        let lli = Lli::with_tool(PathBuf::from("/nonexistent/lli-3.8"), &RunConfig::default());
        assert_eq!(
            lli.interpret(Path::new("foo.bc")).await,
            RunOutcome::LaunchFailed
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_program_exit_code_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("lli-3.8");
        std::fs::write(&tool, "#!/bin/sh\nexit 42\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let lli = Lli::with_tool(tool, &RunConfig::default());
        assert_eq!(lli.interpret(Path::new("foo.bc")).await, RunOutcome::Exited(42));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_program_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("lli-3.8");
        std::fs::write(&tool, "#!/bin/sh
exec sleep 30
").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = RunConfig {
            tool_timeout_secs: 1,
            ..RunConfig::default()
        };
        let lli = Lli::with_tool(tool, &config);
        assert_eq!(lli.interpret(Path::new("foo.bc")).await, RunOutcome::TimedOut);
    }
}
