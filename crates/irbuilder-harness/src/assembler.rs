//! Textual IR to bitcode via `llvm-as`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::error;

use crate::config::RunConfig;
use crate::error::HarnessResult;
use crate::invoker::{Invocation, ToolInvoker};
use crate::toolchain::{ToolResolver, ToolVersionSpec};

/// Name of the assembler executable before version suffixes.
pub const ASSEMBLER_TOOL: &str = "llvm-as";

/// Turns one textual IR file into a binary artifact.
#[async_trait]
pub trait Assembler: Send + Sync {
    /// Assemble `input` and return the assembler's exit code.
    ///
    /// Zero means the bitcode was written next to `input`. An `Err` means
    /// the assembler could not run at all.
    async fn assemble(&self, input: &Path) -> HarnessResult<i32>;
}

/// [`Assembler`] backed by an installed `llvm-as`.
#[derive(Debug, Clone)]
pub struct LlvmAs {
    tool: PathBuf,
    flags: Vec<String>,
    invoker: ToolInvoker,
}

impl LlvmAs {
    /// Resolve `llvm-as` for the accepted versions.
    pub async fn resolve(spec: &ToolVersionSpec, config: &RunConfig) -> HarnessResult<Self> {
        let tool = ToolResolver::from_config(config)
            .resolve(ASSEMBLER_TOOL, spec)
            .await?;
        Ok(Self::with_tool(tool, config))
    }

    /// Use an already known executable.
    pub fn with_tool(tool: PathBuf, config: &RunConfig) -> Self {
        Self {
            tool,
            flags: config.assembler_flags.clone(),
            invoker: ToolInvoker::new(config),
        }
    }

    pub fn tool(&self) -> &Path {
        &self.tool
    }

    /// Assemble with extra flags in front of the input file.
    pub async fn assemble_with_flags(&self, input: &Path, flags: &[String]) -> HarnessResult<i32> {
        let description = format!(
            "Cannot assemble {} with {}",
            input.display(),
            self.tool.display()
        );
        // Assembler diagnostics are always shown; they explain a failed artifact.
        let invocation = Invocation::new(&self.tool)
            .args(self.flags.iter().chain(flags))
            .arg(input)
            .visible()
            .describe(description.clone());

        let code = self.invoker.run(&invocation).await?;
        if code != 0 {
            error!(exit_code = code, command = %invocation.command_line(), "Error: {}", description);
        }
        Ok(code)
    }
}

#[async_trait]
impl Assembler for LlvmAs {
    async fn assemble(&self, input: &Path) -> HarnessResult<i32> {
        self.assemble_with_flags(input, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;

    #[tokio::test]
    async fn test_launch_failure_is_fatal() {
        let assembler = LlvmAs::with_tool(
            PathBuf::from("/nonexistent/llvm-as-3.8"),
            &RunConfig::default(),
        );
        let err = assembler
            .assemble(Path::new("foo.out.ll"))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::LaunchFailure { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_flags_precede_input() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args.txt");
        let tool = dir.path().join("llvm-as-3.8");
        std::fs::write(
            &tool,
            format!("#!/bin/sh\necho \"$@\" > '{}'\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = RunConfig {
            assembler_flags: vec!["-disable-verify".to_string()],
            ..RunConfig::default()
        };
        let assembler = LlvmAs::with_tool(tool, &config);
        let code = assembler
            .assemble_with_flags(Path::new("foo.out.ll"), &["-o=-".to_string()])
            .await
            .expect("assemble");

        assert_eq!(code, 0);
        let args = std::fs::read_to_string(&log).unwrap();
        assert_eq!(args.trim(), "-disable-verify -o=- foo.out.ll");
    }

    #[tokio::test]
    async fn test_resolve_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            tool_dirs: vec![dir.path().to_path_buf()],
            ..RunConfig::default()
        };
        let spec = ToolVersionSpec::new(["3.8"]).unwrap();
        let err = LlvmAs::resolve(&spec, &config).await.unwrap_err();
        assert!(matches!(err, HarnessError::ToolNotFound { .. }));
    }
}
