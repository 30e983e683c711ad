//! Toolchain generations and external tool resolution.
//!
//! LLVM tools are usually installed side by side with a version suffix
//! (`llvm-as-3.8`, `lli38`) or as a single unversioned binary. Resolution
//! walks the accepted versions in order and returns the first installed
//! match.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::RunConfig;
use crate::error::{HarnessError, HarnessResult};

/// Ordered list of acceptable versions for one external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolVersionSpec {
    versions: Vec<String>,
}

impl ToolVersionSpec {
    /// Create a spec; the first version has the highest preference.
    pub fn new<I, S>(versions: I) -> HarnessResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let versions: Vec<String> = versions.into_iter().map(Into::into).collect();
        if versions.is_empty() || versions.iter().any(|v| v.trim().is_empty()) {
            return Err(HarnessError::InvalidConfig(
                "a tool version list needs at least one non-empty version".to_string(),
            ));
        }
        Ok(Self { versions })
    }

    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    /// Executable names that identify `tool` at exactly `version`.
    pub fn versioned_names(tool: &str, version: &str) -> [String; 2] {
        [
            format!("{tool}-{version}"),
            format!("{tool}{}", version.replace('.', "")),
        ]
    }

    /// The first accepted version mentioned by a `--version` banner.
    pub fn match_banner(&self, banner: &str) -> Option<&str> {
        self.versions
            .iter()
            .find(|v| mentions_version(banner, v))
            .map(String::as_str)
    }
}

/// `banner` contains `version <v>` not followed by another digit.
fn mentions_version(banner: &str, version: &str) -> bool {
    let needle = format!("version {version}");
    banner.match_indices(&needle).any(|(idx, _)| {
        !banner[idx + needle.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    })
}

/// A family of assembler/interpreter versions with its own suite table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolchainGeneration {
    /// LLVM 3.2 / 3.3.
    Llvm32,
    /// LLVM 3.8 / 3.9.
    Llvm38,
}

impl ToolchainGeneration {
    pub const ALL: [ToolchainGeneration; 2] = [Self::Llvm32, Self::Llvm38];

    /// Short label used in logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Llvm32 => "3.2",
            Self::Llvm38 => "3.8",
        }
    }

    /// Accepted tool versions, most preferred first.
    pub fn version_spec(&self) -> ToolVersionSpec {
        let versions: &[&str] = match self {
            Self::Llvm32 => &["3.2", "3.3"],
            Self::Llvm38 => &["3.8", "3.9"],
        };
        ToolVersionSpec {
            versions: versions.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl fmt::Display for ToolchainGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ToolchainGeneration {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "32" | "3.2" | "llvm32" => Ok(Self::Llvm32),
            "38" | "3.8" | "llvm38" => Ok(Self::Llvm38),
            other => Err(HarnessError::InvalidConfig(format!(
                "unknown toolchain generation `{other}` (expected 32 or 38)"
            ))),
        }
    }
}

/// Limit for a `--version` query when no tool watchdog is configured.
pub const DEFAULT_BANNER_TIMEOUT: Duration = Duration::from_secs(10);

/// Finds installed tools in a list of directories.
#[derive(Debug, Clone)]
pub struct ToolResolver {
    search_dirs: Vec<PathBuf>,
    banner_timeout: Duration,
}

impl ToolResolver {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_dirs,
            banner_timeout: DEFAULT_BANNER_TIMEOUT,
        }
    }

    /// Kill a `--version` query after `limit`.
    pub fn with_banner_timeout(mut self, limit: Duration) -> Self {
        self.banner_timeout = limit;
        self
    }

    /// Search the configured tool directories, or `PATH` when none are set.
    ///
    /// Version queries use the tool watchdog when one is configured.
    pub fn from_config(config: &RunConfig) -> Self {
        let dirs = if !config.tool_dirs.is_empty() {
            config.tool_dirs.clone()
        } else {
            std::env::var_os("PATH")
                .map(|path| std::env::split_paths(&path).collect())
                .unwrap_or_default()
        };
        let limit = config.tool_timeout().unwrap_or(DEFAULT_BANNER_TIMEOUT);
        Self::new(dirs).with_banner_timeout(limit)
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Resolve `tool` against `spec`.
    ///
    /// For every accepted version in order, versioned executables win; an
    /// unversioned `tool` is accepted for that version when its `--version`
    /// banner mentions it.
    pub async fn resolve(&self, tool: &str, spec: &ToolVersionSpec) -> HarnessResult<PathBuf> {
        let unversioned = match self.find(tool) {
            Some(path) => version_banner(&path, self.banner_timeout)
                .await
                .and_then(|banner| spec.match_banner(&banner).map(str::to_string))
                .map(|version| (path, version)),
            None => None,
        };

        for version in spec.versions() {
            for name in ToolVersionSpec::versioned_names(tool, version) {
                if let Some(path) = self.find(&name) {
                    debug!(tool, version = %version, path = %path.display(), "Resolved tool");
                    return Ok(path);
                }
            }
            if let Some((path, _)) = unversioned.as_ref().filter(|(_, v)| v == version) {
                debug!(tool, version = %version, path = %path.display(), "Resolved unversioned tool");
                return Ok(path.clone());
            }
        }

        Err(HarnessError::ToolNotFound {
            tool: tool.to_string(),
            versions: spec.versions().to_vec(),
        })
    }

    fn find(&self, name: &str) -> Option<PathBuf> {
        self.search_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate))
    }
}

async fn version_banner(path: &Path, limit: Duration) -> Option<String> {
    let query = Command::new(path)
        .arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = match tokio::time::timeout(limit, query).await {
        Ok(output) => output.ok()?,
        Err(_) => {
            warn!(
                tool = %path.display(),
                limit_secs = limit.as_secs(),
                "Version query timed out; ignoring tool"
            );
            return None;
        }
    };
    // Old LLVM releases print the banner on stderr.
    let mut banner = String::from_utf8_lossy(&output.stdout).into_owned();
    banner.push_str(&String::from_utf8_lossy(&output.stderr));
    Some(banner)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
