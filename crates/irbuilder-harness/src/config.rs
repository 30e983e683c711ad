//! Run-scoped configuration.
//!
//! A single [`RunConfig`] is built at startup (defaults, then an optional
//! JSON file, then command-line overrides) and handed explicitly to every
//! component that needs it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// Default location of the suite caches, relative to the working directory.
pub const DEFAULT_CACHE_ROOT: &str = "tests/cache";

/// Configuration shared by one harness invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Show the output of every external tool instead of discarding it.
    pub verbose: bool,

    /// Watchdog for a single tool invocation in seconds (0 = wait forever).
    pub tool_timeout_secs: u64,

    /// Root directory that suite cache directories are relative to.
    pub cache_root: PathBuf,

    /// Directories searched for `llvm-as` / `lli`. Empty means `PATH`.
    pub tool_dirs: Vec<PathBuf>,

    /// Extra flags passed to every `llvm-as` call.
    pub assembler_flags: Vec<String>,

    /// Extra flags passed to every `lli` call.
    pub interpreter_flags: Vec<String>,

    /// Commands that (re)build a suite's corpus before verification.
    pub corpus: CorpusCommands,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            tool_timeout_secs: 0,
            cache_root: PathBuf::from(DEFAULT_CACHE_ROOT),
            tool_dirs: Vec::new(),
            assembler_flags: Vec::new(),
            interpreter_flags: Vec::new(),
            corpus: CorpusCommands::default(),
        }
    }
}

/// Command templates for the corpus preparation step.
///
/// Each template is an argument vector; the placeholders `{suite}`,
/// `{target}`, `{generator}` and `{cache_dir}` are substituted per suite.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CorpusCommands {
    /// Compiles the reference bitcode for a compile target.
    pub compile: Option<Vec<String>>,

    /// Runs the IR generator that writes the `.out.ll` files.
    pub regenerate: Option<Vec<String>>,
}

impl CorpusCommands {
    /// Whether any corpus step is configured.
    pub fn is_empty(&self) -> bool {
        self.compile.is_none() && self.regenerate.is_none()
    }
}

impl RunConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| HarnessError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RunConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> HarnessResult<()> {
        for (step, template) in [
            ("compile", &self.corpus.compile),
            ("regenerate", &self.corpus.regenerate),
        ] {
            if let Some(argv) = template {
                if argv.is_empty() {
                    return Err(HarnessError::InvalidConfig(format!(
                        "corpus.{step} must not be an empty command"
                    )));
                }
            }
        }
        if self.cache_root.as_os_str().is_empty() {
            return Err(HarnessError::InvalidConfig(
                "cache_root must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The watchdog duration, if enabled.
    pub fn tool_timeout(&self) -> Option<std::time::Duration> {
        (self.tool_timeout_secs > 0).then(|| std::time::Duration::from_secs(self.tool_timeout_secs))
    }

    /// Absolute-or-relative cache directory of one suite.
    pub fn suite_cache_dir(&self, relative: &Path) -> PathBuf {
        self.cache_root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_default() {
        let config = RunConfig::default();
        assert!(!config.verbose);
        assert_eq!(config.tool_timeout_secs, 0);
        assert!(config.tool_timeout().is_none());
        assert_eq!(config.cache_root, PathBuf::from("tests/cache"));
        assert!(config.corpus.is_empty());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let json = r#"{"verbose": true, "tool_timeout_secs": 30}"#;
        let config: RunConfig = serde_json::from_str(json).expect("deserialize");
        assert!(config.verbose);
        assert_eq!(
            config.tool_timeout(),
            Some(std::time::Duration::from_secs(30))
        );
        assert_eq!(config.cache_root, PathBuf::from(DEFAULT_CACHE_ROOT));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.json");
        std::fs::write(
            &path,
            r#"{"cache_root": "/tmp/cache", "corpus": {"compile": ["make", "{target}"]}}"#,
        )
        .unwrap();

        let config = RunConfig::from_json_file(&path).expect("load");
        assert_eq!(config.cache_root, PathBuf::from("/tmp/cache"));
        assert_eq!(
            config.corpus.compile,
            Some(vec!["make".to_string(), "{target}".to_string()])
        );
        assert!(config.corpus.regenerate.is_none());
        assert_eq!(
            config.suite_cache_dir(Path::new("llvm")),
            PathBuf::from("/tmp/cache/llvm")
        );
    }

    #[test]
    fn test_missing_config_file() {
        let err = RunConfig::from_json_file(Path::new("/nonexistent/harness.json")).unwrap_err();
        assert!(matches!(err, HarnessError::ConfigRead { .. }));
    }

    #[test]
    fn test_empty_corpus_command_rejected() {
        let config = RunConfig {
            corpus: CorpusCommands {
                compile: Some(Vec::new()),
                regenerate: None,
            },
            ..RunConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("corpus.compile"));
    }
}
