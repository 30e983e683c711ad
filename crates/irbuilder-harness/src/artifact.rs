//! Regenerated-IR artifacts and how they are found on disk.
//!
//! A suite cache holds, per test case, the reference bitcode `<stem>.bc`
//! and, once the generator ran, the regenerated text `<stem>.out.ll`.
//! Assembling the text yields `<stem>.out.bc`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// File name suffix of regenerated textual IR.
pub const REGENERATED_TEXT_SUFFIX: &str = ".out.ll";

/// File name suffix of reassembled regenerated IR.
pub const REGENERATED_BINARY_SUFFIX: &str = ".out.bc";

/// File name suffix of the reference bitcode.
pub const REFERENCE_BINARY_SUFFIX: &str = ".bc";

/// The three paths belonging to one regenerated test case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveredArtifact {
    /// Original bitcode produced by the corpus compiler.
    pub reference_binary: PathBuf,

    /// Regenerated textual IR (the discovered file).
    pub regenerated_text: PathBuf,

    /// Bitcode the assembler writes for the regenerated text.
    pub regenerated_binary: PathBuf,
}

impl DiscoveredArtifact {
    /// Derive the artifact paths from a discovered file.
    ///
    /// Matching is case-sensitive and needs a non-empty stem in front of
    /// `.out.ll`. Names that are not valid UTF-8 never match.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_suffix(REGENERATED_TEXT_SUFFIX)?;
        if stem.is_empty() {
            return None;
        }

        Some(Self {
            reference_binary: path.with_file_name(format!("{stem}{REFERENCE_BINARY_SUFFIX}")),
            regenerated_text: path.to_path_buf(),
            regenerated_binary: path.with_file_name(format!("{stem}{REGENERATED_BINARY_SUFFIX}")),
        })
    }
}

/// Collect every artifact below `root` in traversal order.
///
/// Each directory lists its files (sorted by name) before descending into
/// its subdirectories (also sorted). Symbolic links to directories are not
/// followed. A missing root or an unreadable directory contributes nothing
/// and is logged.
pub fn discover_artifacts(root: &Path) -> Vec<DiscoveredArtifact> {
    let mut artifacts = Vec::new();
    if !root.is_dir() {
        warn!(root = %root.display(), "Suite cache directory does not exist");
        return artifacts;
    }
    walk(root, &mut artifacts);
    artifacts
}

fn walk(dir: &Path, artifacts: &mut Vec<DiscoveredArtifact>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
            return;
        }
    };

    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => subdirs.push(entry.path()),
            Ok(_) => files.push(entry.path()),
            Err(e) => warn!(path = %entry.path().display(), error = %e, "Skipping entry"),
        }
    }

    files.sort();
    subdirs.sort();

    artifacts.extend(files.iter().filter_map(|f| DiscoveredArtifact::from_path(f)));
    for subdir in subdirs {
        walk(&subdir, artifacts);
    }
}
