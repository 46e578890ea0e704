//! Artifact resolver.
//!
//! A specflow project keeps its artifacts under two roots:
//!
//! ```text
//! <root>/
//! ├── .specflow/                    # operational state (current layout)
//! │   ├── orchestration-state.json
//! │   ├── manifest.json
//! │   └── config.toml
//! ├── .specify/                     # repo knowledge
//! │   ├── memory/
//! │   ├── templates/
//! │   ├── phases/
//! │   ├── history/HISTORY.md
//! │   ├── archive/
//! │   ├── orchestration-state.json  # legacy location (older generations)
//! │   └── manifest.json             # legacy location
//! ├── specs/NNNN-feature/
//! ├── ROADMAP.md
//! └── BACKLOG.md
//! ```
//!
//! Older generations kept everything under `.specify/`. When both layouts
//! are present the newer one wins and the older files are only read as
//! migration sources.

use std::fs;
use std::path::{Path, PathBuf};

use crate::util::{normalize_phase_number, numeric_prefix};

/// Operational state directory (current layout).
pub const OPS_DIR: &str = ".specflow";
/// Repo knowledge directory (present in every generation).
pub const KNOWLEDGE_DIR: &str = ".specify";

pub const STATE_FILE: &str = "orchestration-state.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const CONFIG_FILE: &str = "config.toml";
pub const LOCK_FILE: &str = "state.lock";
pub const ROADMAP_FILE: &str = "ROADMAP.md";
pub const BACKLOG_FILE: &str = "BACKLOG.md";
pub const SPECS_DIR: &str = "specs";

/// Walk upward from `start` until a directory with a project marker is found.
///
/// Returns `None` when the filesystem root is reached without a match; that
/// is the only way "not a project" is signalled.
pub fn resolve_root(start: &Path) -> Option<PathBuf> {
    let start = start
        .canonicalize()
        .unwrap_or_else(|_| start.to_path_buf());
    start
        .ancestors()
        .find(|dir| is_project_root(dir))
        .map(Path::to_path_buf)
}

/// Whether `dir` carries either the operational or the knowledge marker.
///
/// A bare `.specflow/` directory does not count; it needs a state,
/// manifest or config file inside it.
pub fn is_project_root(dir: &Path) -> bool {
    let ops = dir.join(OPS_DIR);
    [STATE_FILE, MANIFEST_FILE, CONFIG_FILE]
        .iter()
        .any(|file| ops.join(file).is_file())
        || dir.join(KNOWLEDGE_DIR).is_dir()
}

/// Canonical locations of every tracked artifact for one project root.
///
/// Built once per invocation and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub ops_dir: PathBuf,
    pub knowledge_dir: PathBuf,
    pub state: PathBuf,
    pub manifest: PathBuf,
    pub config: PathBuf,
    pub lock: PathBuf,
    pub legacy_state: PathBuf,
    pub legacy_manifest: PathBuf,
    pub roadmap: PathBuf,
    pub backlog: PathBuf,
    pub specs_dir: PathBuf,
    pub memory_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub phases_dir: PathBuf,
    pub history_file: PathBuf,
    pub archive_dir: PathBuf,
}

/// Resolve every artifact path below `root`.
pub fn resolve_paths(root: &Path) -> ProjectPaths {
    let ops_dir = root.join(OPS_DIR);
    let knowledge_dir = root.join(KNOWLEDGE_DIR);
    ProjectPaths {
        root: root.to_path_buf(),
        state: ops_dir.join(STATE_FILE),
        manifest: ops_dir.join(MANIFEST_FILE),
        config: ops_dir.join(CONFIG_FILE),
        lock: ops_dir.join(LOCK_FILE),
        legacy_state: knowledge_dir.join(STATE_FILE),
        legacy_manifest: knowledge_dir.join(MANIFEST_FILE),
        roadmap: root.join(ROADMAP_FILE),
        backlog: root.join(BACKLOG_FILE),
        specs_dir: root.join(SPECS_DIR),
        memory_dir: knowledge_dir.join("memory"),
        templates_dir: knowledge_dir.join("templates"),
        phases_dir: knowledge_dir.join("phases"),
        history_file: knowledge_dir.join("history").join("HISTORY.md"),
        archive_dir: knowledge_dir.join("archive"),
        ops_dir,
        knowledge_dir,
    }
}

impl ProjectPaths {
    /// Whether the newer operational-state directory exists.
    pub fn has_ops_layout(&self) -> bool {
        self.ops_dir.is_dir()
    }

    /// Whether any recognized artifact exists at all.
    pub fn has_any_artifact(&self) -> bool {
        self.ops_dir.exists()
            || self.knowledge_dir.exists()
            || self.roadmap.exists()
            || self.state.exists()
            || self.legacy_state.exists()
    }

    /// The state document to read: the current location if present, else the legacy one.
    pub fn state_source(&self) -> &Path {
        if !self.state.exists() && self.legacy_state.exists() {
            &self.legacy_state
        } else {
            &self.state
        }
    }

    /// The manifest to read: the current location if present, else the legacy one.
    pub fn manifest_source(&self) -> &Path {
        if !self.manifest.exists() && self.legacy_manifest.exists() {
            &self.legacy_manifest
        } else {
            &self.manifest
        }
    }

    /// Whether a legacy state or manifest sits next to its current counterpart.
    pub fn legacy_duplicates(&self) -> Vec<&Path> {
        let mut dupes = Vec::new();
        if self.state.exists() && self.legacy_state.exists() {
            dupes.push(self.legacy_state.as_path());
        }
        if self.manifest.exists() && self.legacy_manifest.exists() {
            dupes.push(self.legacy_manifest.as_path());
        }
        dupes
    }

    /// Numerically prefixed subdirectories of `specs/`, sorted by name.
    pub fn feature_dirs(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.specs_dir) else {
            return Vec::new();
        };
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(numeric_prefix)
                    .is_some()
            })
            .collect();
        dirs.sort();
        dirs
    }
}

/// Find the `specs/` feature directory for the active phase.
///
/// The phase number is matched against each directory's numeric prefix
/// after padding, so a legacy `010-foo` still matches phase `0010`. Without
/// an active phase the lexicographically last numbered directory is used.
pub fn resolve_active_feature_dir(
    paths: &ProjectPaths,
    phase_number: Option<&str>,
) -> Option<PathBuf> {
    let dirs = paths.feature_dirs();
    match phase_number {
        Some(number) if !number.trim().is_empty() => {
            let wanted = normalize_phase_number(number);
            dirs.into_iter().find(|dir| {
                dir.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(numeric_prefix)
                    .map(|prefix| normalize_phase_number(prefix) == wanted)
                    .unwrap_or(false)
            })
        }
        _ => dirs.into_iter().last(),
    }
}
