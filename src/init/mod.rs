//! Initialization of specflow projects.
//!
//! `specflow init` lays down the current layout:
//!
//! ```text
//! .specflow/
//! ├── orchestration-state.json   # fresh state with a new project id
//! ├── manifest.json
//! └── config.toml
//! .specify/
//! ├── memory/constitution.md
//! ├── templates/
//! ├── phases/
//! └── history/HISTORY.md
//! specs/
//! ROADMAP.md
//! BACKLOG.md
//! ```
//!
//! Existing files are never overwritten, so running init on a partially set
//! up project only fills the gaps. When an older-generation state document
//! exists it is migrated instead of replaced.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{SpecflowConfig, SpecflowToml};
use crate::migrate;
use crate::paths::ProjectPaths;
use crate::state::OrchestrationState;

pub const ROADMAP_STUB: &str = "\
# Roadmap

| Phase | Name | Status | Gate |
|-------|------|--------|------|
";

pub const BACKLOG_STUB: &str = "\
# Backlog

Deferred work and ideas not yet scheduled into a phase.
";

pub const HISTORY_STUB: &str = "\
# History

Completed phases, newest last.
";

pub const CONSTITUTION_STUB: &str = "\
# Constitution

Project principles that every phase must respect.
";

/// Result of initializing a project.
#[derive(Debug)]
pub struct InitResult {
    pub ops_dir: PathBuf,
    /// Whether the operational directory was newly created
    pub created: bool,
    /// Files written by this run
    pub created_files: Vec<PathBuf>,
}

/// Write `content` to `path` unless it already exists.
///
/// Returns whether the file was created.
pub fn write_stub(path: &Path, content: &str) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(true)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))
}

/// Create whichever of the auxiliary documents are missing.
pub fn ensure_aux_documents(paths: &ProjectPaths) -> Result<Vec<PathBuf>> {
    let stubs = [
        (paths.roadmap.clone(), ROADMAP_STUB),
        (paths.backlog.clone(), BACKLOG_STUB),
        (paths.history_file.clone(), HISTORY_STUB),
        (paths.memory_dir.join("constitution.md"), CONSTITUTION_STUB),
    ];
    let mut created = Vec::new();
    for (path, content) in stubs {
        // An existing memory directory with other documents counts as present
        if path.starts_with(&paths.memory_dir) && memory_has_documents(paths) {
            continue;
        }
        if write_stub(&path, content)? {
            created.push(path);
        }
    }
    Ok(created)
}

/// Whether `.specify/memory/` contains at least one markdown document.
pub fn memory_has_documents(paths: &ProjectPaths) -> bool {
    std::fs::read_dir(&paths.memory_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .any(|e| e.path().extension().is_some_and(|ext| ext == "md"))
        })
        .unwrap_or(false)
}

/// Initialize a project at `config.paths.root`.
pub fn init_project(config: &SpecflowConfig) -> Result<InitResult> {
    let paths = &config.paths;
    let created = !paths.ops_dir.exists();
    let mut created_files = Vec::new();

    for dir in [
        &paths.ops_dir,
        &paths.knowledge_dir,
        &paths.memory_dir,
        &paths.templates_dir,
        &paths.phases_dir,
        &paths.specs_dir,
    ] {
        ensure_dir(dir)?;
    }

    let name = config.project_name();

    if !paths.state.exists() {
        if paths.legacy_state.exists() {
            let result = migrate::state::migrate_state_into(paths, &config.state_store(), &name);
            if !result.success {
                anyhow::bail!(
                    "Failed to migrate existing state: {}",
                    result.error.unwrap_or_default()
                );
            }
        } else {
            let mut state = OrchestrationState::new(&name, &paths.root.to_string_lossy());
            config
                .state_store()
                .write(&mut state)
                .context("Failed to write initial state")?;
        }
        created_files.push(paths.state.clone());
    }

    if !paths.manifest.exists() {
        let result = migrate::migrate_manifest(paths, Some(&name));
        if !result.success {
            anyhow::bail!(
                "Failed to write manifest: {}",
                result.error.unwrap_or_default()
            );
        }
        created_files.push(paths.manifest.clone());
    }

    if !paths.config.exists() {
        let mut toml = SpecflowToml::default();
        toml.project.name = Some(name.clone());
        toml.save(&paths.config)?;
        created_files.push(paths.config.clone());
    }

    created_files.extend(ensure_aux_documents(paths)?);

    info!(
        root = %paths.root.display(),
        created,
        files = created_files.len(),
        "Initialized project"
    );
    Ok(InitResult {
        ops_dir: paths.ops_dir.clone(),
        created,
        created_files,
    })
}

/// Whether the project already has a current-layout state document.
pub fn is_initialized(paths: &ProjectPaths) -> bool {
    paths.state.exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateStore;
    use std::fs;
    use tempfile::tempdir;

    fn config_for(dir: &Path) -> SpecflowConfig {
        SpecflowConfig::defaults(dir)
    }

    #[test]
    fn test_init_creates_layout() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        let result = init_project(&config).unwrap();

        assert!(result.created);
        let paths = &config.paths;
        assert!(paths.state.is_file());
        assert!(paths.manifest.is_file());
        assert!(paths.config.is_file());
        assert!(paths.roadmap.is_file());
        assert!(paths.backlog.is_file());
        assert!(paths.history_file.is_file());
        assert!(paths.templates_dir.is_dir());
        assert!(paths.specs_dir.is_dir());
        assert!(memory_has_documents(paths));

        let state = StateStore::new(&paths.state).read().unwrap();
        assert!(state.is_current_schema());
        assert!(is_initialized(paths));
    }

    #[test]
    fn test_init_twice_keeps_identity_and_files() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        init_project(&config).unwrap();
        let id = StateStore::new(&config.paths.state).read().unwrap().project.id;
        fs::write(&config.paths.roadmap, "custom").unwrap();

        let again = init_project(&config).unwrap();
        assert!(!again.created);
        assert!(again.created_files.is_empty());
        assert_eq!(
            StateStore::new(&config.paths.state).read().unwrap().project.id,
            id
        );
        assert_eq!(fs::read_to_string(&config.paths.roadmap).unwrap(), "custom");
    }

    #[test]
    fn test_init_migrates_legacy_state() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        fs::create_dir_all(&config.paths.knowledge_dir).unwrap();
        fs::write(
            &config.paths.legacy_state,
            r#"{"schema_version": "2.0", "project": {"id": "legacy-id", "name": "old"}}"#,
        )
        .unwrap();

        init_project(&config).unwrap();
        let state = StateStore::new(&config.paths.state).read().unwrap();
        assert_eq!(state.project.id, "legacy-id");
        assert_eq!(state.migrations.len(), 1);
    }

    #[test]
    fn test_existing_memory_documents_are_enough() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        fs::create_dir_all(&config.paths.memory_dir).unwrap();
        fs::write(config.paths.memory_dir.join("notes.md"), "x").unwrap();

        let created = ensure_aux_documents(&config.paths).unwrap();
        assert!(!config.paths.memory_dir.join("constitution.md").exists());
        assert_eq!(created.len(), 3);
    }
}
