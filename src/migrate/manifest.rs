//! Manifest document and its migration.
//!
//! The manifest is a small compatibility record kept next to the state
//! document. It versions independently of the state schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use tracing::info;

use super::MigrationResult;
use crate::paths::ProjectPaths;
use crate::state::{MigrationRecord, STATE_SCHEMA_VERSION};
use crate::util::{atomic_write, is_newer_version};

/// Manifest schema written by this crate.
pub const MANIFEST_SCHEMA_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compatibility {
    pub min_cli_version: String,
}

impl Default for Compatibility {
    fn default() -> Self {
        Self {
            min_cli_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: String,
    /// Format generation of the project layout this manifest describes
    pub format_generation: String,
    #[serde(default)]
    pub project_name: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub compatibility: Compatibility,
    #[serde(default)]
    pub migrations: Vec<MigrationRecord>,
}

impl Manifest {
    pub fn new(project_name: Option<&str>) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            format_generation: STATE_SCHEMA_VERSION.to_string(),
            project_name: project_name.map(str::to_string),
            created_at: Utc::now(),
            compatibility: Compatibility::default(),
            migrations: Vec::new(),
        }
    }

    pub fn is_current(&self) -> bool {
        self.schema_version == MANIFEST_SCHEMA_VERSION
            && self.format_generation == STATE_SCHEMA_VERSION
    }

    pub fn write(&self, path: &std::path::Path) -> std::io::Result<()> {
        let mut json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        json.push('\n');
        atomic_write(path, json.as_bytes())
    }
}

fn str_at<'a>(doc: &'a Value, pointers: &[&str]) -> Option<&'a str> {
    pointers
        .iter()
        .find_map(|p| doc.pointer(p).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
}

/// Build a current manifest from any older shape, keeping what maps over.
fn upgrade(doc: &Value, now: DateTime<Utc>) -> (Manifest, String) {
    let from = str_at(doc, &["/schema_version", "/version"])
        .unwrap_or("1.0")
        .to_string();
    let mut manifest = Manifest::new(str_at(doc, &["/project_name", "/name", "/project/name"]));
    if let Some(created) = str_at(doc, &["/created_at", "/created"])
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    {
        manifest.created_at = created.with_timezone(&Utc);
    }
    if let Some(records) = doc.get("migrations")
        && let Ok(records) = serde_json::from_value::<Vec<MigrationRecord>>(records.clone())
    {
        manifest.migrations = records;
    }
    manifest.migrations.push(MigrationRecord {
        from: from.clone(),
        to: MANIFEST_SCHEMA_VERSION.to_string(),
        date: now,
    });
    (manifest, from)
}

enum Plan {
    Skip(String),
    Create(Manifest),
    Upgrade(Manifest, Vec<String>),
}

fn plan(paths: &ProjectPaths, project_name: Option<&str>) -> Result<Plan, String> {
    let source = paths.manifest_source();
    if !source.exists() {
        return Ok(Plan::Create(Manifest::new(project_name)));
    }
    let content = fs::read_to_string(source)
        .map_err(|e| format!("Failed to read {}: {}", source.display(), e))?;
    let doc: Value = serde_json::from_str(&content)
        .map_err(|e| format!("Manifest {} is not valid JSON: {}", source.display(), e))?;

    if let Some(version) = str_at(&doc, &["/schema_version", "/version"])
        && is_newer_version(version, MANIFEST_SCHEMA_VERSION)
    {
        return Err(format!(
            "Manifest {} has schema {}, newer than supported {}; upgrade specflow instead",
            source.display(),
            version,
            MANIFEST_SCHEMA_VERSION
        ));
    }

    if source == paths.manifest
        && let Ok(existing) = serde_json::from_value::<Manifest>(doc.clone())
        && existing.is_current()
    {
        return Ok(Plan::Skip(format!(
            "manifest already at schema {}",
            MANIFEST_SCHEMA_VERSION
        )));
    }

    let (mut manifest, from) = upgrade(&doc, Utc::now());
    if manifest.project_name.is_none() {
        manifest.project_name = project_name.map(str::to_string);
    }
    let mut details = vec![format!(
        "manifest {} -> {}",
        from, MANIFEST_SCHEMA_VERSION
    )];
    if source != paths.manifest {
        details.push(format!(
            "moved from {} to {}",
            source.display(),
            paths.manifest.display()
        ));
    }
    Ok(Plan::Upgrade(manifest, details))
}

/// Describe what [`migrate_manifest`] would do without writing anything.
pub fn preview_manifest_migration(paths: &ProjectPaths, project_name: Option<&str>) -> MigrationResult {
    match plan(paths, project_name) {
        Ok(Plan::Skip(detail)) => MigrationResult::skipped(detail),
        Ok(Plan::Create(_)) => MigrationResult::created(vec![format!(
            "would create {}",
            paths.manifest.display()
        )]),
        Ok(Plan::Upgrade(_, details)) => MigrationResult::migrated(details),
        Err(e) => MigrationResult::failed(e),
    }
}

/// Bring the manifest to the current schema at the current location.
pub fn migrate_manifest(paths: &ProjectPaths, project_name: Option<&str>) -> MigrationResult {
    let plan = match plan(paths, project_name) {
        Ok(plan) => plan,
        Err(e) => return MigrationResult::failed(e),
    };
    match plan {
        Plan::Skip(detail) => MigrationResult::skipped(detail),
        Plan::Create(manifest) => match manifest.write(&paths.manifest) {
            Ok(()) => {
                info!(path = %paths.manifest.display(), "Created manifest");
                MigrationResult::created(vec![format!("created {}", paths.manifest.display())])
            }
            Err(e) => MigrationResult::failed(format!(
                "Failed to write {}: {}",
                paths.manifest.display(),
                e
            )),
        },
        Plan::Upgrade(manifest, details) => match manifest.write(&paths.manifest) {
            Ok(()) => {
                info!(path = %paths.manifest.display(), "Migrated manifest");
                MigrationResult::migrated(details)
            }
            Err(e) => MigrationResult::failed(format!(
                "Failed to write {}: {}",
                paths.manifest.display(),
                e
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::MigrationAction;
    use crate::paths::resolve_paths;
    use tempfile::tempdir;

    fn read_manifest(paths: &ProjectPaths) -> Manifest {
        serde_json::from_str(&fs::read_to_string(&paths.manifest).unwrap()).unwrap()
    }

    #[test]
    fn test_creates_when_absent() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        let result = migrate_manifest(&paths, Some("demo"));
        assert_eq!(result.action, MigrationAction::Created);
        let manifest = read_manifest(&paths);
        assert!(manifest.is_current());
        assert_eq!(manifest.project_name.as_deref(), Some("demo"));
    }

    #[test]
    fn test_newer_manifest_is_refused() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        fs::create_dir_all(&paths.ops_dir).unwrap();
        let content = r#"{"schema_version": "2.5", "extra": 1}"#;
        fs::write(&paths.manifest, content).unwrap();

        let result = migrate_manifest(&paths, Some("demo"));
        assert_eq!(result.action, MigrationAction::Failed);
        assert_eq!(fs::read_to_string(&paths.manifest).unwrap(), content);
    }

    #[test]
    fn test_legacy_manifest_upgraded_and_moved() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        fs::create_dir_all(&paths.knowledge_dir).unwrap();
        fs::write(
            &paths.legacy_manifest,
            r#"{"version": "1.2", "name": "old-name", "created_at": "2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();

        let result = migrate_manifest(&paths, Some("ignored"));
        assert_eq!(result.action, MigrationAction::Migrated, "{:?}", result);
        let manifest = read_manifest(&paths);
        assert_eq!(manifest.project_name.as_deref(), Some("old-name"));
        assert_eq!(manifest.created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(manifest.migrations.len(), 1);
        assert_eq!(manifest.migrations[0].from, "1.2");
        // Legacy file is left for the archive fix
        assert!(paths.legacy_manifest.exists());
    }

    #[test]
    fn test_second_run_is_skipped_and_unchanged() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        fs::create_dir_all(&paths.knowledge_dir).unwrap();
        fs::write(&paths.legacy_manifest, r#"{"version": "2.0"}"#).unwrap();

        assert!(migrate_manifest(&paths, None).success);
        let first = fs::read_to_string(&paths.manifest).unwrap();
        let again = migrate_manifest(&paths, None);
        assert_eq!(again.action, MigrationAction::Skipped);
        assert_eq!(fs::read_to_string(&paths.manifest).unwrap(), first);
    }

    #[test]
    fn test_invalid_json_fails_without_writing() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        fs::create_dir_all(&paths.ops_dir).unwrap();
        fs::write(&paths.manifest, "{oops").unwrap();
        let result = migrate_manifest(&paths, None);
        assert!(!result.success);
        assert_eq!(fs::read_to_string(&paths.manifest).unwrap(), "{oops");
    }

    #[test]
    fn test_preview_writes_nothing() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        let result = preview_manifest_migration(&paths, None);
        assert_eq!(result.action, MigrationAction::Created);
        assert!(!paths.manifest.exists());
    }
}
