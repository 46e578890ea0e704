//! Deterministic repairs for autofixable issues.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::{HealthReport, IssueCode};
use crate::config::SpecflowConfig;
use crate::init::{ensure_aux_documents, init_project};
use crate::migrate::{migrate_manifest, state::migrate_state_into};
use crate::util::numeric_prefix;

/// Result of one repair.
#[derive(Debug, Clone, Serialize)]
pub struct FixOutcome {
    pub code: IssueCode,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Repair {
    Init,
    MigrateState,
    MigrateManifest,
    RealignStep,
    Archive(PathBuf),
    AuxDocuments,
    RenameFeatureDir(PathBuf),
}

fn repair_for(config: &SpecflowConfig, code: IssueCode, path: Option<&Path>) -> Option<Repair> {
    let repair = match code {
        IssueCode::StateMissing => Repair::Init,
        IssueCode::SchemaOutdated if path == Some(config.paths.manifest.as_path()) => {
            Repair::MigrateManifest
        }
        IssueCode::SchemaOutdated => Repair::MigrateState,
        IssueCode::ManifestMissing => Repair::MigrateManifest,
        IssueCode::StepIndexMismatch => Repair::RealignStep,
        IssueCode::LegacyArtifact => Repair::Archive(path?.to_path_buf()),
        IssueCode::RoadmapMissing
        | IssueCode::BacklogMissing
        | IssueCode::HistoryMissing
        | IssueCode::MemoryMissing => Repair::AuxDocuments,
        IssueCode::FeatureDirPrefix => Repair::RenameFeatureDir(path?.to_path_buf()),
        _ => return None,
    };
    Some(repair)
}

/// Apply every repair the report asks for, once each, in report order.
///
/// A failing repair is recorded and the rest still run.
pub fn apply_fixes(config: &SpecflowConfig, report: &HealthReport) -> Vec<FixOutcome> {
    let mut planned: Vec<(IssueCode, Repair)> = Vec::new();
    for issue in report.issues.iter().filter(|i| i.auto_fixable) {
        if let Some(repair) = repair_for(config, issue.code, issue.path.as_deref())
            && !planned.iter().any(|(_, r)| *r == repair)
        {
            planned.push((issue.code, repair));
        }
    }

    planned
        .into_iter()
        .map(|(code, repair)| {
            match run(config, &repair) {
                Ok(message) => {
                    info!(code = %code, %message, "Applied fix");
                    FixOutcome {
                        code,
                        success: true,
                        message,
                    }
                }
                Err(e) => {
                    warn!(code = %code, error = %e, "Fix failed");
                    FixOutcome {
                        code,
                        success: false,
                        message: format!("{:#}", e),
                    }
                }
            }
        })
        .collect()
}

fn run(config: &SpecflowConfig, repair: &Repair) -> Result<String> {
    let paths = &config.paths;
    match repair {
        Repair::Init => {
            let result = init_project(config)?;
            Ok(format!("initialized project ({} files)", result.created_files.len()))
        }
        Repair::MigrateState => {
            let result = migrate_state_into(paths, &config.state_store(), &config.project_name());
            if !result.success {
                bail!("{}", result.summary());
            }
            Ok(result.summary())
        }
        Repair::MigrateManifest => {
            let result = migrate_manifest(paths, Some(&config.project_name()));
            if !result.success {
                bail!("{}", result.summary());
            }
            Ok(result.summary())
        }
        Repair::RealignStep => {
            let state = config.state_store().update(|state| {
                state.step.index = state.step.expected_index();
            })?;
            Ok(format!("step.index set to {}", state.step.index))
        }
        Repair::Archive(path) => archive(paths.archive_dir.as_path(), path),
        Repair::AuxDocuments => {
            let created = ensure_aux_documents(paths)?;
            let names: Vec<String> = created.iter().map(|p| p.display().to_string()).collect();
            Ok(format!("created {}", names.join(", ")))
        }
        Repair::RenameFeatureDir(dir) => rename_feature_dir(dir, config.prefix_width()),
    }
}

/// Move a legacy file into the archive under a timestamped name.
fn archive(archive_dir: &Path, path: &Path) -> Result<String> {
    fs::create_dir_all(archive_dir)
        .with_context(|| format!("Failed to create {}", archive_dir.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let target = archive_dir.join(format!(
        "{}.{}",
        name,
        Utc::now().format("%Y%m%dT%H%M%S")
    ));
    fs::rename(path, &target).with_context(|| {
        format!("Failed to move {} to {}", path.display(), target.display())
    })?;
    Ok(format!("archived {} to {}", path.display(), target.display()))
}

fn rename_feature_dir(dir: &Path, width: usize) -> Result<String> {
    let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
        bail!("{} has no usable name", dir.display());
    };
    let Some(prefix) = numeric_prefix(name) else {
        bail!("{} has no numeric prefix", dir.display());
    };
    let renamed = format!(
        "{:0>width$}{}",
        prefix,
        &name[prefix.len()..],
        width = width
    );
    let target = dir.with_file_name(&renamed);
    if target.exists() {
        bail!("{} already exists", target.display());
    }
    fs::rename(dir, &target)
        .with_context(|| format!("Failed to rename {}", dir.display()))?;
    Ok(format!("renamed specs/{} to specs/{}", name, renamed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{HealthContext, check_health};
    use crate::state::{HealthStatus, StateStore, StepName, StepStatus};
    use crate::tracker::StaticBranch;
    use tempfile::tempdir;

    fn report(config: &SpecflowConfig) -> HealthReport {
        let probe = StaticBranch(None);
        let mut ctx = HealthContext::from_config(config, &probe);
        ctx.templates_dir = None;
        check_health(&ctx)
    }

    #[test]
    fn test_fix_missing_state_initializes() {
        let dir = tempdir().unwrap();
        let config = SpecflowConfig::defaults(dir.path());
        let outcomes = apply_fixes(&config, &report(&config));

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].success);
        assert_eq!(outcomes[0].code, IssueCode::StateMissing);
        assert_eq!(report(&config).status, HealthStatus::Ready);
    }

    #[test]
    fn test_fix_repairs_drift_in_one_pass() {
        let dir = tempdir().unwrap();
        let config = SpecflowConfig::defaults(dir.path());
        init_project(&config).unwrap();
        let paths = &config.paths;

        StateStore::new(&paths.state)
            .update(|s| s.set_step(StepName::Analyze, StepStatus::InProgress))
            .unwrap();
        let mut raw = StateStore::new(&paths.state).read_value().unwrap();
        raw["step"]["index"] = serde_json::Value::from(3);
        fs::write(&paths.state, serde_json::to_string(&raw).unwrap()).unwrap();
        fs::remove_file(&paths.roadmap).unwrap();
        fs::remove_file(&paths.history_file).unwrap();
        fs::write(&paths.legacy_manifest, "{}").unwrap();
        fs::create_dir_all(paths.specs_dir.join("010-legacy")).unwrap();

        let before = report(&config);
        assert_eq!(before.status, HealthStatus::Warning);
        let outcomes = apply_fixes(&config, &before);
        assert!(outcomes.iter().all(|o| o.success), "{:#?}", outcomes);
        // Roadmap and history share one repair
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o.code, IssueCode::RoadmapMissing | IssueCode::HistoryMissing))
                .count(),
            1
        );

        let after = report(&config);
        assert_eq!(after.status, HealthStatus::Ready, "{:#?}", after.issues);
        assert!(paths.specs_dir.join("0010-legacy").is_dir());
        assert!(!paths.legacy_manifest.exists());
        assert_eq!(fs::read_dir(&paths.archive_dir).unwrap().count(), 1);
        assert_eq!(StateStore::new(&paths.state).read().unwrap().step.index, 1);
    }

    #[test]
    fn test_fix_migrates_legacy_state() {
        let dir = tempdir().unwrap();
        let config = SpecflowConfig::defaults(dir.path());
        fs::create_dir_all(&config.paths.knowledge_dir).unwrap();
        fs::write(
            &config.paths.legacy_state,
            r#"{"schema_version": "2.0", "project": {"id": "keep-me", "name": "old"}}"#,
        )
        .unwrap();

        let outcomes = apply_fixes(&config, &report(&config));
        assert!(outcomes.iter().any(|o| o.code == IssueCode::SchemaOutdated && o.success));
        let state = StateStore::new(&config.paths.state).read().unwrap();
        assert_eq!(state.project.id, "keep-me");
    }

    #[test]
    fn test_rename_refuses_to_clobber() {
        let dir = tempdir().unwrap();
        let specs = dir.path().join("specs");
        fs::create_dir_all(specs.join("010-a")).unwrap();
        fs::create_dir_all(specs.join("0010-a")).unwrap();
        assert!(rename_feature_dir(&specs.join("010-a"), 4).is_err());
        assert!(specs.join("010-a").is_dir());
    }
}
