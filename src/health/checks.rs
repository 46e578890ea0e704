//! The individual health checks, in the order they run.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use super::{HealthContext, HealthIssue, HealthReport, IssueCode};
use crate::dag::DagBuilder;
use crate::errors::ArtifactError;
use crate::init::memory_has_documents;
use crate::migrate::{MANIFEST_SCHEMA_VERSION, Manifest};
use crate::parsers::roadmap::read_roadmap;
use crate::parsers::tasks::{count_checkbox_lines, parse_tasks};
use crate::parsers::find_phase;
use crate::paths::resolve_active_feature_dir;
use crate::state::{
    OrchestrationState, PhaseStatus, STATE_SCHEMA_VERSION, StateStore, StepName, StepStatus,
    validate,
};
use crate::util::{is_newer_version, normalize_phase_number, numeric_prefix};

/// Files the design step must leave in the feature directory.
pub const DESIGN_ARTIFACTS: &[&str] = &["spec.md", "plan.md"];

/// The state document as the checks see it.
struct Loaded {
    source: PathBuf,
    raw: Value,
    /// Typed view; `None` when the document is outdated or does not fit the model
    state: Option<OrchestrationState>,
}

type Check = fn(&HealthContext<'_>, &Loaded) -> Result<Vec<HealthIssue>>;

const CHECKS: &[(&str, Check)] = &[
    ("schema", check_schema),
    ("step index", check_step_index),
    ("legacy artifacts", check_legacy_artifacts),
    ("documents", check_documents),
    ("templates", check_templates),
    ("feature directories", check_feature_dirs),
    ("roadmap", check_roadmap),
    ("branch", check_branch),
    ("design artifacts", check_design_artifacts),
    ("tasks", check_tasks),
    ("step status", check_step_status),
];

/// Run every check and collect the issues.
pub fn check_health(ctx: &HealthContext<'_>) -> HealthReport {
    let loaded = match load(ctx) {
        Ok(loaded) => loaded,
        Err(issue) => return HealthReport::new(vec![*issue]),
    };

    let mut issues = Vec::new();
    for (name, check) in CHECKS {
        match check(ctx, &loaded) {
            Ok(found) => {
                debug!(check = name, issues = found.len(), "Health check finished");
                issues.extend(found);
            }
            Err(e) => {
                warn!(check = name, error = %e, "Health check failed to run");
                issues.push(HealthIssue::warning(
                    IssueCode::CheckFailed,
                    format!("{} check could not run: {:#}", name, e),
                ));
            }
        }
    }
    HealthReport::new(issues)
}

fn load(ctx: &HealthContext<'_>) -> Result<Loaded, Box<HealthIssue>> {
    let source = ctx.paths.state_source().to_path_buf();
    let raw = match StateStore::new(&source).read_value() {
        Ok(raw) => raw,
        Err(ArtifactError::NotFound { .. }) => {
            return Err(Box::new(
                HealthIssue::error(IssueCode::StateMissing, "No orchestration state found")
                    .hint("Run `specflow init`")
                    .fixable()
                    .at(&ctx.paths.state),
            ));
        }
        Err(e) => {
            return Err(Box::new(
                HealthIssue::error(IssueCode::StateCorrupt, e.to_string())
                    .hint("Restore the file from version control or delete it and re-run `specflow init`")
                    .at(&source),
            ));
        }
    };
    let state = if source == ctx.paths.state && schema_version(&raw) == Some(STATE_SCHEMA_VERSION) {
        serde_json::from_value(raw.clone()).ok()
    } else {
        None
    };
    Ok(Loaded { source, raw, state })
}

fn schema_version(raw: &Value) -> Option<&str> {
    raw.get("schema_version")
        .or_else(|| raw.get("version"))
        .and_then(Value::as_str)
}

fn check_schema(ctx: &HealthContext<'_>, loaded: &Loaded) -> Result<Vec<HealthIssue>> {
    let version = schema_version(&loaded.raw).unwrap_or("none");
    if is_newer_version(version, STATE_SCHEMA_VERSION) {
        return Ok(vec![
            HealthIssue::error(
                IssueCode::SchemaTooNew,
                format!(
                    "State schema {} is newer than the supported {}",
                    version, STATE_SCHEMA_VERSION
                ),
            )
            .hint("Upgrade specflow; the document is left untouched")
            .at(&loaded.source),
        ]);
    }
    if loaded.source != ctx.paths.state {
        return Ok(vec![
            HealthIssue::error(
                IssueCode::SchemaOutdated,
                "State document is only present at the legacy location",
            )
            .hint("Run `specflow migrate`")
            .fixable()
            .at(&loaded.source),
        ]);
    }
    if version != STATE_SCHEMA_VERSION {
        return Ok(vec![
            HealthIssue::error(
                IssueCode::SchemaOutdated,
                format!(
                    "State schema {} is older than {}",
                    version, STATE_SCHEMA_VERSION
                ),
            )
            .hint("Run `specflow migrate`")
            .fixable()
            .at(&loaded.source),
        ]);
    }

    let mut issues: Vec<HealthIssue> = validate(&loaded.raw)
        .into_iter()
        .map(|v| {
            HealthIssue::error(IssueCode::StateFieldInvalid, v.to_string())
                .hint(format!("Correct it with `specflow set {} <value>`", v.path))
        })
        .collect();
    if issues.is_empty()
        && loaded.state.is_none()
        && let Err(e) = serde_json::from_value::<OrchestrationState>(loaded.raw.clone())
    {
        issues.push(HealthIssue::error(
            IssueCode::StateFieldInvalid,
            format!("State does not match the document model: {}", e),
        ));
    }
    Ok(issues)
}

fn check_step_index(_ctx: &HealthContext<'_>, loaded: &Loaded) -> Result<Vec<HealthIssue>> {
    let Some(state) = &loaded.state else {
        return Ok(Vec::new());
    };
    if state.step.index_consistent() {
        return Ok(Vec::new());
    }
    Ok(vec![
        HealthIssue::warning(
            IssueCode::StepIndexMismatch,
            format!(
                "step.index is {} but step.current implies {}",
                state.step.index,
                state.step.expected_index()
            ),
        )
        .hint("Run `specflow check --fix`")
        .fixable(),
    ])
}

fn check_legacy_artifacts(ctx: &HealthContext<'_>, _loaded: &Loaded) -> Result<Vec<HealthIssue>> {
    Ok(ctx
        .paths
        .legacy_duplicates()
        .into_iter()
        .map(|path| {
            HealthIssue::warning(
                IssueCode::LegacyArtifact,
                format!("Legacy copy {} shadows the current layout", path.display()),
            )
            .hint("Run `specflow check --fix` to move it into the archive")
            .fixable()
            .at(path)
        })
        .collect())
}

fn check_documents(ctx: &HealthContext<'_>, _loaded: &Loaded) -> Result<Vec<HealthIssue>> {
    let paths = ctx.paths;
    let mut issues = Vec::new();
    for (code, path, label) in [
        (IssueCode::RoadmapMissing, &paths.roadmap, "Roadmap"),
        (IssueCode::BacklogMissing, &paths.backlog, "Backlog"),
        (IssueCode::HistoryMissing, &paths.history_file, "History file"),
    ] {
        if !path.is_file() {
            issues.push(
                HealthIssue::warning(code, format!("{} {} is missing", label, path.display()))
                    .hint("Run `specflow check --fix` to create a stub")
                    .fixable()
                    .at(path),
            );
        }
    }
    if !memory_has_documents(paths) {
        issues.push(
            HealthIssue::warning(
                IssueCode::MemoryMissing,
                format!("No memory documents in {}", paths.memory_dir.display()),
            )
            .hint("Run `specflow check --fix` to create a constitution stub")
            .fixable()
            .at(&paths.memory_dir),
        );
    }

    if !paths.manifest.exists() {
        let detail = if paths.legacy_manifest.exists() {
            "Manifest exists only at the legacy location"
        } else {
            "Manifest is missing"
        };
        issues.push(
            HealthIssue::warning(IssueCode::ManifestMissing, detail)
                .hint("Run `specflow migrate`")
                .fixable()
                .at(&paths.manifest),
        );
    } else {
        let content = fs::read_to_string(&paths.manifest)
            .with_context(|| format!("Failed to read {}", paths.manifest.display()))?;
        match serde_json::from_str::<Manifest>(&content) {
            Ok(manifest) if manifest.is_current() => {}
            Ok(manifest) if is_newer_version(&manifest.schema_version, MANIFEST_SCHEMA_VERSION) => {
                issues.push(
                    HealthIssue::warning(
                        IssueCode::SchemaTooNew,
                        format!(
                            "Manifest schema {} is newer than the supported {}",
                            manifest.schema_version, MANIFEST_SCHEMA_VERSION
                        ),
                    )
                    .hint("Upgrade specflow")
                    .at(&paths.manifest),
                )
            }
            Ok(manifest) => issues.push(
                HealthIssue::warning(
                    IssueCode::SchemaOutdated,
                    format!("Manifest schema {} is outdated", manifest.schema_version),
                )
                .hint("Run `specflow migrate`")
                .fixable()
                .at(&paths.manifest),
            ),
            Err(e) => issues.push(
                HealthIssue::warning(
                    IssueCode::SchemaOutdated,
                    format!("Manifest is not in the current format: {}", e),
                )
                .hint("Run `specflow migrate`")
                .fixable()
                .at(&paths.manifest),
            ),
        }
    }
    Ok(issues)
}

fn check_templates(ctx: &HealthContext<'_>, _loaded: &Loaded) -> Result<Vec<HealthIssue>> {
    let Some(source) = ctx.templates_dir.as_deref().filter(|dir| dir.is_dir()) else {
        let shown = ctx
            .templates_dir
            .as_deref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "(no data directory)".to_string());
        return Ok(vec![HealthIssue::info(
            IssueCode::TemplateSourceUnavailable,
            format!("System template directory {} is not available", shown),
        )]);
    };

    let mut names: Vec<_> = fs::read_dir(source)
        .with_context(|| format!("Failed to list {}", source.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name())
        .collect();
    names.sort();

    Ok(names
        .into_iter()
        .filter(|name| !ctx.paths.templates_dir.join(name).exists())
        .map(|name| {
            let target = ctx.paths.templates_dir.join(&name);
            HealthIssue::warning(
                IssueCode::TemplateMissing,
                format!("Template {} is missing", name.to_string_lossy()),
            )
            .hint(format!(
                "Copy {} into {}",
                source.join(&name).display(),
                ctx.paths.templates_dir.display()
            ))
            .at(target)
        })
        .collect())
}

fn check_feature_dirs(ctx: &HealthContext<'_>, _loaded: &Loaded) -> Result<Vec<HealthIssue>> {
    let mut issues = Vec::new();
    for dir in ctx.paths.feature_dirs() {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(prefix) = numeric_prefix(name) else {
            continue;
        };
        if prefix.len() < ctx.prefix_width {
            issues.push(
                HealthIssue::warning(
                    IssueCode::FeatureDirPrefix,
                    format!(
                        "specs/{} uses a {}-digit prefix, expected {}",
                        name,
                        prefix.len(),
                        ctx.prefix_width
                    ),
                )
                .hint("Run `specflow check --fix` to rename it")
                .fixable()
                .at(&dir),
            );
        }
    }
    Ok(issues)
}

fn check_roadmap(ctx: &HealthContext<'_>, loaded: &Loaded) -> Result<Vec<HealthIssue>> {
    if !ctx.paths.roadmap.is_file() {
        return Ok(Vec::new());
    }
    let phases = match read_roadmap(&ctx.paths.roadmap) {
        Ok(phases) => phases,
        Err(ArtifactError::InvalidFormat { reason, .. }) => {
            return Ok(vec![
                HealthIssue::warning(
                    IssueCode::RoadmapUnparseable,
                    format!("Roadmap could not be parsed: {}", reason),
                )
                .hint("Add a table with Phase and Status columns")
                .at(&ctx.paths.roadmap),
            ]);
        }
        Err(e) => return Err(e.into()),
    };

    let mut issues = Vec::new();
    let in_progress: Vec<&str> = phases
        .iter()
        .filter(|p| p.status == PhaseStatus::InProgress)
        .map(|p| p.number.as_str())
        .collect();
    if in_progress.len() > 1 {
        issues.push(HealthIssue::warning(
            IssueCode::MultipleInProgress,
            format!("Roadmap marks several phases in progress: {}", in_progress.join(", ")),
        ));
    }

    let Some(state) = &loaded.state else {
        return Ok(issues);
    };
    let Some(number) = state.phase.number.as_deref().filter(|_| state.phase.is_active()) else {
        return Ok(issues);
    };
    match find_phase(&phases, number) {
        None => issues.push(
            HealthIssue::warning(
                IssueCode::RoadmapPhaseMissing,
                format!("Active phase {} has no roadmap row", number),
            )
            .hint("Add the phase to ROADMAP.md"),
        ),
        Some(row) if row.status == state.phase.status => {}
        Some(row) if row.status == PhaseStatus::Complete => issues.push(
            HealthIssue::warning(
                IssueCode::RoadmapDrift,
                format!(
                    "Roadmap marks phase {} complete but state says {}",
                    number, state.phase.status
                ),
            )
            .hint("Close the phase with `specflow phase close`"),
        ),
        Some(row) => issues.push(HealthIssue::info(
            IssueCode::RoadmapDrift,
            format!(
                "Roadmap marks phase {} {} while state says {}",
                number, row.status, state.phase.status
            ),
        )),
    }
    Ok(issues)
}

fn check_branch(ctx: &HealthContext<'_>, loaded: &Loaded) -> Result<Vec<HealthIssue>> {
    let branch = match ctx.probe.current_branch(&ctx.paths.root) {
        Ok(Some(branch)) => branch,
        Ok(None) => {
            return Ok(vec![HealthIssue::info(
                IssueCode::VcsUnavailable,
                "HEAD is detached; branch checks skipped",
            )]);
        }
        Err(e) => {
            return Ok(vec![HealthIssue::info(
                IssueCode::VcsUnavailable,
                format!("Branch could not be determined: {:#}", e),
            )]);
        }
    };
    let Some(state) = &loaded.state else {
        return Ok(Vec::new());
    };
    let Some(number) = state.phase.number.as_deref().filter(|_| state.phase.is_active()) else {
        return Ok(Vec::new());
    };

    if ctx.trunk_branches.iter().any(|t| *t == branch) {
        return Ok(vec![HealthIssue::info(
            IssueCode::OnTrunk,
            format!("On trunk branch {} while phase {} is active", branch, number),
        )]);
    }

    let drifted = match state.phase.branch.as_deref() {
        Some(expected) => expected != branch,
        None => numeric_prefix(&branch)
            .map(|prefix| normalize_phase_number(prefix) != normalize_phase_number(number))
            .unwrap_or(true),
    };
    if !drifted {
        return Ok(Vec::new());
    }
    let expected = state
        .phase
        .branch
        .clone()
        .unwrap_or_else(|| format!("{}-*", number));
    Ok(vec![
        HealthIssue::warning(
            IssueCode::BranchDrift,
            format!("Checked out {} but phase {} expects {}", branch, number, expected),
        )
        .hint(format!("Switch to {}", expected)),
    ])
}

/// Steps past design must find the design outputs in the feature directory.
fn check_design_artifacts(ctx: &HealthContext<'_>, loaded: &Loaded) -> Result<Vec<HealthIssue>> {
    let Some(state) = &loaded.state else {
        return Ok(Vec::new());
    };
    let past_design = state
        .step
        .current
        .is_some_and(|step| step.index() > StepName::Design.index());
    if !state.phase.is_active() || !past_design {
        return Ok(Vec::new());
    }

    let Some(feature_dir) = resolve_active_feature_dir(ctx.paths, state.phase.number.as_deref())
    else {
        return Ok(vec![
            HealthIssue::warning(
                IssueCode::DesignArtifactsMissing,
                format!(
                    "No feature directory for phase {}",
                    state.phase.number.as_deref().unwrap_or_default()
                ),
            )
            .hint("Return to the design step"),
        ]);
    };
    let missing: Vec<&str> = DESIGN_ARTIFACTS
        .iter()
        .copied()
        .filter(|name| !feature_dir.join(name).is_file())
        .collect();
    if missing.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![
        HealthIssue::warning(
            IssueCode::DesignArtifactsMissing,
            format!(
                "{} is missing {}",
                feature_dir.display(),
                missing.join(", ")
            ),
        )
        .hint("Return to the design step")
        .at(&feature_dir),
    ])
}

fn check_tasks(ctx: &HealthContext<'_>, loaded: &Loaded) -> Result<Vec<HealthIssue>> {
    let Some(state) = &loaded.state else {
        return Ok(Vec::new());
    };
    if !state.phase.is_active() {
        return Ok(Vec::new());
    }
    let Some(feature_dir) = resolve_active_feature_dir(ctx.paths, state.phase.number.as_deref())
    else {
        return Ok(Vec::new());
    };
    let tasks_file = feature_dir.join("tasks.md");
    if !tasks_file.is_file() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(&tasks_file)
        .with_context(|| format!("Failed to read {}", tasks_file.display()))?;
    let tasks = parse_tasks(&content);
    if tasks.is_empty() {
        let checkboxes = count_checkbox_lines(&content);
        return Ok(vec![
            HealthIssue::warning(
                IssueCode::TasksUnparsed,
                format!(
                    "{} has {} checkbox lines but no task carries a T### identifier",
                    tasks_file.display(),
                    checkboxes
                ),
            )
            .hint("Prefix each task with an identifier such as T001")
            .at(&tasks_file),
        ]);
    }

    let graph = DagBuilder::new(&tasks).build();
    let mut issues: Vec<HealthIssue> = graph
        .find_cycles()
        .into_iter()
        .map(|cycle| {
            HealthIssue::warning(
                IssueCode::TaskCycle,
                format!("Task dependency cycle: {}", cycle.describe()),
            )
            .hint("Remove one of the dependencies")
            .at(&tasks_file)
        })
        .collect();
    issues.extend(graph.unknown_dependencies().iter().map(|dep| {
        HealthIssue::warning(
            IssueCode::TaskDependencyUnknown,
            format!("{} depends on {}, which is not in the task list", dep.task, dep.missing),
        )
        .hint("Fix the task id or remove the reference")
        .at(&tasks_file)
    }));
    issues.extend(graph.duplicate_ids().iter().map(|id| {
        HealthIssue::warning(
            IssueCode::TaskDuplicateId,
            format!("Task id {} is used more than once", id),
        )
        .hint("Give every task a unique id")
        .at(&tasks_file)
    }));
    Ok(issues)
}

fn check_step_status(_ctx: &HealthContext<'_>, loaded: &Loaded) -> Result<Vec<HealthIssue>> {
    let Some(state) = &loaded.state else {
        return Ok(Vec::new());
    };
    if !matches!(state.step.status, StepStatus::Blocked | StepStatus::Failed) {
        return Ok(Vec::new());
    }
    let step = state
        .step
        .current
        .map(|s| s.as_str())
        .unwrap_or("(none)");
    Ok(vec![
        HealthIssue::warning(
            IssueCode::StepBlocked,
            format!("Step {} is {}", step, state.step.status),
        )
        .hint("Resolve the blocker, then `specflow set step.status in_progress`"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecflowConfig;
    use crate::health::{Severity, SuggestedAction};
    use crate::init::init_project;
    use crate::paths::{ProjectPaths, resolve_paths};
    use crate::state::{HealthStatus, StateStore};
    use crate::tracker::StaticBranch;
    use std::path::Path;
    use tempfile::tempdir;

    fn ctx<'a>(paths: &'a ProjectPaths, probe: &'a StaticBranch) -> HealthContext<'a> {
        HealthContext {
            paths,
            trunk_branches: vec!["main".to_string()],
            templates_dir: None,
            prefix_width: 4,
            probe,
        }
    }

    fn initialized(dir: &Path) -> ProjectPaths {
        let config = SpecflowConfig::defaults(dir);
        init_project(&config).unwrap();
        config.paths
    }

    fn start_phase(paths: &ProjectPaths, number: &str, branch: &str) {
        StateStore::new(&paths.state)
            .update(|s| s.start_phase(number, "Engine", Some(branch), false))
            .unwrap();
    }

    fn codes(report: &HealthReport) -> Vec<IssueCode> {
        report.issues.iter().map(|i| i.code).collect()
    }

    #[test]
    fn test_missing_state_is_single_fatal_error() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        let probe = StaticBranch(Some("main".into()));
        let report = check_health(&ctx(&paths, &probe));

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].code, IssueCode::StateMissing);
        assert_eq!(report.issues[0].severity, Severity::Error);
        assert_eq!(report.status, HealthStatus::Error);
        assert_eq!(report.suggested_action(), SuggestedAction::RunAutofix);
    }

    #[test]
    fn test_corrupt_state_stops_the_run() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        fs::create_dir_all(&paths.ops_dir).unwrap();
        fs::write(&paths.state, "{not json").unwrap();
        let probe = StaticBranch(None);
        let report = check_health(&ctx(&paths, &probe));
        assert_eq!(codes(&report), [IssueCode::StateCorrupt]);
        assert_eq!(report.suggested_action(), SuggestedAction::ManualFix);
    }

    #[test]
    fn test_initialized_project_is_ready() {
        let dir = tempdir().unwrap();
        let paths = initialized(dir.path());
        let probe = StaticBranch(Some("main".into()));
        let report = check_health(&ctx(&paths, &probe));

        assert_eq!(report.status, HealthStatus::Ready, "{:#?}", report.issues);
        assert_eq!(report.count(Severity::Error), 0);
        assert_eq!(report.count(Severity::Warning), 0);
        assert!(report.has_code(IssueCode::TemplateSourceUnavailable));
    }

    #[test]
    fn test_legacy_only_state_is_outdated() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        fs::create_dir_all(&paths.knowledge_dir).unwrap();
        fs::write(
            &paths.legacy_state,
            r#"{"schema_version": "2.0", "project": {"id": "x", "name": "y"}}"#,
        )
        .unwrap();
        let probe = StaticBranch(None);
        let report = check_health(&ctx(&paths, &probe));
        let outdated = report
            .issues
            .iter()
            .find(|i| i.code == IssueCode::SchemaOutdated)
            .unwrap();
        assert!(outdated.auto_fixable);
        assert_eq!(report.suggested_action(), SuggestedAction::RunAutofix);
    }

    #[test]
    fn test_newer_schema_is_not_fixable() {
        let dir = tempdir().unwrap();
        let paths = initialized(dir.path());
        let mut doc: Value =
            serde_json::from_str(&fs::read_to_string(&paths.state).unwrap()).unwrap();
        doc["schema_version"] = Value::from("4.0");
        fs::write(&paths.state, doc.to_string()).unwrap();

        let probe = StaticBranch(None);
        let report = check_health(&ctx(&paths, &probe));
        let too_new = report
            .issues
            .iter()
            .find(|i| i.code == IssueCode::SchemaTooNew)
            .unwrap();
        assert_eq!(too_new.severity, Severity::Error);
        assert!(!too_new.auto_fixable);
        assert!(!report.has_code(IssueCode::SchemaOutdated));
        assert_eq!(report.suggested_action(), SuggestedAction::ManualFix);
    }

    #[test]
    fn test_invalid_field_and_step_mismatch() {
        let dir = tempdir().unwrap();
        let paths = initialized(dir.path());
        let store = StateStore::new(&paths.state);
        let mut raw = store.read_value().unwrap();
        raw["step"]["current"] = Value::String("implement".into());
        raw["step"]["index"] = Value::from(1);
        fs::write(&paths.state, serde_json::to_string(&raw).unwrap()).unwrap();

        let probe = StaticBranch(None);
        let report = check_health(&ctx(&paths, &probe));
        assert!(report.has_code(IssueCode::StepIndexMismatch));

        raw["health"]["status"] = Value::String("bogus".into());
        fs::write(&paths.state, serde_json::to_string(&raw).unwrap()).unwrap();
        let report = check_health(&ctx(&paths, &probe));
        assert!(report.has_code(IssueCode::StateFieldInvalid));
        assert!(report.has_errors());
    }

    #[test]
    fn test_missing_documents_and_legacy_duplicates() {
        let dir = tempdir().unwrap();
        let paths = initialized(dir.path());
        fs::remove_file(&paths.backlog).unwrap();
        fs::write(&paths.legacy_state, "{}").unwrap();

        let probe = StaticBranch(None);
        let report = check_health(&ctx(&paths, &probe));
        assert!(report.has_code(IssueCode::BacklogMissing));
        assert!(report.has_code(IssueCode::LegacyArtifact));
        assert_eq!(report.status, HealthStatus::Warning);
        assert_eq!(report.suggested_action(), SuggestedAction::RunAutofix);
    }

    #[test]
    fn test_short_feature_prefix_reported() {
        let dir = tempdir().unwrap();
        let paths = initialized(dir.path());
        fs::create_dir_all(paths.specs_dir.join("010-legacy")).unwrap();
        fs::create_dir_all(paths.specs_dir.join("0020-current")).unwrap();

        let probe = StaticBranch(None);
        let report = check_health(&ctx(&paths, &probe));
        let prefixed: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.code == IssueCode::FeatureDirPrefix)
            .collect();
        assert_eq!(prefixed.len(), 1);
        assert!(prefixed[0].path.as_ref().unwrap().ends_with("010-legacy"));
    }

    #[test]
    fn test_roadmap_drift_and_branch_drift() {
        let dir = tempdir().unwrap();
        let paths = initialized(dir.path());
        fs::write(
            &paths.roadmap,
            "| Phase | Name | Status |\n|---|---|---|\n| 0010 | Engine | ✅ Complete |\n| 0020 | A | 🔄 |\n| 0030 | B | 🔄 |\n",
        )
        .unwrap();
        start_phase(&paths, "0010", "0010-engine");

        let probe = StaticBranch(Some("0020-other".into()));
        let report = check_health(&ctx(&paths, &probe));
        let drift = report
            .issues
            .iter()
            .find(|i| i.code == IssueCode::RoadmapDrift)
            .unwrap();
        assert_eq!(drift.severity, Severity::Warning);
        assert!(report.has_code(IssueCode::MultipleInProgress));
        assert!(report.has_code(IssueCode::BranchDrift));
    }

    #[test]
    fn test_trunk_is_informational() {
        let dir = tempdir().unwrap();
        let paths = initialized(dir.path());
        start_phase(&paths, "0010", "0010-engine");
        fs::write(
            &paths.roadmap,
            "| Phase | Name | Status |\n|---|---|---|\n| 0010 | Engine | In Progress |\n",
        )
        .unwrap();

        let probe = StaticBranch(Some("main".into()));
        let report = check_health(&ctx(&paths, &probe));
        let trunk = report
            .issues
            .iter()
            .find(|i| i.code == IssueCode::OnTrunk)
            .unwrap();
        assert_eq!(trunk.severity, Severity::Info);
        assert!(!report.has_code(IssueCode::BranchDrift));
        assert!(!report.has_code(IssueCode::RoadmapDrift));
    }

    #[test]
    fn test_phase_missing_from_roadmap() {
        let dir = tempdir().unwrap();
        let paths = initialized(dir.path());
        start_phase(&paths, "0040", "0040-x");
        let probe = StaticBranch(Some("0040-x".into()));
        let report = check_health(&ctx(&paths, &probe));
        assert!(report.has_code(IssueCode::RoadmapPhaseMissing));
        assert!(!report.has_code(IssueCode::BranchDrift));
    }

    #[test]
    fn test_unparseable_roadmap_does_not_abort_other_checks() {
        let dir = tempdir().unwrap();
        let paths = initialized(dir.path());
        fs::write(&paths.roadmap, "just prose").unwrap();
        fs::remove_file(&paths.backlog).unwrap();
        let probe = StaticBranch(None);
        let report = check_health(&ctx(&paths, &probe));
        assert!(report.has_code(IssueCode::RoadmapUnparseable));
        assert!(report.has_code(IssueCode::BacklogMissing));
        assert!(report.has_code(IssueCode::VcsUnavailable));
    }

    #[test]
    fn test_design_artifacts_tasks_and_cycles() {
        let dir = tempdir().unwrap();
        let paths = initialized(dir.path());
        StateStore::new(&paths.state)
            .update(|s| {
                s.start_phase("0010", "Engine", Some("0010-engine"), false);
                s.set_step(StepName::Implement, StepStatus::Blocked);
            })
            .unwrap();
        let feature = paths.specs_dir.join("0010-engine");
        fs::create_dir_all(&feature).unwrap();
        fs::write(feature.join("spec.md"), "# Spec").unwrap();
        fs::write(feature.join("tasks.md"), "- [ ] write code\n- [x] plan\n").unwrap();

        let probe = StaticBranch(Some("0010-engine".into()));
        let report = check_health(&ctx(&paths, &probe));
        assert!(report.has_code(IssueCode::DesignArtifactsMissing));
        assert!(report.has_code(IssueCode::TasksUnparsed));
        assert!(report.has_code(IssueCode::StepBlocked));

        fs::write(feature.join("plan.md"), "# Plan").unwrap();
        fs::write(
            feature.join("tasks.md"),
            "- [ ] T001 a (depends on T002)\n- [ ] T002 b (depends on T001)\n",
        )
        .unwrap();
        let report = check_health(&ctx(&paths, &probe));
        assert!(!report.has_code(IssueCode::DesignArtifactsMissing));
        assert!(!report.has_code(IssueCode::TasksUnparsed));
        assert!(report.has_code(IssueCode::TaskCycle));
        assert!(!report.has_code(IssueCode::TaskDependencyUnknown));

        fs::write(
            feature.join("tasks.md"),
            "- [ ] T001 a (depends on T009)\n- [ ] T002 b\n- [ ] T002 again\n",
        )
        .unwrap();
        let report = check_health(&ctx(&paths, &probe));
        let dangling = report
            .issues
            .iter()
            .find(|i| i.code == IssueCode::TaskDependencyUnknown)
            .unwrap();
        assert!(dangling.message.contains("T009"));
        assert!(report.has_code(IssueCode::TaskDuplicateId));
        assert!(!report.has_code(IssueCode::TaskCycle));
    }

    #[test]
    fn test_template_gaps_reported_when_source_exists() {
        let dir = tempdir().unwrap();
        let paths = initialized(dir.path());
        let source = dir.path().join("system-templates");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("spec-template.md"), "x").unwrap();
        fs::write(source.join("plan-template.md"), "x").unwrap();
        fs::write(paths.templates_dir.join("plan-template.md"), "x").unwrap();

        let probe = StaticBranch(None);
        let mut context = ctx(&paths, &probe);
        context.templates_dir = Some(source);
        let report = check_health(&context);
        let missing: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.code == IssueCode::TemplateMissing)
            .collect();
        assert_eq!(missing.len(), 1);
        assert!(!missing[0].auto_fixable);
        assert!(!report.has_code(IssueCode::TemplateSourceUnavailable));
    }
}
