//! State document migration.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::str::FromStr;
use tracing::{debug, info};

use super::MigrationResult;
use super::history::{extract_history_from_roadmap, merge_history};
use crate::parsers::roadmap::match_status;
use crate::paths::ProjectPaths;
use crate::state::{
    GateStatus, HistoryEntry, HistoryKind, MigrationRecord, OrchestrationState, PhaseState,
    PhaseStatus, STATE_SCHEMA_VERSION, StateStore, StepName, StepState, StepStatus,
};
use crate::util::{is_newer_version, normalize_phase_number};

fn str_at<'a>(doc: &'a Value, pointers: &[&str]) -> Option<&'a str> {
    pointers
        .iter()
        .find_map(|p| doc.pointer(p).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// A string or number field, rendered as text (phase numbers were numeric
/// in some older documents).
fn text_at(doc: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| match doc.pointer(p)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn legacy_phase(doc: &Value) -> PhaseState {
    let base = ["/phase", "/current/phase", "/current_phase"]
        .iter()
        .find_map(|p| doc.pointer(p).filter(|v| v.is_object()));
    let Some(phase) = base else {
        return PhaseState::default();
    };

    let status = str_at(phase, &["/status"])
        .map(|s| {
            PhaseStatus::from_str(s)
                .ok()
                .or_else(|| match_status(s))
                .unwrap_or_default()
        })
        .unwrap_or_default();

    PhaseState {
        number: text_at(phase, &["/number", "/id"]).map(|n| normalize_phase_number(&n)),
        name: str_at(phase, &["/name", "/title"]).map(str::to_string),
        branch: str_at(phase, &["/branch"]).map(str::to_string),
        status,
        has_user_gate: phase
            .get("has_user_gate")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

fn legacy_step(doc: &Value) -> StepState {
    let raw = ["/step", "/current/step", "/current_step"]
        .iter()
        .find_map(|p| doc.pointer(p).filter(|v| !v.is_null()));
    let (name, status) = match raw {
        Some(Value::String(s)) => (Some(s.as_str()), None),
        Some(obj @ Value::Object(_)) => (
            str_at(obj, &["/current", "/name"]),
            str_at(obj, &["/status"]),
        ),
        _ => (None, None),
    };

    let current = name.and_then(|n| StepName::from_str(n).ok());
    if name.is_some() && current.is_none() {
        debug!(step = ?name, "Dropping unrecognized legacy step name");
    }
    StepState {
        current,
        index: current.map(StepName::index).unwrap_or(0),
        status: status
            .and_then(|s| StepStatus::from_str(s).ok())
            .unwrap_or(if current.is_some() {
                StepStatus::InProgress
            } else {
                StepStatus::NotStarted
            }),
    }
}

fn legacy_history(doc: &Value, now: DateTime<Utc>) -> Vec<HistoryEntry> {
    let Some(items) = ["/actions/history", "/history", "/completed_phases"]
        .iter()
        .find_map(|p| doc.pointer(p).and_then(Value::as_array))
    else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let number = text_at(item, &["/phase_number", "/number", "/phase"])?;
            let completed_at = str_at(item, &["/completed_at", "/date", "/timestamp"])
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or(now);
            Some(HistoryEntry {
                kind: str_at(item, &["/type"])
                    .and_then(|t| HistoryKind::from_str(t).ok())
                    .unwrap_or(HistoryKind::PhaseCompleted),
                phase_number: normalize_phase_number(&number),
                phase_name: str_at(item, &["/phase_name", "/name"])
                    .unwrap_or_default()
                    .to_string(),
                branch: str_at(item, &["/branch"]).map(str::to_string),
                completed_at,
            })
        })
        .collect()
}

fn legacy_gates(doc: &Value) -> BTreeMap<String, GateStatus> {
    doc.get("gates")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| {
                    let status = GateStatus::from_str(v.as_str()?).ok()?;
                    Some((normalize_phase_number(k), status))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Build a current-schema state from any older document shape.
///
/// Every field with a direct counterpart is carried over; identity is kept
/// when present so the project id stays stable across migrations.
pub(crate) fn upgrade_document(
    doc: &Value,
    paths: &ProjectPaths,
    fallback_name: &str,
    now: DateTime<Utc>,
) -> (OrchestrationState, String) {
    let from = str_at(doc, &["/schema_version", "/version"])
        .unwrap_or("1.0")
        .to_string();

    let name = str_at(
        doc,
        &["/project/name", "/config/project_name", "/project_name"],
    )
    .unwrap_or(fallback_name);
    let mut state = OrchestrationState::new(name, &paths.root.to_string_lossy());
    if let Some(id) = str_at(doc, &["/project/id", "/project_id"]) {
        state.project.id = id.to_string();
    }
    if let Some(path) = str_at(doc, &["/project/path"]) {
        state.project.path = path.to_string();
    }

    state.phase = legacy_phase(doc);
    state.step = legacy_step(doc);
    state.actions.history = merge_history(&[], legacy_history(doc, now));
    state.gates = legacy_gates(doc);
    if let Some(records) = doc.get("migrations")
        && let Ok(records) = serde_json::from_value::<Vec<MigrationRecord>>(records.clone())
    {
        state.migrations = records;
    }
    state.migrations.push(MigrationRecord {
        from: from.clone(),
        to: STATE_SCHEMA_VERSION.to_string(),
        date: now,
    });
    (state, from)
}

enum Plan {
    Skip(String),
    Write {
        state: OrchestrationState,
        details: Vec<String>,
        created: bool,
    },
}

fn plan(paths: &ProjectPaths, project_name: &str) -> Result<Plan, String> {
    let now = Utc::now();
    let recovered = extract_history_from_roadmap(paths);
    let source = paths.state_source();

    if !source.exists() {
        let mut state = OrchestrationState::new(project_name, &paths.root.to_string_lossy());
        let count = recovered.len();
        state.actions.history = merge_history(&[], recovered);
        return Ok(Plan::Write {
            state,
            details: vec![
                format!("created {}", paths.state.display()),
                format!("recovered {} history entries from roadmap", count),
            ],
            created: true,
        });
    }

    let content = fs::read_to_string(source)
        .map_err(|e| format!("Failed to read {}: {}", source.display(), e))?;
    let doc: Value = serde_json::from_str(&content)
        .map_err(|e| format!("State {} is not valid JSON: {}", source.display(), e))?;

    if let Some(version) = str_at(&doc, &["/schema_version", "/version"])
        && is_newer_version(version, STATE_SCHEMA_VERSION)
    {
        return Err(format!(
            "State {} has schema {}, newer than supported {}; upgrade specflow instead",
            source.display(),
            version,
            STATE_SCHEMA_VERSION
        ));
    }

    let at_current = source == paths.state
        && str_at(&doc, &["/schema_version"]) == Some(STATE_SCHEMA_VERSION);

    if at_current {
        let has_history = doc
            .pointer("/actions/history")
            .and_then(Value::as_array)
            .is_some_and(|h| !h.is_empty());
        if has_history || recovered.is_empty() {
            return Ok(Plan::Skip(format!(
                "state already at schema {}",
                STATE_SCHEMA_VERSION
            )));
        }
        let mut state: OrchestrationState = serde_json::from_value(doc).map_err(|e| {
            format!(
                "State {} does not match schema {}: {}",
                source.display(),
                STATE_SCHEMA_VERSION,
                e
            )
        })?;
        let count = recovered.len();
        state.actions.history = merge_history(&state.actions.history, recovered);
        return Ok(Plan::Write {
            state,
            details: vec![format!("recovered {} history entries from roadmap", count)],
            created: false,
        });
    }

    let (mut state, from) = upgrade_document(&doc, paths, project_name, now);
    let before = state.actions.history.len();
    state.actions.history = merge_history(&state.actions.history, recovered);
    let mut details = vec![format!("state {} -> {}", from, STATE_SCHEMA_VERSION)];
    if source != paths.state {
        details.push(format!(
            "moved from {} to {}",
            source.display(),
            paths.state.display()
        ));
    }
    if state.actions.history.len() > before {
        details.push(format!(
            "recovered {} history entries from roadmap",
            state.actions.history.len() - before
        ));
    }
    Ok(Plan::Write {
        state,
        details,
        created: false,
    })
}

/// Describe what [`migrate_state`] would do without writing anything.
pub fn preview_state_migration(paths: &ProjectPaths, project_name: &str) -> MigrationResult {
    match plan(paths, project_name) {
        Ok(Plan::Skip(detail)) => MigrationResult::skipped(detail),
        Ok(Plan::Write {
            details, created, ..
        }) => {
            if created {
                MigrationResult::created(details)
            } else {
                MigrationResult::migrated(details)
            }
        }
        Err(e) => MigrationResult::failed(e),
    }
}

/// Upgrade the state document to the current schema and location.
///
/// Skips when the document is already current and either carries history
/// or there is nothing to recover, so a second run is always a no-op.
pub fn migrate_state(paths: &ProjectPaths, project_name: &str) -> MigrationResult {
    migrate_state_into(paths, &StateStore::new(&paths.state), project_name)
}

/// [`migrate_state`] writing through a caller-configured store.
pub fn migrate_state_into(
    paths: &ProjectPaths,
    store: &StateStore,
    project_name: &str,
) -> MigrationResult {
    let plan = match plan(paths, project_name) {
        Ok(plan) => plan,
        Err(e) => return MigrationResult::failed(e),
    };
    match plan {
        Plan::Skip(detail) => MigrationResult::skipped(detail),
        Plan::Write {
            mut state,
            details,
            created,
        } => match store.write(&mut state) {
            Ok(()) => {
                info!(path = %store.path().display(), created, "Migrated orchestration state");
                if created {
                    MigrationResult::created(details)
                } else {
                    MigrationResult::migrated(details)
                }
            }
            Err(e) => MigrationResult::failed(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::MigrationAction;
    use crate::paths::resolve_paths;
    use serde_json::json;
    use tempfile::tempdir;

    const ROADMAP: &str = "\
| Phase | Name | Status | Gate |
|---|---|---|---|
| 0010 | Foundation | ✅ Complete | |
| 0020 | Engine | 🔄 In Progress | |
";

    fn write_legacy(paths: &ProjectPaths, doc: Value) {
        fs::create_dir_all(&paths.knowledge_dir).unwrap();
        fs::write(&paths.legacy_state, doc.to_string()).unwrap();
    }

    #[test]
    fn test_v2_state_upgraded_preserving_fields() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        write_legacy(
            &paths,
            json!({
                "schema_version": "2.1",
                "project": {"id": "keep-me", "name": "legacy"},
                "current": {
                    "phase": {"number": 20, "name": "Engine", "branch": "020-engine", "status": "in-progress"},
                    "step": {"current": "implement", "status": "in_progress"}
                },
                "gates": {"010": "approved"},
                "history": [{"phase_number": "010", "name": "Foundation", "completed_at": "2025-01-02T03:04:05Z"}]
            }),
        );

        let result = migrate_state(&paths, "fallback");
        assert_eq!(result.action, MigrationAction::Migrated, "{:?}", result);

        let state = StateStore::new(&paths.state).read().unwrap();
        assert!(state.is_current_schema());
        assert_eq!(state.project.id, "keep-me");
        assert_eq!(state.project.name, "legacy");
        assert_eq!(state.phase.number.as_deref(), Some("0020"));
        assert_eq!(state.phase.status, PhaseStatus::InProgress);
        assert_eq!(state.step.current, Some(StepName::Implement));
        assert_eq!(state.step.index, 2);
        assert_eq!(state.gates.get("0010"), Some(&GateStatus::Approved));
        assert_eq!(state.actions.history.len(), 1);
        assert_eq!(
            state.actions.history[0].completed_at.to_rfc3339(),
            "2025-01-02T03:04:05+00:00"
        );
        assert_eq!(state.migrations.last().unwrap().from, "2.1");
    }

    #[test]
    fn test_newer_schema_is_left_untouched() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        fs::create_dir_all(&paths.ops_dir).unwrap();
        let doc = json!({
            "schema_version": "4.0",
            "project": {"id": "future", "name": "demo"},
            "last_updated": "2026-01-01T00:00:00Z",
            "future_field": {"kept": true}
        });
        fs::write(&paths.state, doc.to_string()).unwrap();

        let preview = preview_state_migration(&paths, "demo");
        assert_eq!(preview.action, MigrationAction::Failed);

        let result = migrate_state(&paths, "demo");
        assert_eq!(result.action, MigrationAction::Failed);
        assert!(result.error.unwrap().contains("newer"));

        let after: Value = serde_json::from_str(&fs::read_to_string(&paths.state).unwrap()).unwrap();
        assert_eq!(after, doc);
    }

    #[test]
    fn test_migration_is_idempotent() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        fs::write(&paths.roadmap, ROADMAP).unwrap();
        write_legacy(&paths, json!({"version": "1.0", "project_name": "old"}));

        let first = migrate_state(&paths, "demo");
        assert!(first.success);
        let written = fs::read_to_string(&paths.state).unwrap();

        let second = migrate_state(&paths, "demo");
        assert_eq!(second.action, MigrationAction::Skipped);
        assert_eq!(fs::read_to_string(&paths.state).unwrap(), written);
    }

    #[test]
    fn test_history_recovered_from_roadmap() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        fs::write(&paths.roadmap, ROADMAP).unwrap();
        write_legacy(&paths, json!({"project_name": "old"}));

        migrate_state(&paths, "demo");
        let state = StateStore::new(&paths.state).read().unwrap();
        assert_eq!(state.project.name, "old");
        assert_eq!(state.actions.history.len(), 1);
        assert_eq!(state.actions.history[0].phase_number, "0010");
        assert_eq!(state.migrations[0].from, "1.0");
    }

    #[test]
    fn test_current_state_without_history_gets_backfilled_once() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        fs::write(&paths.roadmap, ROADMAP).unwrap();
        let store = StateStore::new(&paths.state);
        store
            .write(&mut OrchestrationState::new("demo", ""))
            .unwrap();

        let first = migrate_state(&paths, "demo");
        assert_eq!(first.action, MigrationAction::Migrated);
        assert_eq!(store.read().unwrap().actions.history.len(), 1);
        assert!(store.read().unwrap().migrations.is_empty());

        assert_eq!(
            migrate_state(&paths, "demo").action,
            MigrationAction::Skipped
        );
    }

    #[test]
    fn test_current_state_without_roadmap_is_skipped() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        let store = StateStore::new(&paths.state);
        store
            .write(&mut OrchestrationState::new("demo", ""))
            .unwrap();
        assert_eq!(
            migrate_state(&paths, "demo").action,
            MigrationAction::Skipped
        );
    }

    #[test]
    fn test_missing_state_is_created() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        let result = migrate_state(&paths, "fresh");
        assert_eq!(result.action, MigrationAction::Created);
        assert_eq!(
            StateStore::new(&paths.state).read().unwrap().project.name,
            "fresh"
        );
    }

    #[test]
    fn test_corrupt_state_fails_without_writing() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        fs::create_dir_all(&paths.knowledge_dir).unwrap();
        fs::write(&paths.legacy_state, "not json").unwrap();
        let result = migrate_state(&paths, "demo");
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not valid JSON"));
        assert!(!paths.state.exists());
    }

    #[test]
    fn test_preview_writes_nothing() {
        let dir = tempdir().unwrap();
        let paths = resolve_paths(dir.path());
        write_legacy(&paths, json!({"schema_version": "2.0"}));
        let result = preview_state_migration(&paths, "demo");
        assert_eq!(result.action, MigrationAction::Migrated);
        assert!(!paths.state.exists());
    }

    #[test]
    fn test_string_step_and_unknown_values() {
        let doc = json!({
            "step": "analyze",
            "phase": {"number": "7", "status": "🚫 blocked"}
        });
        let dir = tempdir().unwrap();
        let (state, from) = upgrade_document(&doc, &resolve_paths(dir.path()), "x", Utc::now());
        assert_eq!(from, "1.0");
        assert_eq!(state.step.current, Some(StepName::Analyze));
        assert_eq!(state.step.index, 1);
        assert_eq!(state.phase.number.as_deref(), Some("0007"));
        assert_eq!(state.phase.status, PhaseStatus::Blocked);
        assert_eq!(state.project.name, "x");
    }
}
