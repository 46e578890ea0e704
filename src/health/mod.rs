//! Consistency checker.
//!
//! Runs an ordered battery of independent checks over the state document
//! and the artifacts it should agree with. Only an absent or unreadable
//! state document stops the run early; any other check that fails to run
//! is reported as an issue and the remaining checks still execute.

pub mod checks;
pub mod fix;

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::SpecflowConfig;
use crate::paths::ProjectPaths;
use crate::state::{HealthSnapshot, HealthStatus};
use crate::tracker::BranchProbe;

pub use checks::check_health;
pub use fix::{FixOutcome, apply_fixes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Stable identifier of a kind of issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    StateMissing,
    StateCorrupt,
    SchemaOutdated,
    SchemaTooNew,
    StateFieldInvalid,
    StepIndexMismatch,
    LegacyArtifact,
    RoadmapMissing,
    BacklogMissing,
    HistoryMissing,
    MemoryMissing,
    ManifestMissing,
    TemplateMissing,
    TemplateSourceUnavailable,
    FeatureDirPrefix,
    RoadmapUnparseable,
    RoadmapDrift,
    RoadmapPhaseMissing,
    MultipleInProgress,
    BranchDrift,
    OnTrunk,
    VcsUnavailable,
    DesignArtifactsMissing,
    TasksUnparsed,
    TaskCycle,
    TaskDependencyUnknown,
    TaskDuplicateId,
    StepBlocked,
    CheckFailed,
}

impl IssueCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StateMissing => "STATE_MISSING",
            Self::StateCorrupt => "STATE_CORRUPT",
            Self::SchemaOutdated => "SCHEMA_OUTDATED",
            Self::SchemaTooNew => "SCHEMA_TOO_NEW",
            Self::StateFieldInvalid => "STATE_FIELD_INVALID",
            Self::StepIndexMismatch => "STEP_INDEX_MISMATCH",
            Self::LegacyArtifact => "LEGACY_ARTIFACT",
            Self::RoadmapMissing => "ROADMAP_MISSING",
            Self::BacklogMissing => "BACKLOG_MISSING",
            Self::HistoryMissing => "HISTORY_MISSING",
            Self::MemoryMissing => "MEMORY_MISSING",
            Self::ManifestMissing => "MANIFEST_MISSING",
            Self::TemplateMissing => "TEMPLATE_MISSING",
            Self::TemplateSourceUnavailable => "TEMPLATE_SOURCE_UNAVAILABLE",
            Self::FeatureDirPrefix => "FEATURE_DIR_PREFIX",
            Self::RoadmapUnparseable => "ROADMAP_UNPARSEABLE",
            Self::RoadmapDrift => "ROADMAP_DRIFT",
            Self::RoadmapPhaseMissing => "ROADMAP_PHASE_MISSING",
            Self::MultipleInProgress => "MULTIPLE_IN_PROGRESS",
            Self::BranchDrift => "BRANCH_DRIFT",
            Self::OnTrunk => "ON_TRUNK",
            Self::VcsUnavailable => "VCS_UNAVAILABLE",
            Self::DesignArtifactsMissing => "DESIGN_ARTIFACTS_MISSING",
            Self::TasksUnparsed => "TASKS_UNPARSED",
            Self::TaskCycle => "TASK_CYCLE",
            Self::TaskDependencyUnknown => "TASK_DEPENDENCY_UNKNOWN",
            Self::TaskDuplicateId => "TASK_DUPLICATE_ID",
            Self::StepBlocked => "STEP_BLOCKED",
            Self::CheckFailed => "CHECK_FAILED",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding of a health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthIssue {
    pub code: IssueCode,
    pub severity: Severity,
    pub message: String,
    pub fix_hint: Option<String>,
    pub auto_fixable: bool,
    /// Artifact the issue is about, when there is a single one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl HealthIssue {
    pub fn new(code: IssueCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            fix_hint: None,
            auto_fixable: false,
            path: None,
        }
    }

    pub fn error(code: IssueCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }

    pub fn warning(code: IssueCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warning, message)
    }

    pub fn info(code: IssueCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Info, message)
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    pub fn fixable(mut self) -> Self {
        self.auto_fixable = true;
        self
    }

    pub fn at(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// What the user should do about a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    Nothing,
    RunAutofix,
    ManualFix,
}

/// Inputs for a health run that do not live in the project files.
pub struct HealthContext<'a> {
    pub paths: &'a ProjectPaths,
    pub trunk_branches: Vec<String>,
    pub templates_dir: Option<PathBuf>,
    pub prefix_width: usize,
    pub probe: &'a dyn BranchProbe,
}

impl<'a> HealthContext<'a> {
    pub fn from_config(config: &'a SpecflowConfig, probe: &'a dyn BranchProbe) -> Self {
        Self {
            paths: &config.paths,
            trunk_branches: config.trunk_branches().to_vec(),
            templates_dir: config.templates_dir(),
            prefix_width: config.prefix_width(),
            probe,
        }
    }
}

/// Collected issues of one health run.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub issues: Vec<HealthIssue>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn new(issues: Vec<HealthIssue>) -> Self {
        let status = if issues.iter().any(|i| i.severity == Severity::Error) {
            HealthStatus::Error
        } else if issues.iter().any(|i| i.severity == Severity::Warning) {
            HealthStatus::Warning
        } else {
            HealthStatus::Ready
        };
        Self {
            status,
            issues,
            checked_at: Utc::now(),
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn has_errors(&self) -> bool {
        self.status == HealthStatus::Error
    }

    pub fn has_code(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }

    /// Highest severity that blocks progress (warning or error).
    fn blocking_severity(&self) -> Option<Severity> {
        self.issues
            .iter()
            .map(|i| i.severity)
            .filter(|s| *s >= Severity::Warning)
            .max()
    }

    /// Prefer autofix when an autofixable issue exists at the blocking
    /// severity.
    pub fn suggested_action(&self) -> SuggestedAction {
        let Some(blocking) = self.blocking_severity() else {
            return SuggestedAction::Nothing;
        };
        if self
            .issues
            .iter()
            .any(|i| i.severity == blocking && i.auto_fixable)
        {
            SuggestedAction::RunAutofix
        } else {
            SuggestedAction::ManualFix
        }
    }

    /// Summary persisted into the state document.
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: self.status,
            last_check: Some(self.checked_at),
            issue_count: self
                .issues
                .iter()
                .filter(|i| i.severity >= Severity::Warning)
                .count() as u32,
        }
    }
}
