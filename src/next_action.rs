//! Next-action engine.
//!
//! [`decide`] is a pure function of a [`DecisionInput`]; everything that
//! touches the filesystem lives in [`DecisionInput::gather`].

use std::fmt;
use std::fs;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::config::SpecflowConfig;
use crate::dag::DagBuilder;
use crate::health::checks::DESIGN_ARTIFACTS;
use crate::health::{HealthContext, HealthReport, Severity, check_health};
use crate::parsers::checklist::{CHECKLISTS_DIR, ChecklistKind, read_checklists};
use crate::parsers::roadmap::{RoadmapPhase, next_open_phase, read_roadmap};
use crate::parsers::tasks::{TaskProgress, parse_tasks};
use crate::paths::resolve_active_feature_dir;
use crate::state::{GateStatus, PhaseState, PhaseStatus, StateStore, StepName, StepState};
use crate::tracker::BranchProbe;

/// Everything the decision depends on.
#[derive(Debug, Clone, Default)]
pub struct DecisionInput {
    pub health_errors: usize,
    /// Whether some error-level issue can be repaired automatically
    pub autofix_available: bool,
    pub phase: PhaseState,
    pub step: StepState,
    /// Gate sign-off for the active phase, if recorded
    pub gate: Option<GateStatus>,
    /// First open roadmap phase not already in history
    pub next_phase: Option<RoadmapPhase>,
    /// Design outputs absent from the feature directory
    pub missing_design_artifacts: Vec<String>,
    /// `None` when the feature directory has no tasks document
    pub tasks: Option<TaskProgress>,
    pub ready_tasks: Vec<String>,
    /// Unchecked items across the feature's non-deferred checklists
    pub open_checklist_items: usize,
}

/// The single recommended next step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NextAction {
    FixHealth { errors: usize, autofix: bool },
    StartPhase { number: String, name: String },
    PlanPhase,
    AwaitGate { phase: String },
    ArchivePhase { phase: String },
    StartStep { step: StepName },
    CreateDesignArtifacts { missing: Vec<String> },
    AdvanceStep { from: StepName, to: StepName },
    CreateTasks,
    ContinueImplementing { remaining: usize, ready: Vec<String> },
    CompleteChecklists { open: usize },
    ReadyToFinalize { phase: String },
}

impl NextAction {
    /// Shell command that carries the action out, where one exists.
    pub fn command(&self) -> Option<String> {
        match self {
            Self::FixHealth { autofix: true, .. } => Some("specflow check --fix".to_string()),
            Self::FixHealth { .. } => Some("specflow check".to_string()),
            Self::StartPhase { number, .. } => Some(format!("specflow phase start {}", number)),
            Self::ArchivePhase { .. } | Self::ReadyToFinalize { .. } => {
                Some("specflow phase close".to_string())
            }
            Self::StartStep { step } => Some(format!("specflow step {}", step)),
            Self::AdvanceStep { to, .. } => Some(format!("specflow step {}", to)),
            _ => None,
        }
    }
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixHealth { errors, autofix } => {
                write!(f, "Fix {} health error(s)", errors)?;
                if *autofix {
                    write!(f, " (autofix available)")?;
                }
                Ok(())
            }
            Self::StartPhase { number, name } => write!(f, "Start phase {} {}", number, name),
            Self::PlanPhase => write!(f, "Add the next phase to ROADMAP.md"),
            Self::AwaitGate { phase } => write!(f, "Waiting for user gate on phase {}", phase),
            Self::ArchivePhase { phase } => write!(f, "Archive completed phase {}", phase),
            Self::StartStep { step } => write!(f, "Start the {} step", step),
            Self::CreateDesignArtifacts { missing } => {
                write!(f, "Create design artifacts: {}", missing.join(", "))
            }
            Self::AdvanceStep { from, to } => write!(f, "Advance from {} to {}", from, to),
            Self::CreateTasks => write!(f, "Generate tasks.md for the phase"),
            Self::ContinueImplementing { remaining, ready } => {
                write!(f, "Continue implementing ({} task(s) remaining", remaining)?;
                if !ready.is_empty() {
                    write!(f, "; ready: {}", ready.join(", "))?;
                }
                write!(f, ")")
            }
            Self::CompleteChecklists { open } => {
                write!(f, "Complete {} open checklist item(s)", open)
            }
            Self::ReadyToFinalize { phase } => write!(f, "Phase {} is ready to finalize", phase),
        }
    }
}

/// Pick the next action in fixed priority order.
pub fn decide(input: &DecisionInput) -> NextAction {
    if input.health_errors > 0 {
        return NextAction::FixHealth {
            errors: input.health_errors,
            autofix: input.autofix_available,
        };
    }

    let Some(number) = input
        .phase
        .number
        .clone()
        .filter(|_| input.phase.is_active())
    else {
        return match &input.next_phase {
            Some(next) => NextAction::StartPhase {
                number: next.number.clone(),
                name: next.name.clone(),
            },
            None => NextAction::PlanPhase,
        };
    };

    match input.phase.status {
        PhaseStatus::AwaitingUser => return NextAction::AwaitGate { phase: number },
        PhaseStatus::Complete => return NextAction::ArchivePhase { phase: number },
        _ => {}
    }

    let Some(step) = input.step.current else {
        return NextAction::StartStep {
            step: StepName::Design,
        };
    };
    match step {
        StepName::Design if !input.missing_design_artifacts.is_empty() => {
            NextAction::CreateDesignArtifacts {
                missing: input.missing_design_artifacts.clone(),
            }
        }
        StepName::Design | StepName::Analyze => NextAction::AdvanceStep {
            from: step,
            to: step.next().unwrap_or(StepName::Verify),
        },
        StepName::Implement => match input.tasks {
            None => NextAction::CreateTasks,
            Some(progress) if progress.total == 0 => NextAction::CreateTasks,
            Some(progress) if progress.remaining() > 0 => NextAction::ContinueImplementing {
                remaining: progress.remaining(),
                ready: input.ready_tasks.clone(),
            },
            Some(_) => NextAction::AdvanceStep {
                from: StepName::Implement,
                to: StepName::Verify,
            },
        },
        StepName::Verify => {
            if input.open_checklist_items > 0 {
                NextAction::CompleteChecklists {
                    open: input.open_checklist_items,
                }
            } else if input.phase.has_user_gate && input.gate != Some(GateStatus::Approved) {
                NextAction::AwaitGate { phase: number }
            } else {
                NextAction::ReadyToFinalize { phase: number }
            }
        }
    }
}

impl DecisionInput {
    /// Collect inputs from the project's artifacts.
    pub fn gather(config: &SpecflowConfig, probe: &dyn BranchProbe) -> Result<Self> {
        let report = check_health(&HealthContext::from_config(config, probe));
        Self::gather_with_report(config, &report)
    }

    /// Like [`DecisionInput::gather`], reusing an existing health report.
    pub fn gather_with_report(config: &SpecflowConfig, report: &HealthReport) -> Result<Self> {
        let health_errors = report.count(Severity::Error);
        let autofix_available = report
            .issues
            .iter()
            .any(|i| i.severity == Severity::Error && i.auto_fixable);
        if health_errors > 0 {
            return Ok(Self {
                health_errors,
                autofix_available,
                ..Self::default()
            });
        }

        let paths = &config.paths;
        let state = StateStore::new(&paths.state)
            .read()
            .context("Failed to read orchestration state")?;

        let roadmap = if paths.roadmap.is_file() {
            read_roadmap(&paths.roadmap).unwrap_or_default()
        } else {
            Vec::new()
        };
        let open: Vec<RoadmapPhase> = roadmap
            .into_iter()
            .filter(|p| !state.is_phase_archived(&p.number))
            .collect();
        let next_phase = next_open_phase(&open).cloned();

        let mut input = Self {
            health_errors,
            autofix_available,
            gate: state
                .phase
                .number
                .as_ref()
                .and_then(|n| state.gates.get(n).copied()),
            phase: state.phase.clone(),
            step: state.step.clone(),
            next_phase,
            ..Self::default()
        };

        if !state.phase.is_active() {
            return Ok(input);
        }
        let feature_dir = resolve_active_feature_dir(paths, state.phase.number.as_deref());
        input.missing_design_artifacts = DESIGN_ARTIFACTS
            .iter()
            .filter(|name| {
                feature_dir
                    .as_ref()
                    .is_none_or(|dir| !dir.join(name).is_file())
            })
            .map(|name| name.to_string())
            .collect();

        if let Some(dir) = &feature_dir {
            input.open_checklist_items = read_checklists(&dir.join(CHECKLISTS_DIR))?
                .iter()
                .filter(|(_, list)| list.kind != ChecklistKind::Deferred)
                .map(|(_, list)| list.open_items())
                .sum();
        }

        if let Some(tasks_file) = feature_dir.map(|d| d.join("tasks.md")).filter(|p| p.is_file())
        {
            let content = fs::read_to_string(&tasks_file)
                .with_context(|| format!("Failed to read {}", tasks_file.display()))?;
            let tasks = parse_tasks(&content);
            input.tasks = Some(TaskProgress::from_tasks(&tasks));
            input.ready_tasks = DagBuilder::new(&tasks)
                .build()
                .ready_tasks()
                .into_iter()
                .map(str::to_string)
                .collect();
        }
        debug!(?input, "Gathered next-action inputs");
        Ok(input)
    }
}
