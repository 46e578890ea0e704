//! Typed model of the canonical orchestration state document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Schema version written by this crate.
pub const STATE_SCHEMA_VERSION: &str = "3.0";

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every accepted serialized value, in declaration order.
            pub const VALUES: &'static [&'static str] = &[$($text),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
                match normalized.as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => anyhow::bail!(
                        "Invalid {} '{}'. Valid values: {}",
                        stringify!($name),
                        s,
                        Self::VALUES.join(", ")
                    ),
                }
            }
        }
    };
}

string_enum! {
    /// Lifecycle status of a roadmap phase.
    #[derive(Default)]
    pub enum PhaseStatus {
        #[default]
        NotStarted => "not_started",
        InProgress => "in_progress",
        Complete => "complete",
        Blocked => "blocked",
        AwaitingUser => "awaiting_user",
    }
}

string_enum! {
    /// The four workflow steps inside a phase.
    pub enum StepName {
        Design => "design",
        Analyze => "analyze",
        Implement => "implement",
        Verify => "verify",
    }
}

string_enum! {
    /// Status of the current step.
    #[derive(Default)]
    pub enum StepStatus {
        #[default]
        NotStarted => "not_started",
        Pending => "pending",
        InProgress => "in_progress",
        Complete => "complete",
        Failed => "failed",
        Blocked => "blocked",
        Skipped => "skipped",
    }
}

string_enum! {
    /// Human sign-off state for a phase gate.
    pub enum GateStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

string_enum! {
    /// Overall result of a consistency check.
    #[derive(Default)]
    pub enum HealthStatus {
        Ready => "ready",
        Warning => "warning",
        Error => "error",
        #[default]
        Unknown => "unknown",
    }
}

string_enum! {
    /// Kind of a history record.
    pub enum HistoryKind {
        PhaseCompleted => "phase_completed",
        PhaseArchived => "phase_archived",
    }
}

impl StepName {
    pub const ALL: [StepName; 4] = [
        StepName::Design,
        StepName::Analyze,
        StepName::Implement,
        StepName::Verify,
    ];

    /// Canonical position of the step (design=0 … verify=3).
    pub fn index(self) -> u8 {
        match self {
            StepName::Design => 0,
            StepName::Analyze => 1,
            StepName::Implement => 2,
            StepName::Verify => 3,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// The step that follows this one, `None` after verify.
    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }
}

/// Project identity, created once at initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: String,
}

/// The active phase as recorded in state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseState {
    /// Four-digit phase number; `None` when no phase is active
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub status: PhaseStatus,
    /// Copied from the roadmap gate column when the phase starts
    #[serde(default)]
    pub has_user_gate: bool,
}

impl PhaseState {
    pub fn is_active(&self) -> bool {
        self.number.as_deref().is_some_and(|n| !n.trim().is_empty())
    }
}

/// Position inside the four-step workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    #[serde(default)]
    pub current: Option<StepName>,
    #[serde(default)]
    pub index: u8,
    #[serde(default)]
    pub status: StepStatus,
}

impl StepState {
    /// Index that `current` implies (0 when no step is set).
    pub fn expected_index(&self) -> u8 {
        self.current.map(StepName::index).unwrap_or(0)
    }

    /// Whether `index` agrees with `current`.
    pub fn index_consistent(&self) -> bool {
        self.index == self.expected_index()
    }
}

/// One completed or archived phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub phase_number: String,
    pub phase_name: String,
    #[serde(default)]
    pub branch: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actions {
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Last persisted summary of a consistency check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    #[serde(default)]
    pub status: HealthStatus,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub issue_count: u32,
}

/// Audit entry appended by every schema upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub from: String,
    pub to: String,
    pub date: DateTime<Utc>,
}

/// The canonical persisted state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationState {
    pub schema_version: String,
    pub project: Project,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub phase: PhaseState,
    #[serde(default)]
    pub step: StepState,
    #[serde(default)]
    pub actions: Actions,
    #[serde(default)]
    pub health: HealthSnapshot,
    /// Gate sign-off per phase number
    #[serde(default)]
    pub gates: BTreeMap<String, GateStatus>,
    #[serde(default)]
    pub migrations: Vec<MigrationRecord>,
    /// Top-level keys outside the schema, carried through every write
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrchestrationState {
    /// Fresh state for a newly initialized project.
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION.to_string(),
            project: Project {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                path: path.to_string(),
            },
            last_updated: Utc::now(),
            phase: PhaseState::default(),
            step: StepState::default(),
            actions: Actions::default(),
            health: HealthSnapshot::default(),
            gates: BTreeMap::new(),
            migrations: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn is_current_schema(&self) -> bool {
        self.schema_version == STATE_SCHEMA_VERSION
    }

    /// Whether history already records the given phase as completed.
    pub fn is_phase_archived(&self, number: &str) -> bool {
        self.actions
            .history
            .iter()
            .any(|h| h.phase_number == number)
    }

    /// Start a phase at the design step.
    pub fn start_phase(&mut self, number: &str, name: &str, branch: Option<&str>, has_user_gate: bool) {
        self.phase = PhaseState {
            number: Some(number.to_string()),
            name: Some(name.to_string()),
            branch: branch.map(str::to_string),
            status: PhaseStatus::InProgress,
            has_user_gate,
        };
        self.set_step(StepName::Design, StepStatus::InProgress);
    }

    /// Move to `step`, keeping `index` aligned with it.
    pub fn set_step(&mut self, step: StepName, status: StepStatus) {
        self.step = StepState {
            current: Some(step),
            index: step.index(),
            status,
        };
    }

    /// Close the active phase into history and clear phase and step.
    ///
    /// Returns the appended history entry, or `None` when no phase is active.
    pub fn archive_phase(&mut self, now: DateTime<Utc>) -> Option<HistoryEntry> {
        if !self.phase.is_active() {
            return None;
        }
        let number = self.phase.number.clone().unwrap_or_default();
        let entry = HistoryEntry {
            kind: HistoryKind::PhaseCompleted,
            phase_number: number.clone(),
            phase_name: self.phase.name.clone().unwrap_or_default(),
            branch: self.phase.branch.clone(),
            completed_at: now,
        };
        if !self.is_phase_archived(&number) {
            self.actions.history.push(entry.clone());
            self.actions
                .history
                .sort_by(|a, b| a.phase_number.cmp(&b.phase_number));
        }
        self.gates.remove(&number);
        self.phase = PhaseState::default();
        self.step = StepState::default();
        Some(entry)
    }
}
