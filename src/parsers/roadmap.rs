//! ROADMAP.md table parsing.
//!
//! The roadmap carries one markdown table:
//!
//! ```text
//! | Phase | Name       | Status         | Gate                  |
//! |-------|------------|----------------|-----------------------|
//! | 0010  | Foundation | ✅ Complete    | Tests pass            |
//! | 0020  | Engine     | 🔄 In Progress | **USER GATE**: review |
//! ```
//!
//! Column positions come from the header row, so extra columns and
//! reordering are tolerated. Anything that is not part of the first matching
//! table is ignored.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::errors::ArtifactError;
use crate::state::PhaseStatus;
use crate::util::normalize_phase_number;

/// One row of the roadmap table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoadmapPhase {
    pub number: String,
    pub name: String,
    pub status: PhaseStatus,
    pub has_user_gate: bool,
    /// Free text of the gate / verification column
    pub verification_gate: Option<String>,
}

/// Status keywords checked in order; the first hit wins.
const STATUS_VOCABULARY: &[(PhaseStatus, &[&str])] = &[
    (PhaseStatus::Blocked, &["blocked", "🚫"]),
    (PhaseStatus::AwaitingUser, &["awaiting", "waiting", "⏸"]),
    (PhaseStatus::InProgress, &["in progress", "active", "🔄"]),
    (PhaseStatus::Complete, &["complete", "done", "✅"]),
    (PhaseStatus::NotStarted, &["not started", "pending", "⬜"]),
];

fn normalize_cell(cell: &str) -> String {
    cell.to_lowercase().replace(['_', '-'], " ")
}

/// Match a status cell against the vocabulary.
pub fn match_status(cell: &str) -> Option<PhaseStatus> {
    let normalized = normalize_cell(cell);
    STATUS_VOCABULARY
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| normalized.contains(k)))
        .map(|(status, _)| *status)
}

/// Status of a cell, defaulting to `NotStarted` when nothing matches.
pub fn parse_status(cell: &str) -> PhaseStatus {
    match_status(cell).unwrap_or_else(|| {
        debug!(cell, "Unrecognized roadmap status, treating as not_started");
        PhaseStatus::NotStarted
    })
}

fn has_user_gate(cell: &str) -> bool {
    normalize_cell(cell).contains("user gate")
}

fn split_row(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    if !trimmed.starts_with('|') {
        return None;
    }
    let inner = trimmed.trim_start_matches('|');
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    Some(inner.split('|').map(|c| c.trim().to_string()).collect())
}

fn is_separator(cells: &[String]) -> bool {
    cells.iter().all(|c| {
        !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | ' '))
    })
}

fn strip_markup(cell: &str) -> &str {
    cell.trim_matches(|c: char| c == '*' || c == '`' || c == '_' || c.is_whitespace())
}

#[derive(Debug)]
struct Columns {
    phase: usize,
    name: Option<usize>,
    status: usize,
    gate: Option<usize>,
}

impl Columns {
    fn from_header(cells: &[String]) -> Option<Self> {
        let lowered: Vec<String> = cells.iter().map(|c| c.to_lowercase()).collect();
        let find = |keys: &[&str]| {
            lowered
                .iter()
                .position(|c| keys.iter().any(|k| c.contains(k)))
        };
        let phase = find(&["phase"])?;
        let status = find(&["status"])?;
        let name = find(&["name"]);
        let gate = find(&["gate", "verification"]);
        Some(Self {
            phase,
            name,
            status,
            gate,
        })
    }
}

/// Parse roadmap text.
///
/// Returns `None` when the text contains no table with both a `Phase` and a
/// `Status` column.
pub fn parse_roadmap(content: &str) -> Option<Vec<RoadmapPhase>> {
    let mut lines = content.lines();
    let columns = lines
        .by_ref()
        .filter_map(split_row)
        .find_map(|cells| Columns::from_header(&cells))?;

    let mut phases = Vec::new();
    for line in lines {
        let Some(cells) = split_row(line) else {
            if phases.is_empty() && line.trim().is_empty() {
                continue;
            }
            break;
        };
        if is_separator(&cells) {
            continue;
        }
        let cell = |idx: Option<usize>| idx.and_then(|i| cells.get(i)).map(String::as_str);

        let number = strip_markup(cell(Some(columns.phase)).unwrap_or_default());
        if number.is_empty() {
            continue;
        }
        let status_cell = cell(Some(columns.status)).unwrap_or_default();
        let gate_cell = cell(columns.gate).unwrap_or_default();

        phases.push(RoadmapPhase {
            number: normalize_phase_number(number),
            name: strip_markup(cell(columns.name).unwrap_or_default()).to_string(),
            status: parse_status(status_cell),
            has_user_gate: has_user_gate(status_cell) || has_user_gate(gate_cell),
            verification_gate: Some(gate_cell.trim())
                .filter(|g| !g.is_empty())
                .map(str::to_string),
        });
    }
    Some(phases)
}

/// Read and parse the roadmap file.
pub fn read_roadmap(path: &Path) -> Result<Vec<RoadmapPhase>, ArtifactError> {
    let content = fs::read_to_string(path).map_err(|e| ArtifactError::io(path, e))?;
    parse_roadmap(&content).ok_or_else(|| ArtifactError::InvalidFormat {
        path: path.to_path_buf(),
        reason: "no table with Phase and Status columns".to_string(),
    })
}

/// Look a phase up by number, tolerating short legacy prefixes.
pub fn find_phase<'a>(phases: &'a [RoadmapPhase], number: &str) -> Option<&'a RoadmapPhase> {
    let wanted = normalize_phase_number(number);
    phases.iter().find(|p| p.number == wanted)
}

/// The first phase that is neither complete nor blocked, in table order.
pub fn next_open_phase(phases: &[RoadmapPhase]) -> Option<&RoadmapPhase> {
    phases
        .iter()
        .find(|p| !matches!(p.status, PhaseStatus::Complete | PhaseStatus::Blocked))
}
