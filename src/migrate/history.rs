//! Recovering phase history from roadmap prose.
//!
//! Older roadmaps recorded completion only in markup. Three line shapes are
//! recognized:
//!
//! ```text
//! | 010 | Foundation | ✅ |              table row with a completion glyph
//! ### Phase 020: Engine (COMPLETE)       heading with a COMPLETE marker
//! - [x] Phase 030 Polish                 checked list item
//! ```
//!
//! The recovered `completed_at` is the migration time; the real completion
//! date is not recorded anywhere.

use std::collections::BTreeMap;
use std::fs;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use crate::paths::ProjectPaths;
use crate::state::{HistoryEntry, HistoryKind};
use crate::util::{normalize_phase_number, slugify};

static TABLE_ROW_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\|\s*\**(\d{1,4})\**\s*\|\s*([^|]*?)\s*\|.*✅").unwrap()
});

static HEADING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#{1,6}\s+(?:Phase\s+)?(\d{1,4})\b(.*\bCOMPLETED?\b.*)$").unwrap()
});

static CHECKED_ITEM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-*+]\s+\[[xX]\]\s+(?:\**Phase\s+)?(\d{1,4})\b\**(.*)$").unwrap()
});

static COMPLETE_MARKER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bCOMPLETED?\b|✅").unwrap());

fn clean_name(raw: &str) -> String {
    let without_marker = COMPLETE_MARKER_REGEX.replace_all(raw, "");
    let cleaned = without_marker
        .replace(['(', ')', '[', ']', '*', '`'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    cleaned
        .trim_matches(|c: char| matches!(c, ':' | '-' | '.' | '\u{2013}' | '\u{2014}') || c.is_whitespace())
        .to_string()
}

fn entry(number: &str, name: &str, now: DateTime<Utc>) -> HistoryEntry {
    let phase_number = normalize_phase_number(number);
    let phase_name = clean_name(name);
    let slug = slugify(&phase_name);
    let branch = if slug.is_empty() {
        phase_number.clone()
    } else {
        format!("{}-{}", phase_number, slug)
    };
    HistoryEntry {
        kind: HistoryKind::PhaseCompleted,
        phase_number,
        phase_name,
        branch: Some(branch),
        completed_at: now,
    }
}

/// Recover completed phases from roadmap text.
///
/// Deduplicated by phase number (first occurrence wins) and sorted
/// ascending.
pub fn parse_history(content: &str, now: DateTime<Utc>) -> Vec<HistoryEntry> {
    let mut found: BTreeMap<String, HistoryEntry> = BTreeMap::new();
    for line in content.lines() {
        let caps = TABLE_ROW_REGEX
            .captures(line)
            .or_else(|| HEADING_REGEX.captures(line))
            .or_else(|| CHECKED_ITEM_REGEX.captures(line));
        let Some(caps) = caps else {
            continue;
        };
        let number = caps.get(1).map_or("", |m| m.as_str());
        let name = caps.get(2).map_or("", |m| m.as_str());
        let recovered = entry(number, name, now);
        debug!(phase = %recovered.phase_number, "Recovered completed phase from roadmap");
        found
            .entry(recovered.phase_number.clone())
            .or_insert(recovered);
    }
    found.into_values().collect()
}

/// Merge recovered entries into existing history.
///
/// Existing entries win on a phase-number collision; the result is sorted
/// by phase number.
pub fn merge_history(existing: &[HistoryEntry], recovered: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    let mut merged: Vec<HistoryEntry> = existing.to_vec();
    for entry in recovered {
        if !merged.iter().any(|e| e.phase_number == entry.phase_number) {
            merged.push(entry);
        }
    }
    merged.sort_by(|a, b| a.phase_number.cmp(&b.phase_number));
    merged
}

/// Recover history from the project's roadmap; empty when it is absent.
pub fn extract_history_from_roadmap(paths: &ProjectPaths) -> Vec<HistoryEntry> {
    match fs::read_to_string(&paths.roadmap) {
        Ok(content) => parse_history(&content, Utc::now()),
        Err(e) => {
            debug!(path = %paths.roadmap.display(), error = %e, "No roadmap to recover history from");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::resolve_paths;

    const LEGACY_ROADMAP: &str = "\
# Roadmap

| Phase | Name | Status |
|-------|------|--------|
| 010 | Foundation | ✅ |
| 020 | Engine | 🔄 |

### Phase 030: CLI Surface (COMPLETE)
### Phase 040: Not yet

- [x] Phase 050 Packaging
- [ ] Phase 060 Docs
- [x] 010 Duplicate of foundation
";

    #[test]
    fn test_all_three_patterns_recovered() {
        let history = parse_history(LEGACY_ROADMAP, Utc::now());
        let numbers: Vec<&str> = history.iter().map(|h| h.phase_number.as_str()).collect();
        assert_eq!(numbers, ["0010", "0030", "0050"]);

        assert_eq!(history[0].phase_name, "Foundation");
        assert_eq!(history[0].branch.as_deref(), Some("0010-foundation"));
        assert_eq!(history[1].phase_name, "CLI Surface");
        assert_eq!(history[1].branch.as_deref(), Some("0030-cli-surface"));
        assert_eq!(history[2].phase_name, "Packaging");
        assert!(history.iter().all(|h| h.kind == HistoryKind::PhaseCompleted));
    }

    #[test]
    fn test_first_occurrence_wins_on_duplicates() {
        let history = parse_history(LEGACY_ROADMAP, Utc::now());
        let foundation = history.iter().find(|h| h.phase_number == "0010").unwrap();
        assert_eq!(foundation.phase_name, "Foundation");
    }

    #[test]
    fn test_current_format_table_with_gate_column() {
        let content = "| Phase | Name | Status | Gate |\n|---|---|---|---|\n| 0010 | Setup | ✅ Complete | tests |\n";
        let history = parse_history(content, Utc::now());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].phase_name, "Setup");
    }

    #[test]
    fn test_merge_prefers_existing_and_sorts() {
        let now = Utc::now();
        let mut existing = entry("0030", "Original name", now);
        existing.kind = HistoryKind::PhaseArchived;
        let recovered = parse_history(LEGACY_ROADMAP, now);

        let merged = merge_history(&[existing.clone()], recovered);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[1], existing);
        assert!(merged.windows(2).all(|w| w[0].phase_number < w[1].phase_number));
    }

    #[test]
    fn test_missing_roadmap_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(extract_history_from_roadmap(&resolve_paths(dir.path())).is_empty());
    }
}
