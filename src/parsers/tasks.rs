//! tasks.md parsing.
//!
//! A task is a checkbox line carrying an inline identifier:
//!
//! ```text
//! ## Phase 1: Setup
//! - [x] T001 [P] Create project skeleton
//! - [ ] T002 [US1] Wire config loader, depends on T001
//! - [b] T003 Publish crate (blocked: waiting for name transfer)
//! - [~] T004 [V] Benchmarks
//! ```
//!
//! Checkbox lines without an identifier are prose as far as this parser is
//! concerned and are dropped.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::errors::ArtifactError;

static CHECKBOX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*+]\s+\[(.)\]\s*(.*)$").unwrap());

static TASK_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bT\d{3}[a-z]?\b").unwrap());

static USER_STORY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(US\d+)\]").unwrap());

static DEPENDS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:depends\s+on|after|requires)\s*:?\s*(T\d{3}[a-z]?(?:\s*(?:,|and)\s*T\d{3}[a-z]?)*)")
        .unwrap()
});

static BLOCKED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(blocked:\s*([^)]*)\)|\[blocked:\s*([^\]]*)\]").unwrap()
});

/// Checkbox state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    Done,
    Blocked,
    Deferred,
}

impl TaskStatus {
    /// Map the character between the checkbox brackets.
    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            'x' | 'X' => Some(Self::Done),
            ' ' => Some(Self::Todo),
            'b' | 'B' => Some(Self::Blocked),
            '~' | '-' => Some(Self::Deferred),
            _ => None,
        }
    }
}

/// A parsed task line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    pub dependencies: Vec<String>,
    /// Nearest preceding `##` heading
    pub section: Option<String>,
    pub user_story: Option<String>,
    pub parallel: bool,
    pub verification: bool,
    pub blocked_reason: Option<String>,
    /// 1-based source line
    pub line: usize,
}

/// Aggregate counts over a task list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    pub total: usize,
    pub done: usize,
    pub todo: usize,
    pub blocked: usize,
    pub deferred: usize,
}

impl TaskProgress {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut progress = Self {
            total: tasks.len(),
            ..Self::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Done => progress.done += 1,
                TaskStatus::Todo => progress.todo += 1,
                TaskStatus::Blocked => progress.blocked += 1,
                TaskStatus::Deferred => progress.deferred += 1,
            }
        }
        progress
    }

    /// Tasks that still need work (deferred ones do not count).
    pub fn remaining(&self) -> usize {
        self.todo + self.blocked
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.remaining() == 0
    }
}

fn section_heading(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("## ")?;
    Some(rest.trim())
}

fn parse_task_line(line: &str, line_no: usize, section: Option<&str>) -> Option<Task> {
    let caps = CHECKBOX_REGEX.captures(line)?;
    let marker = caps.get(1)?.as_str().chars().next()?;
    let body = caps.get(2)?.as_str();

    let Some(status) = TaskStatus::from_marker(marker) else {
        debug!(line = line_no, marker = %marker, "Unknown checkbox marker, skipping");
        return None;
    };
    let id_match = TASK_ID_REGEX.find(body)?;
    let id = id_match.as_str().to_string();

    let mut dependencies: Vec<String> = Vec::new();
    for caps in DEPENDS_REGEX.captures_iter(body) {
        if let Some(list) = caps.get(1) {
            for dep in TASK_ID_REGEX.find_iter(list.as_str()) {
                let dep = dep.as_str().to_string();
                if dep != id && !dependencies.contains(&dep) {
                    dependencies.push(dep);
                }
            }
        }
    }

    let blocked_reason = if status == TaskStatus::Blocked {
        BLOCKED_REGEX.captures(body).and_then(|c| {
            c.get(1)
                .or_else(|| c.get(2))
                .map(|m| m.as_str().trim().to_string())
        })
    } else {
        None
    };

    let user_story = USER_STORY_REGEX
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let description = body[id_match.end()..]
        .replace("[P]", "")
        .replace("[V]", "");
    let description = USER_STORY_REGEX.replace_all(&description, "");
    let description = BLOCKED_REGEX.replace_all(&description, "");
    let description = description.split_whitespace().collect::<Vec<_>>().join(" ");

    Some(Task {
        id,
        description,
        status,
        dependencies,
        section: section.map(str::to_string),
        user_story,
        parallel: body.contains("[P]"),
        verification: body.contains("[V]"),
        blocked_reason,
        line: line_no,
    })
}

/// Parse tasks.md content.
pub fn parse_tasks(content: &str) -> Vec<Task> {
    let mut section: Option<&str> = None;
    let mut tasks = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if let Some(heading) = section_heading(line) {
            section = Some(heading);
            continue;
        }
        if let Some(task) = parse_task_line(line, idx + 1, section) {
            tasks.push(task);
        }
    }
    tasks
}

/// Number of checkbox lines, with or without an identifier.
pub fn count_checkbox_lines(content: &str) -> usize {
    content
        .lines()
        .filter(|line| CHECKBOX_REGEX.is_match(line))
        .count()
}

/// Read and parse a tasks file.
pub fn read_tasks(path: &Path) -> Result<Vec<Task>, ArtifactError> {
    let content = fs::read_to_string(path).map_err(|e| ArtifactError::io(path, e))?;
    Ok(parse_tasks(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TASKS: &str = "\
# Tasks

## Phase 1: Setup
- [x] T001 [P] Create project skeleton
- [ ] T002 [US1] Wire config loader, depends on T001
- [b] T003 Publish crate (blocked: waiting for name transfer)
- [~] T004 [V] Benchmarks

## Phase 2: Core
- [ ] Untracked note without an id
- [X] T005a Parser requires T002, T003 and T004
- [ ] T006 Mentions (blocked: not really) but is todo
* [-] T007 Dropped scope
Regular prose line T008
";

    #[test]
    fn test_single_done_task() {
        let tasks = parse_tasks("- [x] T001 Do thing");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "T001");
        assert_eq!(tasks[0].status, TaskStatus::Done);
        assert_eq!(tasks[0].description, "Do thing");
    }

    #[test]
    fn test_line_without_id_is_dropped() {
        assert!(parse_tasks("- [ ] Do thing").is_empty());
    }

    #[test]
    fn test_full_document() {
        let tasks = parse_tasks(TASKS);
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["T001", "T002", "T003", "T004", "T005a", "T006", "T007"]);

        assert!(tasks[0].parallel);
        assert_eq!(tasks[0].section.as_deref(), Some("Phase 1: Setup"));
        assert_eq!(tasks[1].user_story.as_deref(), Some("US1"));
        assert_eq!(tasks[1].dependencies, ["T001"]);
        assert_eq!(tasks[2].status, TaskStatus::Blocked);
        assert_eq!(
            tasks[2].blocked_reason.as_deref(),
            Some("waiting for name transfer")
        );
        assert_eq!(tasks[2].description, "Publish crate");
        assert_eq!(tasks[3].status, TaskStatus::Deferred);
        assert!(tasks[3].verification);
        assert_eq!(tasks[4].dependencies, ["T002", "T003", "T004"]);
        assert_eq!(tasks[4].section.as_deref(), Some("Phase 2: Core"));
        assert_eq!(tasks[6].status, TaskStatus::Deferred);
    }

    #[test]
    fn test_blocked_reason_only_for_blocked_tasks() {
        let tasks = parse_tasks(TASKS);
        let t006 = tasks.iter().find(|t| t.id == "T006").unwrap();
        assert_eq!(t006.status, TaskStatus::Todo);
        assert!(t006.blocked_reason.is_none());

        let bracketed = parse_tasks("- [B] T010 Ship it [BLOCKED: legal review]");
        assert_eq!(bracketed[0].blocked_reason.as_deref(), Some("legal review"));
    }

    #[test]
    fn test_progress_counts() {
        let progress = TaskProgress::from_tasks(&parse_tasks(TASKS));
        assert_eq!(progress.total, 7);
        assert_eq!(progress.done, 2);
        assert_eq!(progress.todo, 2);
        assert_eq!(progress.blocked, 1);
        assert_eq!(progress.deferred, 2);
        assert_eq!(progress.remaining(), 3);
        assert!(!progress.is_complete());
        assert!(!TaskProgress::default().is_complete());
    }

    #[test]
    fn test_checkbox_count_includes_id_less_lines() {
        assert_eq!(count_checkbox_lines(TASKS), 8);
        assert_eq!(count_checkbox_lines("- [ ] a\n- [ ] b\n"), 2);
        assert!(parse_tasks("- [ ] a\n- [ ] b\n").is_empty());
    }

    #[test]
    fn test_line_numbers_are_one_based() {
        let tasks = parse_tasks("intro\n- [ ] T001 first\n");
        assert_eq!(tasks[0].line, 2);
    }
}
