//! Checklist parsing (verification, implementation and deferred lists).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::errors::ArtifactError;

static CHECKBOX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*+]\s+\[(.)\]\s*(.*)$").unwrap());

static ITEM_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[?\b([A-Z]-[A-Z0-9]+)\b\]?").unwrap());

const DEFAULT_SECTION: &str = "General";

/// Which kind of checklist a file holds, decided from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistKind {
    Verification,
    Implementation,
    Deferred,
    Other,
}

impl ChecklistKind {
    pub fn classify(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if stem.contains("verif") {
            Self::Verification
        } else if stem.contains("implement") {
            Self::Implementation
        } else if stem.contains("defer") {
            Self::Deferred
        } else {
            Self::Other
        }
    }

    /// Letter used for generated item ids.
    pub fn prefix(self) -> char {
        match self {
            Self::Verification => 'V',
            Self::Implementation => 'I',
            Self::Deferred => 'D',
            Self::Other => 'C',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistStatus {
    Todo,
    Done,
    Skipped,
}

impl ChecklistStatus {
    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            'x' | 'X' => Some(Self::Done),
            ' ' => Some(Self::Todo),
            '~' | '-' | 's' | 'S' => Some(Self::Skipped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistItem {
    pub id: String,
    pub description: String,
    pub status: ChecklistStatus,
    pub section: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistSection {
    pub name: String,
    pub items: Vec<ChecklistItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checklist {
    pub kind: ChecklistKind,
    pub sections: Vec<ChecklistSection>,
}

impl Checklist {
    pub fn items(&self) -> impl Iterator<Item = &ChecklistItem> {
        self.sections.iter().flat_map(|s| s.items.iter())
    }

    /// Items neither done nor skipped.
    pub fn open_items(&self) -> usize {
        self.items()
            .filter(|i| i.status == ChecklistStatus::Todo)
            .count()
    }
}

/// Parse checklist content.
pub fn parse_checklist(content: &str, kind: ChecklistKind) -> Checklist {
    let mut sections: Vec<ChecklistSection> = Vec::new();
    let mut current = DEFAULT_SECTION.to_string();
    let mut next_seq = 1usize;

    let explicit_ids: Vec<String> = content
        .lines()
        .filter_map(|line| CHECKBOX_REGEX.captures(line))
        .filter_map(|caps| {
            caps.get(2)
                .and_then(|body| ITEM_ID_REGEX.captures(body.as_str()))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
        .collect();

    for (idx, line) in content.lines().enumerate() {
        if let Some(heading) = line.trim_start().strip_prefix("## ") {
            current = heading.trim().to_string();
            continue;
        }
        let Some(caps) = CHECKBOX_REGEX.captures(line) else {
            continue;
        };
        let Some(status) = caps
            .get(1)
            .and_then(|m| m.as_str().chars().next())
            .and_then(ChecklistStatus::from_marker)
        else {
            continue;
        };
        let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

        let (id, description) = match ITEM_ID_REGEX.captures(body) {
            Some(id_caps) => {
                let whole = id_caps.get(0).map(|m| m.range()).unwrap_or(0..0);
                let id = id_caps
                    .get(1)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                let mut rest = String::with_capacity(body.len());
                rest.push_str(&body[..whole.start]);
                rest.push_str(&body[whole.end..]);
                (id, rest)
            }
            None => {
                let id = loop {
                    let candidate = format!("{}-{:03}", kind.prefix(), next_seq);
                    next_seq += 1;
                    if !explicit_ids.contains(&candidate) {
                        break candidate;
                    }
                };
                (id, body.to_string())
            }
        };

        let item = ChecklistItem {
            id,
            description: description.split_whitespace().collect::<Vec<_>>().join(" "),
            status,
            section: current.clone(),
            line: idx + 1,
        };
        match sections.last_mut() {
            Some(section) if section.name == current => section.items.push(item),
            _ => sections.push(ChecklistSection {
                name: current.clone(),
                items: vec![item],
            }),
        }
    }

    Checklist { kind, sections }
}

/// Read a checklist file, classifying it by name.
pub fn read_checklist(path: &Path) -> Result<Checklist, ArtifactError> {
    let content = fs::read_to_string(path).map_err(|e| ArtifactError::io(path, e))?;
    Ok(parse_checklist(&content, ChecklistKind::classify(path)))
}

/// Checklists of a feature directory, kept under `checklists/`.
pub const CHECKLISTS_DIR: &str = "checklists";

/// Read every `*.md` checklist in `dir`, sorted by file name.
///
/// A missing directory yields an empty list.
pub fn read_checklists(dir: &Path) -> Result<Vec<(PathBuf, Checklist)>, ArtifactError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| ArtifactError::io(dir, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    files.sort();
    files
        .into_iter()
        .map(|path| read_checklist(&path).map(|list| (path, list)))
        .collect()
}
