//! Schema migration engine.
//!
//! Upgrades state and manifest documents written by older format
//! generations. Every operation is idempotent and reports a
//! [`MigrationResult`] instead of returning an error, because migrations
//! run from diagnostic paths that must keep going after a partial failure.

pub mod detect;
pub mod history;
pub mod manifest;
pub mod state;

use serde::Serialize;
use std::fmt;

pub use detect::{Confidence, FormatGeneration, Indicator, VersionDetection, detect_version};
pub use history::{extract_history_from_roadmap, merge_history, parse_history};
pub use manifest::{MANIFEST_SCHEMA_VERSION, Manifest, migrate_manifest, preview_manifest_migration};
pub use state::{migrate_state, preview_state_migration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationAction {
    /// Already current; nothing written
    Skipped,
    /// An existing document was upgraded
    Migrated,
    /// No document existed and a fresh one was written
    Created,
    Failed,
}

impl fmt::Display for MigrationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Skipped => "skipped",
            Self::Migrated => "migrated",
            Self::Created => "created",
            Self::Failed => "failed",
        })
    }
}

/// Outcome of one migration step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationResult {
    pub success: bool,
    pub action: MigrationAction,
    pub details: Vec<String>,
    pub error: Option<String>,
}

impl MigrationResult {
    pub fn skipped(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            action: MigrationAction::Skipped,
            details: vec![detail.into()],
            error: None,
        }
    }

    pub fn migrated(details: Vec<String>) -> Self {
        Self {
            success: true,
            action: MigrationAction::Migrated,
            details,
            error: None,
        }
    }

    pub fn created(details: Vec<String>) -> Self {
        Self {
            success: true,
            action: MigrationAction::Created,
            details,
            error: None,
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            action: MigrationAction::Failed,
            details: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn summary(&self) -> String {
        match (&self.error, self.details.is_empty()) {
            (Some(err), _) => format!("{}: {}", self.action, err),
            (None, true) => self.action.to_string(),
            (None, false) => format!("{}: {}", self.action, self.details.join("; ")),
        }
    }
}
