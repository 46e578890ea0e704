//! Typed error hierarchy for specflow artifacts.
//!
//! Reading a tracked artifact can fail in three distinct ways, and callers
//! pick different repair strategies for each:
//! - `NotFound`: the artifact is absent (recover by initializing it)
//! - `InvalidFormat`: it exists but is not valid syntax (JSON error, no roadmap table)
//! - `SchemaViolation`: it parses but has the wrong shape, with per-field details

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One field-level validation failure inside a structured document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Dot-path of the offending field (e.g. `step.index`)
    pub path: String,
    /// Human-readable reason
    pub reason: String,
}

impl SchemaViolation {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "{}: {}", self.path, self.reason)
        }
    }
}

/// Errors from reading or writing a tracked artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Artifact not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Invalid format in {}: {reason}", path.display())]
    InvalidFormat { path: PathBuf, reason: String },

    #[error("Schema violation in {} ({} field(s)): {}", path.display(), violations.len(), summarize(violations))]
    SchemaViolation {
        path: PathBuf,
        violations: Vec<SchemaViolation>,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State document is locked by another process: {}", path.display())]
    Locked { path: PathBuf },

    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn summarize(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ArtifactError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path: path.into() }
        } else {
            Self::Io {
                path: path.into(),
                source,
            }
        }
    }

    /// Whether this error means the artifact simply does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The per-field violations, empty for every other kind.
    pub fn violations(&self) -> &[SchemaViolation] {
        match self {
            Self::SchemaViolation { violations, .. } => violations,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_path() {
        let err = ArtifactError::NotFound {
            path: PathBuf::from("/p/.specflow/orchestration-state.json"),
        };
        assert!(err.is_not_found());
        assert!(err.to_string().contains("orchestration-state.json"));
    }

    #[test]
    fn io_helper_maps_not_found_kind() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = ArtifactError::io("/x", io_err);
        assert!(matches!(err, ArtifactError::NotFound { .. }));

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = ArtifactError::io("/x", io_err);
        match &err {
            ArtifactError::Io { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied)
            }
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn schema_violation_lists_fields() {
        let err = ArtifactError::SchemaViolation {
            path: PathBuf::from("state.json"),
            violations: vec![
                SchemaViolation::new("step.index", "expected number"),
                SchemaViolation::new("phase.status", "unknown value 'done'"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 field(s)"));
        assert!(msg.contains("step.index: expected number"));
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn violations_empty_for_other_kinds() {
        let err = ArtifactError::InvalidFormat {
            path: PathBuf::from("ROADMAP.md"),
            reason: "no table".into(),
        };
        assert!(err.violations().is_empty());
        assert!(!err.is_not_found());
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ArtifactError::Locked {
            path: PathBuf::from("state.lock"),
        });
    }
}
