//! Format-generation detection.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::paths::ProjectPaths;

/// On-disk format generation of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatGeneration {
    Uninitialized,
    /// Everything under `.specify/`, unversioned or `1.x` state
    V1,
    /// `.specify/` with versioned `2.x` state and manifest
    V2,
    /// `.specflow/` operational directory, state schema `3.x`
    V3,
}

impl FormatGeneration {
    pub const CURRENT: FormatGeneration = FormatGeneration::V3;

    /// Generation implied by a version string's major component.
    pub fn from_version(version: &str) -> Option<Self> {
        let major = version
            .trim()
            .trim_start_matches(['v', 'V'])
            .split('.')
            .next()?
            .parse::<u32>()
            .ok()?;
        match major {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::V1 => "v1",
            Self::V2 => "v2",
            Self::V3 => "v3",
        }
    }

    pub fn is_current(self) -> bool {
        self == Self::CURRENT
    }
}

impl fmt::Display for FormatGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// One piece of evidence for a generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Indicator {
    pub source: &'static str,
    pub generation: FormatGeneration,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDetection {
    pub generation: FormatGeneration,
    pub confidence: Confidence,
    pub indicators: Vec<Indicator>,
}

impl VersionDetection {
    pub fn needs_migration(&self) -> bool {
        !matches!(
            self.generation,
            FormatGeneration::Uninitialized | FormatGeneration::V3
        )
    }
}

fn read_json(path: &Path) -> Option<Value> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Ignoring unparseable document during detection");
            None
        }
    }
}

/// First string-valued version field among `keys`.
fn version_field<'a>(doc: &'a Value, keys: &[&'static str]) -> Option<(&'static str, &'a str)> {
    keys.iter()
        .find_map(|key| doc.get(*key).and_then(Value::as_str).map(|v| (*key, v)))
}

fn manifest_indicator(paths: &ProjectPaths) -> Option<Indicator> {
    let doc = read_json(paths.manifest_source())?;
    let (field, version) = version_field(&doc, &["format_generation", "version", "schema_version"])?;
    Some(Indicator {
        source: "manifest",
        generation: FormatGeneration::from_version(version)?,
        detail: format!("manifest {} = {}", field, version),
    })
}

fn state_indicator(paths: &ProjectPaths) -> Option<Indicator> {
    let source = paths.state_source();
    let doc = read_json(source)?;
    match version_field(&doc, &["schema_version", "version"]) {
        Some((field, version)) => Some(Indicator {
            source: "state",
            generation: FormatGeneration::from_version(version)?,
            detail: format!("state {} = {}", field, version),
        }),
        None if doc.is_object() => Some(Indicator {
            source: "state",
            generation: FormatGeneration::V1,
            detail: "state document without a version field".to_string(),
        }),
        None => None,
    }
}

fn layout_indicator(paths: &ProjectPaths) -> Option<Indicator> {
    paths.has_ops_layout().then(|| Indicator {
        source: "layout",
        generation: FormatGeneration::V3,
        detail: format!("{} directory present", paths.ops_dir.display()),
    })
}

/// Classify the project's format generation.
///
/// The newest generation with any supporting indicator wins. Two or more
/// indicators for it give high confidence, one gives medium. Artifacts
/// without any recognizable indicator are assumed to be the oldest
/// generation at low confidence so migration can still proceed.
pub fn detect_version(paths: &ProjectPaths) -> VersionDetection {
    let indicators: Vec<Indicator> = [
        manifest_indicator(paths),
        state_indicator(paths),
        layout_indicator(paths),
    ]
    .into_iter()
    .flatten()
    .collect();

    let Some(newest) = indicators.iter().map(|i| i.generation).max() else {
        let (generation, confidence) = if paths.has_any_artifact() {
            (FormatGeneration::V1, Confidence::Low)
        } else {
            (FormatGeneration::Uninitialized, Confidence::High)
        };
        return VersionDetection {
            generation,
            confidence,
            indicators,
        };
    };

    let agreeing = indicators.iter().filter(|i| i.generation == newest).count();
    let confidence = if agreeing >= 2 {
        Confidence::High
    } else {
        Confidence::Medium
    };
    debug!(generation = %newest, %confidence, agreeing, "Detected format generation");

    VersionDetection {
        generation: newest,
        confidence,
        indicators,
    }
}
