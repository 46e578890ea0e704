//! Persistence for the orchestration state document.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use serde_json::Value;
use tracing::{debug, info};

use super::model::OrchestrationState;
use super::schema;
use crate::errors::{ArtifactError, SchemaViolation};
use crate::util::atomic_write;

/// Exclusive advisory lock, released on drop.
#[derive(Debug)]
pub struct StateLock {
    file: File,
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Reads and writes a single state document.
///
/// When a lock file is configured every write takes an exclusive,
/// non-blocking lock on it first and fails with `Locked` if another
/// process holds it.
#[derive(Debug, Clone)]
pub struct StateStore {
    state_file: PathBuf,
    lock_file: Option<PathBuf>,
}

impl StateStore {
    pub fn new(state_file: impl Into<PathBuf>) -> Self {
        Self {
            state_file: state_file.into(),
            lock_file: None,
        }
    }

    pub fn with_lock(mut self, lock_file: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(lock_file.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.state_file
    }

    pub fn exists(&self) -> bool {
        self.state_file.is_file()
    }

    /// Take the configured lock, if any.
    pub fn lock(&self) -> Result<Option<StateLock>, ArtifactError> {
        let Some(lock_path) = &self.lock_file else {
            return Ok(None);
        };
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ArtifactError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path)
            .map_err(|e| ArtifactError::io(lock_path, e))?;
        file.try_lock_exclusive()
            .map_err(|_| ArtifactError::Locked {
                path: lock_path.clone(),
            })?;
        debug!(path = %lock_path.display(), "Acquired state lock");
        Ok(Some(StateLock { file }))
    }

    /// Parse the document as untyped JSON.
    pub fn read_value(&self) -> Result<Value, ArtifactError> {
        let content = fs::read_to_string(&self.state_file)
            .map_err(|e| ArtifactError::io(&self.state_file, e))?;
        serde_json::from_str(&content).map_err(|e| ArtifactError::InvalidFormat {
            path: self.state_file.clone(),
            reason: e.to_string(),
        })
    }

    /// Read and validate the document into the typed model.
    pub fn read(&self) -> Result<OrchestrationState, ArtifactError> {
        let value = self.read_value()?;
        self.typed(value)
    }

    fn typed(&self, value: Value) -> Result<OrchestrationState, ArtifactError> {
        let violations = schema::validate(&value);
        if !violations.is_empty() {
            return Err(ArtifactError::SchemaViolation {
                path: self.state_file.clone(),
                violations,
            });
        }
        serde_json::from_value(value).map_err(|e| ArtifactError::SchemaViolation {
            path: self.state_file.clone(),
            violations: vec![SchemaViolation::new("", e.to_string())],
        })
    }

    /// Stamp `last_updated` and persist the document atomically.
    pub fn write(&self, state: &mut OrchestrationState) -> Result<(), ArtifactError> {
        let _guard = self.lock()?;
        self.write_unlocked(state)
    }

    fn write_unlocked(&self, state: &mut OrchestrationState) -> Result<(), ArtifactError> {
        state.last_updated = Utc::now();
        let mut json = serde_json::to_string_pretty(state)?;
        json.push('\n');
        atomic_write(&self.state_file, json.as_bytes())
            .map_err(|e| ArtifactError::io(&self.state_file, e))?;
        info!(
            path = %self.state_file.display(),
            schema_version = %state.schema_version,
            "Wrote orchestration state"
        );
        Ok(())
    }

    /// Validate an untyped document and persist it.
    ///
    /// Used by free-form edits; nothing is written when the edited document
    /// violates the schema.
    pub fn write_value(&self, value: Value) -> Result<OrchestrationState, ArtifactError> {
        let _guard = self.lock()?;
        let mut state = self.typed(value)?;
        self.write_unlocked(&mut state)?;
        Ok(state)
    }

    /// Read, modify and write back while holding the lock.
    pub fn update<F>(&self, mutate: F) -> Result<OrchestrationState, ArtifactError>
    where
        F: FnOnce(&mut OrchestrationState),
    {
        let _guard = self.lock()?;
        let mut state = self.read()?;
        mutate(&mut state);
        self.write_unlocked(&mut state)?;
        Ok(state)
    }
}
