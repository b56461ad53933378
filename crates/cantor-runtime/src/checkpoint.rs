//! Checkpoint persistence for resumable runs.
//!
//! The engine saves the full [`ExecutionState`] after every stage
//! transition. Each save supersedes the previous checkpoint of the same
//! run; a run has exactly one writer.

use async_trait::async_trait;
use cantor_core::ExecutionState;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

lazy_static! {
    static ref RUN_ID: Regex = Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid regex");
}

/// Errors from checkpoint backends.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid run id '{0}': use letters, digits, '.', '_' or '-'")]
    InvalidRunId(String),
}

/// The last committed state of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub state: ExecutionState,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(run_id: impl Into<String>, state: ExecutionState) -> Self {
        Self {
            run_id: run_id.into(),
            state,
            saved_at: Utc::now(),
        }
    }
}

/// Reject run ids that could escape a storage namespace.
pub fn validate_run_id(run_id: &str) -> Result<(), CheckpointError> {
    if RUN_ID.is_match(run_id) && run_id != "." && run_id != ".." {
        Ok(())
    } else {
        Err(CheckpointError::InvalidRunId(run_id.to_string()))
    }
}

/// Durable storage for run checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist `state`, replacing any earlier checkpoint of `run_id`.
    async fn save(&self, run_id: &str, state: &ExecutionState) -> Result<(), CheckpointError>;

    /// Latest checkpoint of `run_id`, if one exists.
    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;
}

/// Process-local store, useful for tests and single-shot runs.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.lock().is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, run_id: &str, state: &ExecutionState) -> Result<(), CheckpointError> {
        validate_run_id(run_id)?;
        self.checkpoints
            .lock()
            .insert(run_id.to_string(), Checkpoint::new(run_id, state.clone()));
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        validate_run_id(run_id)?;
        Ok(self.checkpoints.lock().get(run_id).cloned())
    }
}

/// One JSON file per run under a directory.
///
/// Writes go to a temporary file that is then renamed over the previous
/// checkpoint, so a crash mid-write leaves the old checkpoint intact.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, run_id: &str, state: &ExecutionState) -> Result<(), CheckpointError> {
        validate_run_id(run_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let checkpoint = Checkpoint::new(run_id, state.clone());
        let json = serde_json::to_vec_pretty(&checkpoint)?;

        let target = self.path(run_id);
        let temp = self.dir.join(format!(".{}.json.tmp", run_id));
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &target).await?;

        tracing::trace!(run_id, path = %target.display(), "Checkpoint written");
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        validate_run_id(run_id)?;
        match tokio::fs::read(self.path(run_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
