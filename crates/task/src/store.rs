//! Durable task snapshots.
//!
//! One `task.json` per task working directory. The snapshot carries the
//! durable fields only, never the running-process set or other
//! transients, and is the node's crash-recovery record: on boot,
//! [`TaskStore::load_all`] reads every snapshot back and the registry
//! reconstructs tasks from them.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use terranode_core::error::{TaskError, TaskResult};
use terranode_core::layout;
use terranode_core::options::TaskOptions;
use terranode_core::status::TaskStatus;
use terranode_core::types::{TaskId, TaskKind};

/// Snapshot file name inside each task directory.
pub const SNAPSHOT_FILE: &str = "task.json";

// ---------------------------------------------------------------------------
// TaskSnapshot
// ---------------------------------------------------------------------------

/// The durable projection of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub kind: TaskKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_project: Option<String>,
    pub options: TaskOptions,
    #[serde(default)]
    pub requested_outputs: Vec<String>,
    #[serde(default)]
    pub input_resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
    pub status: TaskStatus,
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub date_started: Option<DateTime<Utc>>,
    /// Frozen processing time for finished runs; `None` while live.
    #[serde(default)]
    pub processing_time_ms: Option<i64>,
    /// Accumulated run log.
    #[serde(default)]
    pub log: Vec<String>,
}

// ---------------------------------------------------------------------------
// TaskStore
// ---------------------------------------------------------------------------

/// Reads and writes snapshots under the node data root.
pub struct TaskStore {
    data_root: PathBuf,
}

impl TaskStore {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    fn snapshot_path(&self, id: TaskId) -> PathBuf {
        layout::task_dir(&self.data_root, id).join(SNAPSHOT_FILE)
    }

    /// Persist one snapshot, creating the task directory if needed.
    pub async fn save(&self, snapshot: &TaskSnapshot) -> TaskResult<()> {
        let path = self.snapshot_path(snapshot.id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| TaskError::Io(std::io::Error::other(e)))?;
        tokio::fs::write(&path, json).await?;
        Ok(())
    }

    /// Load every readable snapshot under the data root.
    ///
    /// Unreadable or unparsable snapshots are skipped with a warning;
    /// one corrupt task must not take the node down on boot.
    pub async fn load_all(&self) -> TaskResult<Vec<TaskSnapshot>> {
        let mut snapshots = Vec::new();
        if !self.data_root.is_dir() {
            return Ok(snapshots);
        }

        let mut entries = tokio::fs::read_dir(&self.data_root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let path = dir.join(SNAPSHOT_FILE);
            match read_snapshot(&path).await {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable snapshot");
                }
            }
        }

        Ok(snapshots)
    }
}

async fn read_snapshot(path: &Path) -> Result<Option<TaskSnapshot>, std::io::Error> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let snapshot = serde_json::from_slice(&bytes).map_err(std::io::Error::other)?;
            Ok(Some(snapshot))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
