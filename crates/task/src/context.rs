//! Shared collaborators handed to every task run.

use std::path::PathBuf;
use std::sync::Arc;

use terranode_cloud::ObjectStorage;
use terranode_core::types::TaskId;
use terranode_engine::Supervisor;
use terranode_events::NotificationDispatcher;
use terranode_pipeline::TestHooks;

use crate::store::TaskStore;

/// Everything a running task needs besides its own state.
///
/// Created once at node startup and cheaply shared via `Arc`.
pub struct TaskContext {
    /// Root directory holding one working directory per task.
    pub data_root: PathBuf,
    /// External tool supervision (live or replay).
    pub supervisor: Supervisor,
    /// Remote artifact storage, when configured.
    pub storage: Option<Arc<dyn ObjectStorage>>,
    /// Bucket used for per-artifact uploads.
    pub storage_bucket: String,
    /// Key prefix for standalone-task uploads.
    pub storage_prefix: String,
    /// Webhook delivery.
    pub dispatcher: NotificationDispatcher,
    /// Deterministic test-only pipeline stages.
    pub hooks: TestHooks,
    /// Directory the reconstruction engine runs from.
    pub engine_dir: Option<PathBuf>,
    /// `LD_LIBRARY_PATH` override for the bundled tools.
    pub tool_lib_dir: Option<PathBuf>,
    /// HTTP client for input-resource fetching.
    pub http: reqwest::Client,
    /// Snapshot persistence.
    pub store: TaskStore,
}

impl TaskContext {
    /// Whether a remote-storage collaborator is configured.
    pub fn storage_configured(&self) -> bool {
        self.storage.is_some()
    }
}

/// Remote key prefix for a task's artifacts.
///
/// Managed tasks are filed under their owning project; standalone tasks
/// under the node-wide prefix.
pub(crate) fn remote_prefix(ctx: &TaskContext, owner_project: Option<&str>, id: TaskId) -> String {
    match owner_project {
        Some(owner) => format!("{owner}/{id}"),
        None => format!("{}/{id}", ctx.storage_prefix),
    }
}
