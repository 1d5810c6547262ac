//! In-memory task registry.
//!
//! Maps task ids to live [`Task`] handles. Each task owns its own state,
//! so the registry only needs a read-mostly map; no cross-task locking.

use std::collections::HashMap;

use tokio::sync::RwLock;

use terranode_core::error::TaskResult;
use terranode_core::types::TaskId;

use crate::context::TaskContext;
use crate::task::Task;

/// All tasks known to this node, live and finished.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Load every snapshot from the store and reconstruct its task,
    /// applying the crash-recovery policy.
    pub async fn restore(ctx: &TaskContext) -> TaskResult<Self> {
        let registry = Self::new();
        let snapshots = ctx.store.load_all().await?;
        let count = snapshots.len();

        {
            let mut tasks = registry.tasks.write().await;
            for snapshot in snapshots {
                let task = Task::from_snapshot(snapshot);
                tasks.insert(task.id().await, task);
            }
        }

        tracing::info!(count, "Restored tasks from snapshots");
        Ok(registry)
    }

    pub async fn insert(&self, task: Task) {
        let id = task.id().await;
        self.tasks.write().await.insert(id, task);
    }

    pub async fn get(&self, id: TaskId) -> Option<Task> {
        self.tasks.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: TaskId) -> Option<Task> {
        self.tasks.write().await.remove(&id)
    }

    /// All registered tasks, in no particular order.
    pub async fn list(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use terranode_core::status::{StatusCode, TaskStatus};
    use terranode_engine::{EngineMode, Supervisor};
    use terranode_events::NotificationDispatcher;
    use terranode_pipeline::TestHooks;

    use crate::store::TaskStore;
    use crate::task::{NewTask, Task};

    fn test_ctx(root: &Path) -> TaskContext {
        TaskContext {
            data_root: root.to_path_buf(),
            supervisor: Supervisor::new(EngineMode::Replay),
            storage: None,
            storage_bucket: String::new(),
            storage_prefix: "tasks".into(),
            dispatcher: NotificationDispatcher::new(),
            hooks: TestHooks::default(),
            engine_dir: None,
            tool_lib_dir: None,
            http: reqwest::Client::new(),
            store: TaskStore::new(root),
        }
    }

    #[tokio::test]
    async fn insert_get_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let registry = TaskRegistry::new();

        let task = Task::create(NewTask::default(), &ctx).await.unwrap();
        let id = task.id().await;

        registry.insert(task).await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.get(id).await.is_some());

        registry.remove(id).await;
        assert!(registry.get(id).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn restore_requeues_tasks_that_were_running() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());

        let task = Task::create(NewTask::default(), &ctx).await.unwrap();
        let mut snapshot = task.snapshot().await;
        snapshot.status = TaskStatus::new(StatusCode::Running);
        ctx.store.save(&snapshot).await.unwrap();

        let registry = TaskRegistry::restore(&ctx).await.unwrap();
        assert_eq!(registry.len().await, 1);

        let restored = registry.get(snapshot.id).await.unwrap();
        assert_eq!(restored.status_code().await, StatusCode::Queued);
    }

    #[tokio::test]
    async fn restore_on_empty_root_yields_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let registry = TaskRegistry::restore(&ctx).await.unwrap();
        assert!(registry.is_empty().await);
    }
}
