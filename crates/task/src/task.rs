//! The task entity and its lifecycle operations.
//!
//! All mutation goes through the methods here; no other component touches
//! task state directly. The lifecycle is the closed state machine from
//! `terranode_core::status`, and every operation that is illegal in the
//! current state returns [`TaskError::InvalidState`] to its caller
//! instead of recording a task failure.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use terranode_core::error::{TaskError, TaskResult};
use terranode_core::layout;
use terranode_core::options::{validate_options, TaskOptions};
use terranode_core::progress::ProgressTracker;
use terranode_core::status::{StatusCode, TaskStatus};
use terranode_core::types::{TaskId, TaskKind};
use terranode_engine::ProcessHandle;
use terranode_events::payload::{
    EVENT_TASK_CANCELED, EVENT_TASK_COMPLETED, EVENT_TASK_CREATED, EVENT_TASK_FAILED,
};
use terranode_events::TaskNotification;
use terranode_pipeline::{build_pipeline, PipelineContext, StageSpec};

use crate::context::{remote_prefix, TaskContext};
use crate::runner;
use crate::store::TaskSnapshot;

// ---------------------------------------------------------------------------
// NewTask
// ---------------------------------------------------------------------------

/// Everything the intake layer supplies when creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub name: Option<String>,
    pub kind: TaskKind,
    pub owner_project: Option<String>,
    pub options: TaskOptions,
    pub requested_outputs: Vec<String>,
    pub input_resources: Vec<String>,
    pub webhook: Option<String>,
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A single orchestrated job. Cheap to clone; all clones share state.
#[derive(Clone, Debug)]
pub struct Task {
    inner: Arc<Mutex<TaskInner>>,
}

#[derive(Debug)]
struct TaskInner {
    id: TaskId,
    name: String,
    kind: TaskKind,
    owner_project: Option<String>,
    options: TaskOptions,
    requested_outputs: Vec<String>,
    input_resources: Vec<String>,
    webhook: Option<String>,
    status: TaskStatus,
    progress: ProgressTracker,
    log: Vec<String>,
    /// Live external-process handles; non-empty only while Running.
    running: HashMap<u64, ProcessHandle>,
    next_process_key: u64,
    date_created: DateTime<Utc>,
    date_started: Option<DateTime<Utc>>,
    /// Set once by finalize; `None` while the run is live.
    frozen_processing_time_ms: Option<i64>,
}

impl TaskInner {
    fn processing_time_ms(&self) -> i64 {
        if let Some(frozen) = self.frozen_processing_time_ms {
            return frozen;
        }
        match self.date_started {
            Some(started) => (Utc::now() - started).num_milliseconds().max(0),
            None => 0,
        }
    }
}

/// Public projection of a task's state (API responses and webhook bodies).
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub kind: TaskKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_project: Option<String>,
    pub status: TaskStatus,
    pub progress: u8,
    pub processing_time_ms: i64,
    pub date_created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_started: Option<DateTime<Utc>>,
    pub options: TaskOptions,
    pub requested_outputs: Vec<String>,
}

impl Task {
    /// Create a fresh task in Queued and materialize its working
    /// directory.
    pub async fn create(new: NewTask, ctx: &TaskContext) -> TaskResult<Task> {
        validate_options(&new.options)?;

        let id = TaskId::new();
        let name = new
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Task {}", &id.to_string()[..8]));

        tokio::fs::create_dir_all(layout::input_dir(&ctx.data_root, id)).await?;

        let task = Task {
            inner: Arc::new(Mutex::new(TaskInner {
                id,
                name,
                kind: new.kind,
                owner_project: new.owner_project,
                options: new.options,
                requested_outputs: new.requested_outputs,
                input_resources: new.input_resources,
                webhook: new.webhook,
                status: TaskStatus::default(),
                progress: ProgressTracker::new(),
                log: Vec::new(),
                running: HashMap::new(),
                next_process_key: 0,
                date_created: Utc::now(),
                date_started: None,
                frozen_processing_time_ms: None,
            })),
        };

        Ok(task)
    }

    /// Rebuild a task from its durable snapshot.
    ///
    /// Crash-recovery policy: a snapshot claiming Running cannot have
    /// survived a node restart mid-run, so it is forced back to Queued
    /// and the pipeline restarts from the top on the next `start()`.
    pub fn from_snapshot(snapshot: TaskSnapshot) -> Task {
        let mut status = snapshot.status;
        if status.code == StatusCode::Running {
            tracing::info!(task = %snapshot.id, "Re-queueing task that was running at shutdown");
            status = TaskStatus::new(StatusCode::Queued);
        }

        let mut progress = ProgressTracker::new();
        if status.code == StatusCode::Completed {
            progress.finalize();
        }

        Task {
            inner: Arc::new(Mutex::new(TaskInner {
                id: snapshot.id,
                name: snapshot.name,
                kind: snapshot.kind,
                owner_project: snapshot.owner_project,
                options: snapshot.options,
                requested_outputs: snapshot.requested_outputs,
                input_resources: snapshot.input_resources,
                webhook: snapshot.webhook,
                status,
                progress,
                log: snapshot.log,
                running: HashMap::new(),
                next_process_key: 0,
                date_created: snapshot.date_created,
                date_started: snapshot.date_started,
                frozen_processing_time_ms: snapshot.processing_time_ms,
            })),
        }
    }

    // -- identity & projections --

    pub async fn id(&self) -> TaskId {
        self.inner.lock().await.id
    }

    pub async fn info(&self) -> TaskInfo {
        let inner = self.inner.lock().await;
        TaskInfo {
            id: inner.id,
            name: inner.name.clone(),
            kind: inner.kind,
            owner_project: inner.owner_project.clone(),
            status: inner.status.clone(),
            progress: inner.progress.value(),
            processing_time_ms: inner.processing_time_ms(),
            date_created: inner.date_created,
            date_started: inner.date_started,
            options: inner.options.clone(),
            requested_outputs: inner.requested_outputs.clone(),
        }
    }

    pub async fn status_code(&self) -> StatusCode {
        self.inner.lock().await.status.code
    }

    pub async fn log_lines(&self) -> Vec<String> {
        self.inner.lock().await.log.clone()
    }

    /// The durable projection of this task.
    pub async fn snapshot(&self) -> TaskSnapshot {
        let inner = self.inner.lock().await;
        TaskSnapshot {
            id: inner.id,
            name: inner.name.clone(),
            kind: inner.kind,
            owner_project: inner.owner_project.clone(),
            options: inner.options.clone(),
            requested_outputs: inner.requested_outputs.clone(),
            input_resources: inner.input_resources.clone(),
            webhook: inner.webhook.clone(),
            status: inner.status.clone(),
            date_created: inner.date_created,
            date_started: inner.date_started,
            processing_time_ms: inner.frozen_processing_time_ms,
            log: inner.log.clone(),
        }
    }

    // -- lifecycle operations --

    /// Queued -> Running. Builds the pipeline, fires the creation
    /// notification, and spawns the run; stage execution is asynchronous
    /// relative to this call.
    pub async fn start(&self, ctx: &Arc<TaskContext>) -> TaskResult<()> {
        let (stages, webhook, id) = {
            let mut inner = self.inner.lock().await;
            if inner.status.code != StatusCode::Queued {
                return Err(TaskError::InvalidState(format!(
                    "Cannot start task in state '{}'",
                    inner.status.code
                )));
            }
            inner.status = TaskStatus::new(StatusCode::Running);
            inner.date_started = Some(Utc::now());
            inner.frozen_processing_time_ms = None;

            let stages = build_pipeline(&PipelineContext {
                kind: inner.kind,
                requested_outputs: &inner.requested_outputs,
                owner_project: inner.owner_project.as_deref(),
                storage_configured: ctx.storage_configured(),
                input_count: inner.input_resources.len(),
                hooks: ctx.hooks,
            });
            (stages, inner.webhook.clone(), inner.id)
        };

        tracing::info!(task = %id, stages = stages.len(), "Task starting");
        self.notify(ctx, &webhook, EVENT_TASK_CREATED, None).await;

        let task = self.clone();
        let ctx = Arc::clone(ctx);
        tokio::spawn(async move {
            runner::run_pipeline(task, ctx, stages).await;
        });

        Ok(())
    }

    /// Any non-Canceled state -> Canceled.
    ///
    /// If the task was Running, every tracked process is signaled and
    /// the tracked set cleared. Best-effort by contract: a supervised
    /// program may have spawned subprocesses the node never saw; those
    /// are not reached. Already-scheduled stage continuations stop at
    /// the next stage boundary, not instantaneously.
    pub async fn cancel(&self) -> TaskResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.status.code == StatusCode::Canceled {
            return Err(TaskError::InvalidState(
                "Task is already canceled".to_string(),
            ));
        }

        let was_running = inner.status.code == StatusCode::Running;
        inner.status = TaskStatus::new(StatusCode::Canceled);

        if was_running {
            tracing::info!(
                task = %inner.id,
                processes = inner.running.len(),
                "Canceling task, signaling tracked processes"
            );
            for handle in inner.running.values() {
                handle.terminate();
            }
            inner.running.clear();
        }

        Ok(())
    }

    /// Terminal state -> Queued, ready for a fresh run.
    pub async fn restart(&self, new_options: Option<TaskOptions>) -> TaskResult<()> {
        if let Some(options) = &new_options {
            validate_options(options)?;
        }

        let mut inner = self.inner.lock().await;
        if !inner.status.code.is_terminal() {
            return Err(TaskError::InvalidState(format!(
                "Cannot restart task in state '{}'",
                inner.status.code
            )));
        }

        inner.status = TaskStatus::default();
        inner.progress.reset();
        inner.log.clear();
        inner.date_created = Utc::now();
        inner.date_started = None;
        inner.frozen_processing_time_ms = None;
        if let Some(options) = new_options {
            inner.options = options;
        }

        tracing::info!(task = %inner.id, "Task reset to queued");
        Ok(())
    }

    /// Remove the task's entire working directory tree. Idempotent: an
    /// already-absent directory is not an error.
    pub async fn remove(&self, ctx: &TaskContext) -> TaskResult<()> {
        // Stop any live run first; an InvalidState here only means the
        // task was already canceled.
        let _ = self.cancel().await;

        let id = self.id().await;
        let dir = layout::task_dir(&ctx.data_root, id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(TaskError::Io(e)),
        }

        tracing::info!(task = %id, "Working directory removed");
        Ok(())
    }

    // -- run-time feeds (used by the stage runner) --

    pub(crate) async fn is_canceled(&self) -> bool {
        self.inner.lock().await.status.code == StatusCode::Canceled
    }

    pub(crate) async fn append_log(&self, line: String) {
        self.inner.lock().await.log.push(line);
    }

    pub(crate) async fn update_progress(&self, reported: i64) {
        self.inner.lock().await.progress.update(reported);
    }

    pub(crate) async fn track_process(&self, handle: ProcessHandle) -> u64 {
        let mut inner = self.inner.lock().await;
        let key = inner.next_process_key;
        inner.next_process_key += 1;
        inner.running.insert(key, handle);
        key
    }

    pub(crate) async fn untrack_process(&self, key: u64) {
        self.inner.lock().await.running.remove(&key);
    }

    pub(crate) async fn running_process_count(&self) -> usize {
        self.inner.lock().await.running.len()
    }

    pub(crate) async fn fields_for_run(&self) -> RunFields {
        let inner = self.inner.lock().await;
        RunFields {
            id: inner.id,
            owner_project: inner.owner_project.clone(),
            options: inner.options.clone(),
            input_resources: inner.input_resources.clone(),
            webhook: inner.webhook.clone(),
        }
    }

    /// End-of-run finalizer. Always executes, whatever the outcome:
    /// records the terminal status, forces progress to 100, freezes the
    /// processing time, persists the log, attempts a best-effort log
    /// upload, fires the completion notification, and saves a snapshot.
    pub(crate) async fn finalize(&self, ctx: &Arc<TaskContext>, failure: Option<TaskError>) {
        let (id, owner, webhook, event, log_text) = {
            let mut inner = self.inner.lock().await;
            if inner.status.code == StatusCode::Running {
                inner.status = match &failure {
                    None => TaskStatus::new(StatusCode::Completed),
                    Some(e) => TaskStatus::failed(e.to_string()),
                };
            }
            let elapsed = inner.processing_time_ms();
            inner.frozen_processing_time_ms = Some(elapsed);
            inner.progress.finalize();
            inner.running.clear();

            let event = match inner.status.code {
                StatusCode::Failed => EVENT_TASK_FAILED,
                StatusCode::Canceled => EVENT_TASK_CANCELED,
                _ => EVENT_TASK_COMPLETED,
            };
            (
                inner.id,
                inner.owner_project.clone(),
                inner.webhook.clone(),
                event,
                inner.log.join("\n"),
            )
        };

        // Persist the accumulated log next to the artifacts.
        let log_path = layout::log_path(&ctx.data_root, id);
        if let Err(e) = tokio::fs::write(&log_path, format!("{log_text}\n")).await {
            tracing::warn!(task = %id, error = %e, "Failed to persist run log");
        }

        // Best-effort log upload; never affects the task outcome.
        if let Some(storage) = &ctx.storage {
            let key = format!("{}/{}", remote_prefix(ctx, owner.as_deref(), id), layout::LOG_FILE);
            if let Err(e) = storage.upload_single(&key, &log_path).await {
                tracing::warn!(task = %id, error = %e, "Failed to upload run log");
            }
        }

        self.notify(ctx, &webhook, event, None).await;

        let snapshot = self.snapshot().await;
        if let Err(e) = ctx.store.save(&snapshot).await {
            tracing::warn!(task = %id, error = %e, "Failed to save task snapshot");
        }

        tracing::info!(task = %id, event, "Task finalized");
    }

    /// Fire-and-forget webhook dispatch for one lifecycle event.
    pub(crate) async fn notify(
        &self,
        ctx: &Arc<TaskContext>,
        webhook: &Option<String>,
        event: &str,
        resource: Option<terranode_core::types::ResourceType>,
    ) {
        let Some(url) = webhook else { return };

        let info = self.info().await;
        let body = match serde_json::to_value(&info) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(task = %info.id, error = %e, "Failed to encode task info");
                return;
            }
        };

        let mut notification = TaskNotification::new(event, body);
        if let Some(resource) = resource {
            notification = notification.with_resource(resource);
        }
        ctx.dispatcher.dispatch(url, notification);
    }

    /// The pipeline the next `start()` would build, for diagnostics.
    pub async fn planned_pipeline(&self, ctx: &TaskContext) -> Vec<StageSpec> {
        let inner = self.inner.lock().await;
        build_pipeline(&PipelineContext {
            kind: inner.kind,
            requested_outputs: &inner.requested_outputs,
            owner_project: inner.owner_project.as_deref(),
            storage_configured: ctx.storage_configured(),
            input_count: inner.input_resources.len(),
            hooks: ctx.hooks,
        })
    }
}

/// The immutable-per-run fields the stage runner needs.
pub(crate) struct RunFields {
    pub id: TaskId,
    pub owner_project: Option<String>,
    pub options: TaskOptions,
    pub input_resources: Vec<String>,
    pub webhook: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    use assert_matches::assert_matches;

    use terranode_engine::{EngineMode, Supervisor};
    use terranode_events::NotificationDispatcher;
    use terranode_pipeline::TestHooks;

    use crate::store::TaskStore;

    fn test_ctx(root: &Path, hooks: TestHooks) -> Arc<TaskContext> {
        Arc::new(TaskContext {
            data_root: root.to_path_buf(),
            supervisor: Supervisor::new(EngineMode::Replay),
            storage: None,
            storage_bucket: "terranode-artifacts".into(),
            storage_prefix: "tasks".into(),
            dispatcher: NotificationDispatcher::new(),
            hooks,
            engine_dir: None,
            tool_lib_dir: None,
            http: reqwest::Client::new(),
            store: TaskStore::new(root),
        })
    }

    async fn wait_terminal(task: &Task) -> StatusCode {
        for _ in 0..500 {
            let code = task.status_code().await;
            if code.is_terminal() {
                return code;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task never reached a terminal state");
    }

    #[tokio::test]
    async fn create_materializes_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), TestHooks::default());
        let task = Task::create(NewTask::default(), &ctx).await.unwrap();

        let id = task.id().await;
        assert!(layout::input_dir(dir.path(), id).is_dir());
        assert_eq!(task.status_code().await, StatusCode::Queued);
    }

    #[tokio::test]
    async fn start_is_rejected_outside_queued() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), TestHooks::default());
        let task = Task::create(NewTask::default(), &ctx).await.unwrap();

        task.start(&ctx).await.unwrap();
        let err = task.start(&ctx).await.unwrap_err();
        assert_matches!(err, TaskError::InvalidState(_));

        wait_terminal(&task).await;
    }

    #[tokio::test]
    async fn replayed_run_completes_and_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), TestHooks::default());
        let task = Task::create(NewTask::default(), &ctx).await.unwrap();
        let id = task.id().await;

        task.start(&ctx).await.unwrap();
        assert_eq!(wait_terminal(&task).await, StatusCode::Completed);

        let info = task.info().await;
        assert_eq!(info.progress, 100);
        assert!(info.date_started.is_some());

        // Finalize persisted the log, the bundle, and a snapshot.
        assert!(!task.log_lines().await.is_empty());
        assert!(layout::log_path(dir.path(), id).is_file());
        assert!(layout::bundle_path(dir.path(), id).is_file());
        assert!(layout::task_dir(dir.path(), id)
            .join(crate::store::SNAPSHOT_FILE)
            .is_file());
    }

    #[tokio::test]
    async fn forced_failure_hook_drives_task_to_failed() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(
            dir.path(),
            TestHooks {
                sleep_millis: None,
                fail: true,
            },
        );
        let task = Task::create(NewTask::default(), &ctx).await.unwrap();

        task.start(&ctx).await.unwrap();
        assert_eq!(wait_terminal(&task).await, StatusCode::Failed);

        let info = task.info().await;
        assert!(info
            .status
            .error_message
            .as_deref()
            .unwrap()
            .contains("exited with code 1"));
        // Finalize still forces progress to 100 on failure.
        assert_eq!(info.progress, 100);
    }

    #[tokio::test]
    async fn cancel_from_queued_and_double_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), TestHooks::default());
        let task = Task::create(NewTask::default(), &ctx).await.unwrap();

        task.cancel().await.unwrap();
        assert_eq!(task.status_code().await, StatusCode::Canceled);

        let err = task.cancel().await.unwrap_err();
        assert_matches!(err, TaskError::InvalidState(msg) => {
            assert!(msg.contains("already canceled"));
        });
    }

    #[tokio::test]
    async fn cancel_while_running_clears_process_set_and_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(
            dir.path(),
            TestHooks {
                sleep_millis: Some(400),
                fail: false,
            },
        );
        let task = Task::create(NewTask::default(), &ctx).await.unwrap();

        task.start(&ctx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        task.cancel().await.unwrap();
        assert_eq!(task.status_code().await, StatusCode::Canceled);
        assert_eq!(task.running_process_count().await, 0);

        // Finalize runs after the stage boundary check and must not
        // overwrite Canceled.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(task.status_code().await, StatusCode::Canceled);
        assert_eq!(task.info().await.progress, 100);
    }

    #[tokio::test]
    async fn restart_is_rejected_outside_terminal_states() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), TestHooks::default());
        let task = Task::create(NewTask::default(), &ctx).await.unwrap();

        // Queued is not restartable.
        let err = task.restart(None).await.unwrap_err();
        assert_matches!(err, TaskError::InvalidState(_));
        assert_eq!(task.status_code().await, StatusCode::Queued);
    }

    #[tokio::test]
    async fn restart_resets_state_and_replaces_options() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), TestHooks::default());
        let task = Task::create(NewTask::default(), &ctx).await.unwrap();

        task.start(&ctx).await.unwrap();
        wait_terminal(&task).await;

        let mut options = TaskOptions::new();
        options.insert("feature-quality".into(), "high".into());
        task.restart(Some(options)).await.unwrap();

        let info = task.info().await;
        assert_eq!(info.status.code, StatusCode::Queued);
        assert_eq!(info.progress, 0);
        assert!(task.log_lines().await.is_empty());
        assert!(info.date_started.is_none());
        assert_eq!(info.options.get("feature-quality").map(String::as_str), Some("high"));

        // And the second run works.
        task.start(&ctx).await.unwrap();
        assert_eq!(wait_terminal(&task).await, StatusCode::Completed);
    }

    #[tokio::test]
    async fn snapshot_running_reconstructs_as_queued() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), TestHooks::default());
        let task = Task::create(NewTask::default(), &ctx).await.unwrap();

        let mut snapshot = task.snapshot().await;
        snapshot.status = TaskStatus::new(StatusCode::Running);

        let restored = Task::from_snapshot(snapshot);
        assert_eq!(restored.status_code().await, StatusCode::Queued);
        assert_eq!(restored.running_process_count().await, 0);
    }

    #[tokio::test]
    async fn snapshot_preserves_terminal_state_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), TestHooks::default());
        let task = Task::create(NewTask::default(), &ctx).await.unwrap();

        task.start(&ctx).await.unwrap();
        wait_terminal(&task).await;

        let snapshot = task.snapshot().await;
        let restored = Task::from_snapshot(snapshot);
        assert_eq!(restored.status_code().await, StatusCode::Completed);
        assert_eq!(restored.info().await.progress, 100);
        assert_eq!(restored.log_lines().await, task.log_lines().await);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), TestHooks::default());
        let task = Task::create(NewTask::default(), &ctx).await.unwrap();
        let id = task.id().await;

        task.remove(&ctx).await.unwrap();
        assert!(!layout::task_dir(dir.path(), id).exists());

        // Second removal: the directory is gone, and that is fine.
        task.remove(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_option_names_are_rejected_at_creation() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), TestHooks::default());

        let mut options = TaskOptions::new();
        options.insert("bad name!".into(), "1".into());
        let err = Task::create(
            NewTask {
                options,
                ..NewTask::default()
            },
            &ctx,
        )
        .await
        .unwrap_err();
        assert_matches!(err, TaskError::Configuration(_));
    }
}
