//! Task intake endpoints.
//!
//! The handlers translate HTTP requests into task lifecycle operations
//! and persist a snapshot after every state change. Lifecycle misuse
//! maps to 409, configuration problems to 400; everything else is the
//! task's own business.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use terranode_core::options::TaskOptions;
use terranode_core::types::{TaskId, TaskKind};
use terranode_task::{NewTask, Task, TaskInfo};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/{id}", get(task_info).delete(remove_task))
        .route("/tasks/{id}/log", get(task_log))
        .route("/tasks/{id}/cancel", post(cancel_task))
        .route("/tasks/{id}/restart", post(restart_task))
        .route("/tasks/{id}/pipeline", get(task_pipeline))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_id(raw: &str) -> AppResult<TaskId> {
    TaskId::parse(raw).map_err(|_| AppError::BadRequest(format!("'{raw}' is not a valid task id")))
}

async fn lookup(state: &AppState, raw: &str) -> AppResult<Task> {
    let id = parse_id(raw)?;
    state
        .registry
        .get(id)
        .await
        .ok_or_else(|| AppError::TaskNotFound(raw.to_string()))
}

/// Persist a snapshot after a state change; persistence problems are
/// logged, not surfaced: the in-memory state is already authoritative.
async fn persist(state: &AppState, task: &Task) {
    let snapshot = task.snapshot().await;
    if let Err(e) = state.ctx.store.save(&snapshot).await {
        tracing::warn!(task = %snapshot.id, error = %e, "Failed to save task snapshot");
    }
}

// ---------------------------------------------------------------------------
// POST /tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub name: Option<String>,
    /// `reconstruction` (default) or `conversion`.
    pub kind: Option<String>,
    pub owner_project: Option<String>,
    #[serde(default)]
    pub options: TaskOptions,
    #[serde(default)]
    pub requested_outputs: Vec<String>,
    #[serde(default)]
    pub input_resources: Vec<String>,
    pub webhook: Option<String>,
    /// Start the run immediately after creation (default: true).
    pub auto_start: Option<bool>,
}

async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> AppResult<impl IntoResponse> {
    let kind = match &request.kind {
        Some(raw) => TaskKind::from_str(raw)?,
        None => TaskKind::default(),
    };

    let task = Task::create(
        NewTask {
            name: request.name,
            kind,
            owner_project: request.owner_project,
            options: request.options,
            requested_outputs: request.requested_outputs,
            input_resources: request.input_resources,
            webhook: request.webhook,
        },
        &state.ctx,
    )
    .await?;

    state.registry.insert(task.clone()).await;
    persist(&state, &task).await;

    if request.auto_start.unwrap_or(true) {
        task.start(&state.ctx).await?;
        persist(&state, &task).await;
    }

    Ok((StatusCode::CREATED, Json(task.info().await)))
}

// ---------------------------------------------------------------------------
// GET /tasks, GET /tasks/{id}, GET /tasks/{id}/log
// ---------------------------------------------------------------------------

async fn list_tasks(State(state): State<AppState>) -> Json<Vec<TaskInfo>> {
    let tasks = state.registry.list().await;
    let mut infos = Vec::with_capacity(tasks.len());
    for task in tasks {
        infos.push(task.info().await);
    }
    infos.sort_by_key(|info| info.date_created);
    Json(infos)
}

async fn task_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<TaskInfo>> {
    let task = lookup(&state, &id).await?;
    Ok(Json(task.info().await))
}

async fn task_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<String>>> {
    let task = lookup(&state, &id).await?;
    Ok(Json(task.log_lines().await))
}

/// Diagnostic view of the stage list the next run would execute.
async fn task_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<String>>> {
    let task = lookup(&state, &id).await?;
    let stages = task.planned_pipeline(&state.ctx).await;
    Ok(Json(stages.iter().map(|s| s.to_string()).collect()))
}

// ---------------------------------------------------------------------------
// POST /tasks/{id}/cancel, POST /tasks/{id}/restart
// ---------------------------------------------------------------------------

async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<TaskInfo>> {
    let task = lookup(&state, &id).await?;
    task.cancel().await?;
    persist(&state, &task).await;
    Ok(Json(task.info().await))
}

#[derive(Debug, Default, Deserialize)]
pub struct RestartTaskRequest {
    /// Replacement engine options; the previous options are kept when
    /// absent.
    pub options: Option<TaskOptions>,
    /// Start the fresh run immediately (default: true).
    pub auto_start: Option<bool>,
}

async fn restart_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Option<Json<RestartTaskRequest>>,
) -> AppResult<Json<TaskInfo>> {
    let request = match request {
        Some(Json(request)) => request,
        None => RestartTaskRequest::default(),
    };
    let task = lookup(&state, &id).await?;

    task.restart(request.options).await?;
    persist(&state, &task).await;

    if request.auto_start.unwrap_or(true) {
        task.start(&state.ctx).await?;
        persist(&state, &task).await;
    }

    Ok(Json(task.info().await))
}

// ---------------------------------------------------------------------------
// DELETE /tasks/{id}
// ---------------------------------------------------------------------------

async fn remove_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let task = lookup(&state, &id).await?;
    task.remove(&state.ctx).await?;
    state.registry.remove(task.id().await).await;
    Ok(Json(serde_json::json!({ "removed": true })))
}
