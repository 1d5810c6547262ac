//! Sequential stage execution.
//!
//! One run = one pass over the built stage list. Stages execute strictly
//! in order; the cancellation flag is checked at every stage boundary and,
//! when set, remaining stages are skipped and control proceeds directly
//! to finalize. A stage error aborts the remaining sequence and drives
//! the task to Failed. There is no stage-level retry and no timeout on
//! the primary engine stage.

use std::path::PathBuf;
use std::sync::Arc;

use terranode_core::error::{TaskError, TaskResult};
use terranode_core::layout;
use terranode_core::options::to_engine_args;
use terranode_core::progress::parse_progress_line;
use terranode_core::types::ResourceType;
use terranode_engine::tools::ToolParams;
use terranode_engine::{Invocation, Tool};
use terranode_events::payload::EVENT_TASK_RESOURCE;
use terranode_pipeline::StageSpec;

use crate::context::{remote_prefix, TaskContext};
use crate::task::{RunFields, Task};
use crate::{bundle, fetch, mesh};

/// Ceiling for stage-completion milestones; finalize owns the last 5%.
const MILESTONE_CEILING: usize = 95;

/// Execute the whole pipeline, then finalize.
pub(crate) async fn run_pipeline(task: Task, ctx: Arc<TaskContext>, stages: Vec<StageSpec>) {
    let fields = task.fields_for_run().await;
    let total = stages.len().max(1);
    let mut failure: Option<TaskError> = None;

    for (index, stage) in stages.iter().enumerate() {
        if task.is_canceled().await {
            tracing::info!(task = %fields.id, "Cancellation observed at stage boundary");
            break;
        }

        tracing::info!(task = %fields.id, stage = %stage, "Stage starting");
        match execute_stage(&task, &ctx, &fields, stage, milestone(index + 1, total)).await {
            Ok(()) => {
                task.update_progress(milestone(index + 1, total) as i64).await;
            }
            Err(e) => {
                tracing::warn!(task = %fields.id, stage = %stage, error = %e, "Stage failed");
                task.append_log(format!("Stage {stage} failed: {e}")).await;
                failure = Some(e);
                break;
            }
        }
    }

    task.finalize(&ctx, failure).await;
}

/// Progress value after `done` of `total` stages.
fn milestone(done: usize, total: usize) -> usize {
    (done * MILESTONE_CEILING) / total
}

async fn execute_stage(
    task: &Task,
    ctx: &Arc<TaskContext>,
    fields: &RunFields,
    stage: &StageSpec,
    ceiling: usize,
) -> TaskResult<()> {
    let task_dir = layout::task_dir(&ctx.data_root, fields.id);

    match stage {
        StageSpec::FetchInputs => {
            let dest = layout::input_dir(&ctx.data_root, fields.id);
            fetch::fetch_inputs(&fields.input_resources, &dest, ctx).await
        }

        StageSpec::Engine => {
            let mut params = ToolParams::new();
            params.insert("project-path".into(), path_str(&task_dir));
            let invocation = Invocation::new(Tool::Odm, params)
                .with_extra_args(to_engine_args(&fields.options))
                .with_lib_dir(ctx.tool_lib_dir.clone());
            let invocation = match &ctx.engine_dir {
                Some(dir) => invocation.with_cwd(dir.clone()),
                None => invocation,
            };
            run_tool(task, ctx, invocation, Some(ceiling)).await
        }

        StageSpec::PointCloudTranslate => {
            run_simple_tool(
                task,
                ctx,
                Tool::PdalTranslate,
                &[
                    ("input", task_dir.join(layout::POINTCLOUD_LAS)),
                    ("output", task_dir.join(layout::POINTCLOUD_LAZ)),
                ],
            )
            .await
        }

        StageSpec::PointCloudEpt => {
            run_simple_tool(
                task,
                ctx,
                Tool::EntwineBuild,
                &[
                    ("input", task_dir.join(layout::POINTCLOUD_LAZ)),
                    ("output", task_dir.join(layout::POINTCLOUD_EPT_DIR)),
                ],
            )
            .await
        }

        StageSpec::PointCloudStats => {
            run_simple_tool(
                task,
                ctx,
                Tool::PdalInfo,
                &[("input", task_dir.join(layout::POINTCLOUD_LAZ))],
            )
            .await
        }

        StageSpec::MeshRename => mesh::rename_mesh_artifacts(&task_dir).await,

        StageSpec::MeshCompress => {
            run_simple_tool(
                task,
                ctx,
                Tool::DracoEncode,
                &[
                    ("input", task_dir.join(layout::MESH_OBJ)),
                    ("output", task_dir.join(layout::MESH_DRC)),
                ],
            )
            .await
        }

        StageSpec::OrthophotoCog => {
            run_simple_tool(
                task,
                ctx,
                Tool::GdalTranslateCog,
                &[
                    ("input", task_dir.join(layout::ORTHOPHOTO_TIF)),
                    ("output", task_dir.join(layout::ORTHOPHOTO_COG)),
                ],
            )
            .await
        }

        StageSpec::Upload { resource } => {
            upload_resource(ctx, fields, &task_dir, *resource).await
        }

        StageSpec::Notify { resource } => {
            task.notify(ctx, &fields.webhook, EVENT_TASK_RESOURCE, Some(*resource))
                .await;
            Ok(())
        }

        StageSpec::Bundle { manifest } => {
            let dest = layout::bundle_path(&ctx.data_root, fields.id);
            let manifest = manifest.clone();
            let count = tokio::task::spawn_blocking(move || {
                bundle::bundle_artifacts(&task_dir, &manifest, &dest)
            })
            .await
            .map_err(|e| TaskError::Io(std::io::Error::other(e)))??;
            task.append_log(format!("Bundled {count} artifact files")).await;
            Ok(())
        }

        StageSpec::UploadAll => {
            let storage = ctx
                .storage
                .as_ref()
                .ok_or_else(|| TaskError::Network("No storage configured".to_string()))?;
            let prefix = remote_prefix(ctx, fields.owner_project.as_deref(), fields.id);
            let key = format!("{prefix}/{}", layout::BUNDLE_FILE);
            storage
                .upload_single(&key, &layout::bundle_path(&ctx.data_root, fields.id))
                .await
                .map_err(|e| TaskError::Network(e.to_string()))
        }

        StageSpec::TestSleep { millis } => {
            tokio::time::sleep(std::time::Duration::from_millis(*millis)).await;
            Ok(())
        }

        StageSpec::TestFail => Err(TaskError::ProcessExit { code: 1 }),
    }
}

/// Managed mode: upload one resource group's artifacts under the owning
/// project's prefix.
async fn upload_resource(
    ctx: &Arc<TaskContext>,
    fields: &RunFields,
    task_dir: &std::path::Path,
    resource: ResourceType,
) -> TaskResult<()> {
    let storage = ctx
        .storage
        .as_ref()
        .ok_or_else(|| TaskError::Network("No storage configured".to_string()))?;

    let relative: Vec<String> = layout::family_artifacts(resource)
        .iter()
        .map(|s| s.to_string())
        .collect();
    let prefix = remote_prefix(ctx, fields.owner_project.as_deref(), fields.id);

    storage
        .upload_paths(task_dir, &ctx.storage_bucket, &prefix, &relative)
        .await
        .map_err(|e| TaskError::Network(e.to_string()))
}

/// Run a tool whose parameters are plain path pairs.
async fn run_simple_tool(
    task: &Task,
    ctx: &Arc<TaskContext>,
    tool: Tool,
    params: &[(&str, PathBuf)],
) -> TaskResult<()> {
    let mut tool_params = ToolParams::new();
    for (name, path) in params {
        tool_params.insert(name.to_string(), path_str(path));
    }
    let invocation = Invocation::new(tool, tool_params).with_lib_dir(ctx.tool_lib_dir.clone());
    run_tool(task, ctx, invocation, None).await
}

/// Supervise one invocation: track the process handle, stream output into
/// the task log (scaling engine progress reports when a ceiling is
/// given), then surface the exit result.
async fn run_tool(
    task: &Task,
    ctx: &Arc<TaskContext>,
    invocation: Invocation,
    progress_ceiling: Option<usize>,
) -> TaskResult<()> {
    let mut run = ctx.supervisor.start(invocation)?;
    let key = task.track_process(run.handle()).await;

    while let Some(line) = run.next_line().await {
        if let Some(reported) = parse_progress_line(&line) {
            if let Some(ceiling) = progress_ceiling {
                task.update_progress(reported * ceiling as i64 / 100).await;
            }
        }
        task.append_log(line).await;
    }

    let result = run.wait().await;
    task.untrack_process(key).await;
    result
}

fn path_str(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}
