//! The pipeline builder.
//!
//! Pure function of (job kind, requested outputs, mode) -> ordered stage
//! list. The mode branch is the significant decision: standalone tasks
//! end in a single bundling stage (plus an upload when storage is
//! configured), while managed tasks upload and notify per resource group
//! so subscribers can react to partial availability.

use terranode_core::layout;
use terranode_core::types::{ResourceType, TaskKind};

use crate::stage::StageSpec;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Deterministic test-only stages injected by configuration.
///
/// Injection never changes any other builder decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestHooks {
    /// Insert a fixed sleep after the engine stage.
    pub sleep_millis: Option<u64>,
    /// Insert a stage that fails deterministically.
    pub fail: bool,
}

/// Everything the builder needs to know about a task, by value.
#[derive(Debug, Clone)]
pub struct PipelineContext<'a> {
    pub kind: TaskKind,
    /// Artifact path identifiers the caller wants; empty = all defaults.
    pub requested_outputs: &'a [String],
    /// `Some` = managed mode, `None` = standalone mode.
    pub owner_project: Option<&'a str>,
    /// Whether a remote-storage collaborator is configured.
    pub storage_configured: bool,
    /// Number of remote input resources to fetch before the run.
    pub input_count: usize,
    pub hooks: TestHooks,
}

impl PipelineContext<'_> {
    fn managed(&self) -> bool {
        self.owner_project.is_some()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Build the ordered stage list for one task run.
pub fn build_pipeline(ctx: &PipelineContext<'_>) -> Vec<StageSpec> {
    let mut stages = Vec::new();

    // Input fetch fan-out always leads.
    if ctx.input_count > 0 {
        stages.push(StageSpec::FetchInputs);
    }

    // The primary engine invocation, when the kind requires one, precedes
    // every post-processing group.
    if ctx.kind == TaskKind::Reconstruction {
        stages.push(StageSpec::Engine);
    }

    if let Some(millis) = ctx.hooks.sleep_millis {
        stages.push(StageSpec::TestSleep { millis });
    }
    if ctx.hooks.fail {
        stages.push(StageSpec::TestFail);
    }

    for resource in ResourceType::all() {
        if !layout::family_requested(ctx.requested_outputs, resource) {
            continue;
        }
        push_group(&mut stages, resource);
        if ctx.managed() {
            // Per-artifact upload and notification directly after the
            // group, so the resource is visible before later groups run.
            stages.push(StageSpec::Upload { resource });
            stages.push(StageSpec::Notify { resource });
        }
    }

    if !ctx.managed() {
        stages.push(StageSpec::Bundle {
            manifest: resolved_outputs(ctx.requested_outputs),
        });
        if ctx.storage_configured {
            stages.push(StageSpec::UploadAll);
        }
    }

    stages
}

/// The post-processing stages of one resource group, in order.
fn push_group(stages: &mut Vec<StageSpec>, resource: ResourceType) {
    match resource {
        ResourceType::PointCloud => {
            stages.push(StageSpec::PointCloudTranslate);
            stages.push(StageSpec::PointCloudEpt);
            stages.push(StageSpec::PointCloudStats);
        }
        ResourceType::Mesh => {
            // Rename must precede packaging: downstream consumers never
            // see the texturing tool's own file names.
            stages.push(StageSpec::MeshRename);
            stages.push(StageSpec::MeshCompress);
        }
        ResourceType::Orthophoto => {
            stages.push(StageSpec::OrthophotoCog);
        }
    }
}

/// The output paths a standalone bundle archives.
fn resolved_outputs(requested: &[String]) -> Vec<String> {
    if requested.is_empty() {
        layout::default_artifacts()
    } else {
        requested.to_vec()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn standalone(requested: &[String]) -> Vec<StageSpec> {
        build_pipeline(&PipelineContext {
            kind: TaskKind::Reconstruction,
            requested_outputs: requested,
            owner_project: None,
            storage_configured: false,
            input_count: 12,
            hooks: TestHooks::default(),
        })
    }

    #[test]
    fn fetch_and_engine_lead_the_pipeline() {
        let stages = standalone(&[]);
        assert_eq!(stages[0], StageSpec::FetchInputs);
        assert_eq!(stages[1], StageSpec::Engine);
    }

    #[test]
    fn no_fetch_stage_without_inputs() {
        let stages = build_pipeline(&PipelineContext {
            kind: TaskKind::Reconstruction,
            requested_outputs: &[],
            owner_project: None,
            storage_configured: false,
            input_count: 0,
            hooks: TestHooks::default(),
        });
        assert_eq!(stages[0], StageSpec::Engine);
    }

    #[test]
    fn conversion_kind_has_no_engine_stage() {
        let requested = vec![layout::POINTCLOUD_EPT_DIR.to_string()];
        let stages = build_pipeline(&PipelineContext {
            kind: TaskKind::Conversion,
            requested_outputs: &requested,
            owner_project: None,
            storage_configured: false,
            input_count: 1,
            hooks: TestHooks::default(),
        });
        assert!(!stages.contains(&StageSpec::Engine));
        assert!(stages.contains(&StageSpec::PointCloudEpt));
    }

    #[test]
    fn managed_pointcloud_family_uploads_and_notifies_without_bundling() {
        // Point-cloud family requested via the full-resolution artifact
        // path (OR semantics over the family).
        let requested = vec![layout::POINTCLOUD_LAZ.to_string()];
        let stages = build_pipeline(&PipelineContext {
            kind: TaskKind::Reconstruction,
            requested_outputs: &requested,
            owner_project: Some("project-7"),
            storage_configured: true,
            input_count: 3,
            hooks: TestHooks::default(),
        });

        assert_eq!(
            stages,
            vec![
                StageSpec::FetchInputs,
                StageSpec::Engine,
                StageSpec::PointCloudTranslate,
                StageSpec::PointCloudEpt,
                StageSpec::PointCloudStats,
                StageSpec::Upload {
                    resource: ResourceType::PointCloud
                },
                StageSpec::Notify {
                    resource: ResourceType::PointCloud
                },
            ]
        );
        // Managed mode never bundles.
        assert!(!stages.iter().any(|s| matches!(s, StageSpec::Bundle { .. })));
        assert!(!stages.contains(&StageSpec::UploadAll));
    }

    #[test]
    fn managed_mode_notifies_each_group_as_it_completes() {
        let stages = build_pipeline(&PipelineContext {
            kind: TaskKind::Reconstruction,
            requested_outputs: &[],
            owner_project: Some("project-7"),
            storage_configured: true,
            input_count: 1,
            hooks: TestHooks::default(),
        });

        // Upload+notify immediately follow their group: the point-cloud
        // notification precedes the first mesh stage.
        let notify_pc = stages
            .iter()
            .position(|s| {
                *s == StageSpec::Notify {
                    resource: ResourceType::PointCloud,
                }
            })
            .unwrap();
        let mesh_start = stages.iter().position(|s| *s == StageSpec::MeshRename).unwrap();
        assert!(notify_pc < mesh_start);

        let notifies: Vec<_> = stages
            .iter()
            .filter_map(|s| match s {
                StageSpec::Notify { resource } => Some(*resource),
                _ => None,
            })
            .collect();
        assert_eq!(
            notifies,
            vec![
                ResourceType::PointCloud,
                ResourceType::Mesh,
                ResourceType::Orthophoto
            ]
        );
    }

    #[test]
    fn standalone_default_request_ends_with_full_bundle() {
        let stages = standalone(&[]);
        let last = stages.last().unwrap();
        assert_matches!(last, StageSpec::Bundle { manifest } => {
            assert_eq!(*manifest, layout::default_artifacts());
        });
        // Exactly one bundling stage.
        let bundles = stages
            .iter()
            .filter(|s| matches!(s, StageSpec::Bundle { .. }))
            .count();
        assert_eq!(bundles, 1);
    }

    #[test]
    fn standalone_with_storage_appends_upload_all() {
        let stages = build_pipeline(&PipelineContext {
            kind: TaskKind::Reconstruction,
            requested_outputs: &[],
            owner_project: None,
            storage_configured: true,
            input_count: 1,
            hooks: TestHooks::default(),
        });
        let n = stages.len();
        assert_eq!(stages[n - 1], StageSpec::UploadAll);
        assert_matches!(&stages[n - 2], StageSpec::Bundle { .. });
    }

    #[test]
    fn standalone_never_uploads_per_artifact() {
        let stages = standalone(&[]);
        assert!(!stages.iter().any(|s| matches!(s, StageSpec::Upload { .. })));
        assert!(!stages.iter().any(|s| matches!(s, StageSpec::Notify { .. })));
    }

    #[test]
    fn narrow_request_drops_other_groups() {
        let requested = vec![layout::MESH_OBJ.to_string()];
        let stages = standalone(&requested);
        assert!(stages.contains(&StageSpec::MeshRename));
        assert!(stages.contains(&StageSpec::MeshCompress));
        assert!(!stages.contains(&StageSpec::PointCloudTranslate));
        assert!(!stages.contains(&StageSpec::OrthophotoCog));
        // The bundle manifest is the request, verbatim.
        assert_matches!(stages.last().unwrap(), StageSpec::Bundle { manifest } => {
            assert_eq!(*manifest, requested);
        });
    }

    #[test]
    fn test_hooks_inject_between_engine_and_groups() {
        let stages = build_pipeline(&PipelineContext {
            kind: TaskKind::Reconstruction,
            requested_outputs: &[],
            owner_project: None,
            storage_configured: false,
            input_count: 0,
            hooks: TestHooks {
                sleep_millis: Some(250),
                fail: true,
            },
        });
        assert_eq!(stages[0], StageSpec::Engine);
        assert_eq!(stages[1], StageSpec::TestSleep { millis: 250 });
        assert_eq!(stages[2], StageSpec::TestFail);
        assert_eq!(stages[3], StageSpec::PointCloudTranslate);
    }

    #[test]
    fn hooks_do_not_change_other_decisions() {
        let plain = standalone(&[]);
        let hooked = build_pipeline(&PipelineContext {
            kind: TaskKind::Reconstruction,
            requested_outputs: &[],
            owner_project: None,
            storage_configured: false,
            input_count: 12,
            hooks: TestHooks {
                sleep_millis: Some(1),
                fail: false,
            },
        });
        let filtered: Vec<_> = hooked
            .into_iter()
            .filter(|s| !matches!(s, StageSpec::TestSleep { .. } | StageSpec::TestFail))
            .collect();
        assert_eq!(filtered, plain);
    }
}
