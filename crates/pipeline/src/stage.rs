//! Declarative stage specifications.

use terranode_core::types::ResourceType;

/// One discrete step within a task's pipeline.
///
/// Specs are data, not behavior: the stage runner interprets them, the
/// builder only arranges them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageSpec {
    /// Fetch the task's input resources, up to four concurrently.
    FetchInputs,
    /// Primary reconstruction engine invocation.
    Engine,
    /// Point-cloud group, stage 1: LAS -> LAZ conversion.
    PointCloudTranslate,
    /// Point-cloud group, stage 2: EPT octree build.
    PointCloudEpt,
    /// Point-cloud group, stage 3: summary statistics.
    PointCloudStats,
    /// Rename mesh companions away from tool-specific names and rewrite
    /// the references between them.
    MeshRename,
    /// Draco mesh compression.
    MeshCompress,
    /// Orthophoto -> Cloud-Optimized GeoTIFF.
    OrthophotoCog,
    /// Managed mode: upload one resource group's artifacts.
    Upload { resource: ResourceType },
    /// Managed mode: notify subscribers that a resource is available.
    Notify { resource: ResourceType },
    /// Standalone mode: archive every resolved output path into one
    /// bundle. The manifest is fixed at build time.
    Bundle { manifest: Vec<String> },
    /// Standalone mode: upload the bundle and run log.
    UploadAll,
    /// Test hook: fixed sleep.
    TestSleep { millis: u64 },
    /// Test hook: deterministic failure.
    TestFail,
}

impl StageSpec {
    /// Stable stage name for logs and progress reporting.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchInputs => "fetch-inputs",
            Self::Engine => "engine",
            Self::PointCloudTranslate => "pointcloud-translate",
            Self::PointCloudEpt => "pointcloud-ept",
            Self::PointCloudStats => "pointcloud-stats",
            Self::MeshRename => "mesh-rename",
            Self::MeshCompress => "mesh-compress",
            Self::OrthophotoCog => "orthophoto-cog",
            Self::Upload { .. } => "upload",
            Self::Notify { .. } => "notify",
            Self::Bundle { .. } => "bundle",
            Self::UploadAll => "upload-all",
            Self::TestSleep { .. } => "test-sleep",
            Self::TestFail => "test-fail",
        }
    }
}

impl std::fmt::Display for StageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upload { resource } => write!(f, "upload[{resource}]"),
            Self::Notify { resource } => write!(f, "notify[{resource}]"),
            other => f.write_str(other.name()),
        }
    }
}
