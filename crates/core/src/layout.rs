//! Working-directory layout and the artifact vocabulary.
//!
//! Every task owns one directory under the node's data root. The engine
//! and the post-processing tools write into fixed subdirectories; the
//! identifiers below are the *public* artifact paths callers may request.
//!
//! A requested output is matched against a **family** of equivalent
//! identifiers (the resource root path or any of its canonical artifact
//! paths), with OR semantics, not a single exact string.

use std::path::{Path, PathBuf};

use crate::types::{ResourceType, TaskId};

// ---------------------------------------------------------------------------
// Directory entries
// ---------------------------------------------------------------------------

/// Fetched input resources land here before the pipeline starts.
pub const INPUT_DIR: &str = "input";

/// Plain-text run log persisted by the finalizer.
pub const LOG_FILE: &str = "task_output.txt";

/// Bundled archive produced in standalone mode.
pub const BUNDLE_FILE: &str = "all.zip";

// ---------------------------------------------------------------------------
// Artifact paths (task-directory relative)
// ---------------------------------------------------------------------------

/// Georeferenced point cloud as written by the engine.
pub const POINTCLOUD_LAS: &str = "odm_georeferencing/odm_georeferenced_model.las";

/// Compressed full-resolution point cloud (canonical artifact).
pub const POINTCLOUD_LAZ: &str = "odm_georeferencing/odm_georeferenced_model.laz";

/// EPT octree directory built by the point-cloud group.
pub const POINTCLOUD_EPT_DIR: &str = "entwine_pointcloud";

/// Textured-mesh output directory.
pub const MESH_DIR: &str = "odm_texturing";

/// Canonical mesh artifact after the rename step.
pub const MESH_OBJ: &str = "odm_texturing/textured_model.obj";

/// Draco-compressed mesh produced by the mesh group.
pub const MESH_DRC: &str = "odm_texturing/textured_model.drc";

/// Prefix the texturing tool uses for everything it writes. Downstream
/// consumers must never see this name; the mesh group renames it away.
pub const MESH_TOOL_PREFIX: &str = "odm_textured_model_geo";

/// Canonical basename mesh companions are renamed to.
pub const MESH_CANONICAL_PREFIX: &str = "textured_model";

/// Orthophoto output directory.
pub const ORTHOPHOTO_DIR: &str = "odm_orthophoto";

/// Orthophoto as written by the engine.
pub const ORTHOPHOTO_TIF: &str = "odm_orthophoto/odm_orthophoto.tif";

/// Cloud-optimized orthophoto produced by the raster group.
pub const ORTHOPHOTO_COG: &str = "odm_orthophoto/odm_orthophoto_cog.tif";

/// The "all default artifacts" set used when `requested_outputs` is empty.
pub fn default_artifacts() -> Vec<String> {
    [
        POINTCLOUD_LAZ,
        POINTCLOUD_EPT_DIR,
        MESH_OBJ,
        ORTHOPHOTO_TIF,
        ORTHOPHOTO_COG,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ---------------------------------------------------------------------------
// Artifact families
// ---------------------------------------------------------------------------

/// Equivalent identifiers for a resource: its root path plus canonical
/// artifact paths. Requesting any one of them requests the family.
pub fn family(resource: ResourceType) -> &'static [&'static str] {
    match resource {
        ResourceType::PointCloud => &[POINTCLOUD_EPT_DIR, POINTCLOUD_LAZ],
        ResourceType::Mesh => &[MESH_DIR, MESH_OBJ],
        ResourceType::Orthophoto => &[ORTHOPHOTO_DIR, ORTHOPHOTO_TIF, ORTHOPHOTO_COG],
    }
}

/// Whether `requested` selects the given resource family.
///
/// An empty request means "all default artifacts", which includes every
/// family. Otherwise the family is selected iff the request contains any
/// of its identifiers.
pub fn family_requested(requested: &[String], resource: ResourceType) -> bool {
    if requested.is_empty() {
        return true;
    }
    family(resource)
        .iter()
        .any(|id| requested.iter().any(|r| r == id))
}

/// The artifacts a resource group uploads in managed mode, in the order
/// they are produced.
pub fn family_artifacts(resource: ResourceType) -> &'static [&'static str] {
    match resource {
        ResourceType::PointCloud => &[POINTCLOUD_LAZ, POINTCLOUD_EPT_DIR],
        ResourceType::Mesh => &[MESH_OBJ, MESH_DRC],
        ResourceType::Orthophoto => &[ORTHOPHOTO_TIF, ORTHOPHOTO_COG],
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// The task's working directory under the node data root.
pub fn task_dir(data_root: &Path, id: TaskId) -> PathBuf {
    data_root.join(id.to_string())
}

/// Directory input resources are fetched into.
pub fn input_dir(data_root: &Path, id: TaskId) -> PathBuf {
    task_dir(data_root, id).join(INPUT_DIR)
}

/// The persisted run-log path.
pub fn log_path(data_root: &Path, id: TaskId) -> PathBuf {
    task_dir(data_root, id).join(LOG_FILE)
}

/// The standalone-mode bundle path.
pub fn bundle_path(data_root: &Path, id: TaskId) -> PathBuf {
    task_dir(data_root, id).join(BUNDLE_FILE)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
