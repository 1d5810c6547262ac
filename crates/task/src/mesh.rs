//! Mesh companion renaming.
//!
//! The texturing tool writes the mesh, its material library, and every
//! texture under its own `odm_textured_model_geo*` names. Downstream
//! consumers must never see those, so before the mesh is packaged or
//! uploaded the files are renamed to the canonical `textured_model*`
//! prefix and the references between them (`mtllib` in the OBJ, `map_Kd`
//! in the MTL) are rewritten to match.

use std::path::Path;

use terranode_core::error::TaskResult;
use terranode_core::layout;

/// Rename mesh artifacts and rewrite cross-references.
///
/// A task without mesh output (or a replayed run that produced no files)
/// simply has nothing to rename; that is not an error.
pub(crate) async fn rename_mesh_artifacts(task_dir: &Path) -> TaskResult<()> {
    let mesh_dir = task_dir.join(layout::MESH_DIR);
    if !mesh_dir.is_dir() {
        tracing::debug!(dir = %mesh_dir.display(), "No mesh output to rename");
        return Ok(());
    }

    // Pass 1: rename every file carrying the tool prefix.
    let mut renamed = Vec::new();
    let mut entries = tokio::fs::read_dir(&mesh_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(rest) = name.strip_prefix(layout::MESH_TOOL_PREFIX) {
            let new_name = format!("{}{rest}", layout::MESH_CANONICAL_PREFIX);
            tokio::fs::rename(entry.path(), mesh_dir.join(&new_name)).await?;
            renamed.push(new_name);
        }
    }

    // Pass 2: rewrite references inside geometry and material files.
    for name in &renamed {
        if name.ends_with(".obj") || name.ends_with(".mtl") {
            let path = mesh_dir.join(name);
            let contents = tokio::fs::read_to_string(&path).await?;
            let rewritten =
                contents.replace(layout::MESH_TOOL_PREFIX, layout::MESH_CANONICAL_PREFIX);
            if rewritten != contents {
                tokio::fs::write(&path, rewritten).await?;
            }
        }
    }

    tracing::info!(count = renamed.len(), "Renamed mesh companions");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
