//! Object-storage collaborator.
//!
//! The orchestration core depends on this capability but not on any
//! concrete backend: [`ObjectStorage`] is the contract, [`s3::S3Storage`]
//! the production implementation. Paths are uploaded relative to a base
//! directory so remote keys mirror the task's working-directory layout.

use std::path::Path;

use async_trait::async_trait;

pub mod s3;

pub use s3::S3Storage;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend rejected or failed an upload.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// The backend rejected or failed a download.
    #[error("Download failed: {0}")]
    Download(String),

    /// Local filesystem access failed while staging a transfer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// ObjectStorage
// ---------------------------------------------------------------------------

/// Remote artifact storage used for task outputs and input resources.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload one local file to `remote_key`.
    async fn upload_single(&self, remote_key: &str, local_path: &Path)
        -> Result<(), StorageError>;

    /// Upload the given `relative_paths` (files or directories, resolved
    /// against `base_dir`) into `bucket` under `prefix`, preserving the
    /// relative layout. Directory entries are expanded recursively.
    async fn upload_paths(
        &self,
        base_dir: &Path,
        bucket: &str,
        prefix: &str,
        relative_paths: &[String],
    ) -> Result<(), StorageError>;

    /// Download `remote_ref` to `local_path`.
    async fn download_path(&self, remote_ref: &str, local_path: &Path)
        -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Expand a set of relative paths into the relative file list below them.
///
/// Missing entries are skipped: post-processing stages are conditional,
/// so an absent optional artifact is not an upload failure.
pub(crate) fn collect_relative_files(
    base_dir: &Path,
    relative_paths: &[String],
) -> std::io::Result<Vec<String>> {
    let mut files = Vec::new();
    for rel in relative_paths {
        let absolute = base_dir.join(rel);
        if absolute.is_file() {
            files.push(rel.clone());
        } else if absolute.is_dir() {
            walk_dir(base_dir, &absolute, &mut files)?;
        } else {
            tracing::debug!(path = %absolute.display(), "Skipping absent upload path");
        }
    }
    Ok(files)
}

fn walk_dir(base_dir: &Path, dir: &Path, files: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_dir(base_dir, &path, files)?;
        } else if let Ok(rel) = path.strip_prefix(base_dir) {
            files.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_expands_directories_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        std::fs::create_dir_all(base.join("ept/ept-data")).unwrap();
        std::fs::write(base.join("ept/ept.json"), b"{}").unwrap();
        std::fs::write(base.join("ept/ept-data/0-0-0-0.laz"), b"pts").unwrap();
        std::fs::write(base.join("model.laz"), b"pts").unwrap();

        let mut files = collect_relative_files(
            base,
            &["ept".to_string(), "model.laz".to_string()],
        )
        .unwrap();
        files.sort();

        assert_eq!(
            files,
            vec!["ept/ept-data/0-0-0-0.laz", "ept/ept.json", "model.laz"]
        );
    }

    #[test]
    fn collect_skips_absent_paths() {
        let dir = tempfile::tempdir().unwrap();
        let files =
            collect_relative_files(dir.path(), &["not_written_yet.tif".to_string()]).unwrap();
        assert!(files.is_empty());
    }
}
