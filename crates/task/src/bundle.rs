//! Standalone-mode artifact bundling.
//!
//! Archives every resolved output path into a single `all.zip`. Entries
//! that were never produced (conditional stages, replayed runs) are
//! skipped; directories are walked recursively with their relative
//! layout preserved.

use std::io::Write;
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Build the bundle at `dest` from `manifest` paths relative to
/// `task_dir`. Returns the number of files archived.
///
/// Synchronous by design; the runner wraps it in `spawn_blocking`.
pub(crate) fn bundle_artifacts(
    task_dir: &Path,
    manifest: &[String],
    dest: &Path,
) -> std::io::Result<usize> {
    let file = std::fs::File::create(dest)?;
    let mut zip = ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut count = 0;
    for rel in manifest {
        let absolute = task_dir.join(rel);
        if absolute.is_file() {
            add_file(&mut zip, &absolute, rel, options)?;
            count += 1;
        } else if absolute.is_dir() {
            count += add_dir(&mut zip, task_dir, &absolute, options)?;
        } else {
            tracing::debug!(path = %absolute.display(), "Skipping absent bundle entry");
        }
    }

    zip.finish().map_err(std::io::Error::other)?;
    Ok(count)
}

fn add_file<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    path: &Path,
    name: &str,
    options: SimpleFileOptions,
) -> std::io::Result<()> {
    zip.start_file(name, options)
        .map_err(std::io::Error::other)?;
    let mut file = std::fs::File::open(path)?;
    std::io::copy(&mut file, zip)?;
    Ok(())
}

fn add_dir<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    base: &Path,
    dir: &Path,
    options: SimpleFileOptions,
) -> std::io::Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            count += add_dir(zip, base, &path, options)?;
        } else if let Ok(rel) = path.strip_prefix(base) {
            let name = rel.to_string_lossy().replace('\\', "/");
            add_file(zip, &path, &name, options)?;
            count += 1;
        }
    }
    Ok(count)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundles_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        std::fs::create_dir_all(base.join("entwine_pointcloud/ept-data")).unwrap();
        std::fs::write(base.join("entwine_pointcloud/ept.json"), b"{}").unwrap();
        std::fs::write(base.join("entwine_pointcloud/ept-data/0-0-0-0.laz"), b"pts").unwrap();
        std::fs::create_dir_all(base.join("odm_orthophoto")).unwrap();
        std::fs::write(base.join("odm_orthophoto/odm_orthophoto.tif"), b"tif").unwrap();

        let dest = base.join("all.zip");
        let manifest = vec![
            "entwine_pointcloud".to_string(),
            "odm_orthophoto/odm_orthophoto.tif".to_string(),
            "odm_texturing/textured_model.obj".to_string(), // never produced
        ];
        let count = bundle_artifacts(base, &manifest, &dest).unwrap();
        assert_eq!(count, 3);

        let archive = zip::ZipArchive::new(std::fs::File::open(&dest).unwrap()).unwrap();
        let mut names: Vec<_> = archive.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "entwine_pointcloud/ept-data/0-0-0-0.laz",
                "entwine_pointcloud/ept.json",
                "odm_orthophoto/odm_orthophoto.tif",
            ]
        );
    }

    #[test]
    fn empty_manifest_still_produces_an_archive() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("all.zip");
        let count = bundle_artifacts(dir.path(), &[], &dest).unwrap();
        assert_eq!(count, 0);
        assert!(dest.is_file());
    }
}
