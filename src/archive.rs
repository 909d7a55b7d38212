//! Flattened tar.gz archives of a staging tree

use crate::error::{Error, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::Path;
use walkdir::WalkDir;

/// Archive every file under `source_dir` into a gzip-compressed tar at `archive_path`
///
/// Directory structure is discarded: each file is stored under its bare file
/// name, so same-named files from different subdirectories all end up as
/// entries with the same name and the last one wins on extraction. The archive
/// is assembled in memory and written once complete, so an `archive_path`
/// inside `source_dir` is never archived into itself.
///
/// Returns the number of files archived.
pub fn write_flat_archive(source_dir: &Path, archive_path: &Path) -> Result<usize> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mut count = 0;

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to walk {}: {}",
                source_dir.display(),
                e
            )))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_owned();
        builder.append_path_with_name(entry.path(), &name)?;
        count += 1;
    }

    let bytes = builder.into_inner()?.finish()?;

    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(archive_path, bytes)?;

    tracing::debug!(
        source = ?source_dir,
        archive = ?archive_path,
        files = count,
        "wrote flattened archive"
    );

    Ok(count)
}
