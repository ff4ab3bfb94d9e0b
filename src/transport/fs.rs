use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::PlacementMode;
use crate::constants::images::DEFAULT_IMAGE_EXTENSION;
use crate::constants::listing::LISTING_SHARD_PREFIX;
use crate::errors::BatchError;

/// Regular files directly inside `dir`, sorted by path.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|err| {
            BatchError::Io(
                err.into_io_error()
                    .unwrap_or_else(|| io::Error::other("directory walk failed")),
            )
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Listing shard files (`listings_*`) directly inside `dir`, sorted by name.
pub fn find_listing_shards(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    Ok(list_files(dir)?
        .into_iter()
        .filter(|path| {
            file_name_str(path)
                .map(|name| name.starts_with(LISTING_SHARD_PREFIX))
                .unwrap_or(false)
        })
        .collect())
}

/// File name of `path` as UTF-8, if representable.
pub fn file_name_str(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

/// File stem of `path` as UTF-8, if representable.
pub fn file_stem_str(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|stem| stem.to_str())
}

/// Batch-local file name for an image: `<image_id>.<source extension>`.
///
/// Falls back to `.jpg` when the source path has no extension.
pub fn image_file_name(image_id: &str, source: &Path) -> String {
    let extension = source
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or(DEFAULT_IMAGE_EXTENSION);
    format!("{image_id}.{extension}")
}

/// Place `source` at `destination` by copy or hard link.
///
/// An existing destination is replaced so re-runs into the same batch
/// directory stay idempotent.
pub fn place_file(source: &Path, destination: &Path, mode: PlacementMode) -> io::Result<()> {
    match mode {
        PlacementMode::Copy => fs::copy(source, destination).map(|_| ()),
        PlacementMode::HardLink => {
            if destination.exists() {
                fs::remove_file(destination)?;
            }
            fs::hard_link(source, destination)
        }
    }
}

/// Write `bytes` to `path` through a temporary sibling and rename into place.
pub fn write_atomically(path: &Path, partial_suffix: &str, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut partial = path.as_os_str().to_owned();
    partial.push(partial_suffix);
    let partial = PathBuf::from(partial);
    fs::write(&partial, bytes)?;
    fs::rename(&partial, path)
}
