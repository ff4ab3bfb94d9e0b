//! Batch Materializer: places sampled images and writes per-batch metadata.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::PlacementMode;
use crate::errors::BatchError;
use crate::images::ImageIndex;
use crate::listing::ListingStore;
use crate::metadata::{
    BatchMetadataEntry, batch_dir_path, batch_metadata_path, write_batch_metadata,
};
use crate::splits::BatchGroup;
use crate::transport::fs::{file_name_str, file_stem_str, image_file_name, list_files, place_file};
use crate::types::BatchNumber;

/// Destination for materialized batches.
///
/// Called only for non-empty groups, in the order `prepare`, `place_image`
/// (once per resolved record), `write_metadata`.
pub trait BatchSink {
    /// Create the location for batch `number` and return it.
    fn prepare(&mut self, number: BatchNumber) -> Result<PathBuf, BatchError>;
    /// Place one image into batch `number` under `file_name`.
    ///
    /// Failures are per-record; the materializer logs them and continues.
    fn place_image(
        &mut self,
        number: BatchNumber,
        source: &Path,
        file_name: &str,
    ) -> io::Result<()>;
    /// Persist the batch's metadata and return where it went.
    fn write_metadata(
        &mut self,
        number: BatchNumber,
        entries: &[BatchMetadataEntry],
    ) -> Result<PathBuf, BatchError>;
}

/// Filesystem sink: `batch<n>/` directories and `batch<n>_metadata.json` files.
#[derive(Clone, Debug)]
pub struct FileBatchSink {
    output_root: PathBuf,
    placement: PlacementMode,
}

impl FileBatchSink {
    /// Sink writing under `output_root`.
    pub fn new(output_root: impl Into<PathBuf>, placement: PlacementMode) -> Self {
        Self {
            output_root: output_root.into(),
            placement,
        }
    }

    /// Root all batches are written under.
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }
}

impl BatchSink for FileBatchSink {
    fn prepare(&mut self, number: BatchNumber) -> Result<PathBuf, BatchError> {
        let dir = batch_dir_path(&self.output_root, number);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn place_image(
        &mut self,
        number: BatchNumber,
        source: &Path,
        file_name: &str,
    ) -> io::Result<()> {
        let destination = batch_dir_path(&self.output_root, number).join(file_name);
        place_file(source, &destination, self.placement)
    }

    fn write_metadata(
        &mut self,
        number: BatchNumber,
        entries: &[BatchMetadataEntry],
    ) -> Result<PathBuf, BatchError> {
        let path = batch_metadata_path(&self.output_root, number);
        write_batch_metadata(&path, entries)?;
        Ok(path)
    }
}

/// Outcome of materializing one batch group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterializedBatch {
    /// Batch number (`batch<n>`).
    pub number: BatchNumber,
    /// Location returned by the sink's `prepare`.
    pub directory: PathBuf,
    /// Location returned by the sink's `write_metadata`.
    pub metadata_path: PathBuf,
    /// Metadata entries written (one per placed image).
    pub entries: usize,
    /// Records whose image id no longer resolves.
    pub unresolved: usize,
    /// Records whose image placement failed.
    pub failed: usize,
}

/// Turns batch groups into images plus metadata through a [`BatchSink`].
pub struct BatchMaterializer<'a, S: BatchSink> {
    store: &'a ListingStore,
    images: &'a ImageIndex,
    image_root: PathBuf,
    sink: S,
}

impl<'a, S: BatchSink> BatchMaterializer<'a, S> {
    /// Create a materializer resolving images under `image_root`.
    pub fn new(
        store: &'a ListingStore,
        images: &'a ImageIndex,
        image_root: impl Into<PathBuf>,
        sink: S,
    ) -> Self {
        Self {
            store,
            images,
            image_root: image_root.into(),
            sink,
        }
    }

    /// Consume the materializer and return its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Materialize every non-empty group; group `i` becomes batch `first_number + i`.
    pub fn materialize_all(
        &mut self,
        groups: &[BatchGroup],
        first_number: BatchNumber,
    ) -> Result<Vec<MaterializedBatch>, BatchError> {
        let mut batches = Vec::new();
        for group in groups {
            if group.is_empty() {
                debug!(group = group.index, "skipping empty batch group");
                continue;
            }
            let number = BatchNumber::try_from(group.index)
                .ok()
                .and_then(|offset| first_number.checked_add(offset))
                .ok_or_else(|| {
                    BatchError::Configuration(format!(
                        "batch group {} has no valid number after {first_number}",
                        group.index
                    ))
                })?;
            batches.push(self.materialize(group, number)?);
        }
        Ok(batches)
    }

    /// Materialize one group as batch `number`.
    pub fn materialize(
        &mut self,
        group: &BatchGroup,
        number: BatchNumber,
    ) -> Result<MaterializedBatch, BatchError> {
        let directory = self.sink.prepare(number)?;
        let mut entries = Vec::with_capacity(group.len());
        let mut unresolved = 0usize;
        let mut failed = 0usize;

        for item in &group.items {
            let Some(record) = self.store.get(item.record) else {
                unresolved += 1;
                warn!(batch = number, record = item.record, "sampled record missing from store");
                continue;
            };
            let Some(image_id) = record.image_id.as_deref() else {
                unresolved += 1;
                warn!(batch = number, record = %record.id, "sampled record has no image id");
                continue;
            };
            let Some(relative) = self.images.resolve(image_id) else {
                unresolved += 1;
                warn!(batch = number, image_id, "image id not found in image index; skipping");
                continue;
            };
            let source = self.image_root.join(relative);
            let file_name = image_file_name(image_id, &source);
            if let Err(err) = self.sink.place_image(number, &source, &file_name) {
                failed += 1;
                warn!(
                    batch = number,
                    image_id,
                    source = %source.display(),
                    error = %err,
                    "failed to place image; skipping"
                );
                continue;
            }
            entries.push(BatchMetadataEntry::from_record(
                record, image_id, relative, &file_name,
            ));
        }

        let metadata_path = self.sink.write_metadata(number, &entries)?;
        info!(
            batch = number,
            entries = entries.len(),
            unresolved,
            failed,
            metadata = %metadata_path.display(),
            "batch materialized"
        );
        Ok(MaterializedBatch {
            number,
            directory,
            metadata_path,
            entries: entries.len(),
            unresolved,
            failed,
        })
    }
}

/// Regenerate metadata entries for the images already inside `batch_dir`.
///
/// Each regular file's stem is taken as an image id; files without a matching
/// listing are skipped with a warning. Entries follow file name order.
pub fn rebuild_group_metadata(
    batch_dir: &Path,
    store: &ListingStore,
    images: &ImageIndex,
) -> Result<Vec<BatchMetadataEntry>, BatchError> {
    let mut entries = Vec::new();
    for path in list_files(batch_dir)? {
        let (Some(file_name), Some(image_id)) = (file_name_str(&path), file_stem_str(&path)) else {
            warn!(path = %path.display(), "skipping non-UTF-8 file name");
            continue;
        };
        let Some(record) = store.find_by_image_id(image_id) else {
            warn!(image_id, "no listing found for image; skipping");
            continue;
        };
        let image_path = images.resolve(image_id).unwrap_or_default();
        entries.push(BatchMetadataEntry::from_record(
            record, image_id, image_path, file_name,
        ));
    }
    info!(
        dir = %batch_dir.display(),
        entries = entries.len(),
        "rebuilt batch metadata"
    );
    Ok(entries)
}
