use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::BatchError;
use crate::types::{ImageId, PathString};

/// One row of the images index; other columns (`height`, `width`) are ignored.
#[derive(Debug, Deserialize)]
struct ImageRow {
    image_id: ImageId,
    path: PathString,
}

/// Lookup from image id to a file path relative to the image root.
#[derive(Clone, Debug, Default)]
pub struct ImageIndex {
    paths: HashMap<ImageId, PathString>,
}

impl ImageIndex {
    /// Load a headered CSV with at least `image_id` and `path` columns.
    pub fn load(path: &Path) -> Result<Self, BatchError> {
        let file = File::open(path).map_err(|err| BatchError::ImageIndex {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        let index = Self::from_reader(file).map_err(|err| match err {
            BatchError::ImageIndex { reason, .. } => BatchError::ImageIndex {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })?;
        info!(
            path = %path.display(),
            images = index.len(),
            "loaded image index"
        );
        Ok(index)
    }

    /// Parse an index from any CSV reader.
    ///
    /// Duplicate ids keep the last path seen.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, BatchError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut paths = HashMap::new();
        for row in csv_reader.deserialize::<ImageRow>() {
            let row = row.map_err(|err| BatchError::ImageIndex {
                path: "<reader>".to_string(),
                reason: err.to_string(),
            })?;
            if row.image_id.is_empty() {
                debug!("ignoring image index row without image_id");
                continue;
            }
            paths.insert(row.image_id, row.path);
        }
        Ok(Self { paths })
    }

    /// Build an index from `(image_id, path)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ImageId>,
        V: Into<PathString>,
    {
        Self {
            paths: pairs
                .into_iter()
                .map(|(image_id, path)| (image_id.into(), path.into()))
                .collect(),
        }
    }

    /// Relative path for `image_id`, if indexed.
    pub fn resolve(&self, image_id: &str) -> Option<&str> {
        self.paths.get(image_id).map(String::as_str)
    }

    /// Absolute source path for `image_id` under `image_root`.
    pub fn resolve_under(&self, image_root: &Path, image_id: &str) -> Option<PathBuf> {
        self.resolve(image_id).map(|relative| image_root.join(relative))
    }

    /// True when `image_id` is indexed.
    pub fn contains(&self, image_id: &str) -> bool {
        self.paths.contains_key(image_id)
    }

    /// Number of indexed images.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// True when no image is indexed.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
