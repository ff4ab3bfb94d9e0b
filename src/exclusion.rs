use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::errors::BatchError;
use crate::types::ImageId;

/// Image ids emitted by earlier batch runs; never sampled again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    image_ids: HashSet<ImageId>,
}

impl ExclusionSet {
    /// An empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from explicit image ids.
    pub fn from_ids<I>(ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ImageId>,
    {
        Self {
            image_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Union of the `image_id` fields of every metadata file in `paths`.
    ///
    /// Missing files are skipped with a warning. A file that exists but is not
    /// a JSON array is an error. Entries without a string `image_id` are ignored.
    pub fn load(paths: &[PathBuf]) -> Result<Self, BatchError> {
        let mut set = Self::default();
        for path in paths {
            if !path.exists() {
                warn!(path = %path.display(), "exclusion metadata not found; skipping");
                continue;
            }
            let before = set.len();
            set.extend_from_metadata_file(path)?;
            info!(
                path = %path.display(),
                added = set.len() - before,
                "loaded exclusion metadata"
            );
        }
        Ok(set)
    }

    fn extend_from_metadata_file(&mut self, path: &Path) -> Result<(), BatchError> {
        let metadata_error = |reason: String| BatchError::Metadata {
            path: path.display().to_string(),
            reason,
        };
        let bytes = fs::read(path).map_err(|err| metadata_error(err.to_string()))?;
        let entries: Vec<Value> =
            serde_json::from_slice(&bytes).map_err(|err| metadata_error(err.to_string()))?;
        self.extend(entries.iter().filter_map(|entry| {
            entry
                .get("image_id")
                .and_then(Value::as_str)
                .filter(|image_id| !image_id.is_empty())
                .map(str::to_string)
        }));
        Ok(())
    }

    /// Add image ids.
    pub fn extend<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = ImageId>,
    {
        self.image_ids.extend(ids);
    }

    /// True when `image_id` was emitted before.
    pub fn contains(&self, image_id: &str) -> bool {
        self.image_ids.contains(image_id)
    }

    /// Number of excluded image ids.
    pub fn len(&self) -> usize {
        self.image_ids.len()
    }

    /// True when nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.image_ids.is_empty()
    }
}
