use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::constants::batches::{BATCH_PREFIX, METADATA_SUFFIX, PARTIAL_SUFFIX};
use crate::data::{Measurement, OneOrMany, ProductRecord};
use crate::errors::BatchError;
use crate::transport::fs::{file_name_str, list_files, write_atomically};
use crate::types::{BatchNumber, ImageId, LanguageTag, PathString};
use crate::utils::{all_values, first_value};

/// One axis of `dimensions` in a metadata entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionValue {
    /// Raw value as found in the listing.
    pub value: Value,
    /// Unit, empty when the listing carries none.
    #[serde(default)]
    pub unit: String,
}

impl DimensionValue {
    fn from_measurement(measurement: &Measurement) -> Option<Self> {
        measurement.value.clone().map(|value| Self {
            value,
            unit: measurement.unit.clone().unwrap_or_default(),
        })
    }
}

/// Per-axis dimensions; axes without a value are omitted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionsEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<DimensionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<DimensionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<DimensionValue>,
}

impl DimensionsEntry {
    fn is_empty(&self) -> bool {
        self.height.is_none() && self.width.is_none() && self.length.is_none()
    }
}

/// Flattened metadata written for one materialized image.
///
/// Optional attributes are omitted from the JSON when the listing lacks them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchMetadataEntry {
    pub item_id: String,
    pub image_id: ImageId,
    /// Image path relative to the image root (as found in the images index).
    #[serde(default)]
    pub image_path: PathString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_language: Option<LanguageTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_language: Option<LanguageTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    /// Every bullet point, in listing order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<DimensionsEntry>,
    /// File name inside the batch directory.
    #[serde(default)]
    pub local_path: PathString,
}

impl BatchMetadataEntry {
    /// Project `record` into a metadata entry.
    pub fn from_record(
        record: &ProductRecord,
        image_id: &str,
        image_path: &str,
        local_path: &str,
    ) -> Self {
        let listing = &record.listing;
        let brand = listing.brand.first();
        let item_name = listing.item_name.first();
        let features = all_values(&listing.bullet_point);
        let weight = listing.item_weight.as_ref().and_then(OneOrMany::first);
        let weight_value = weight.and_then(|weight| weight.value.clone());
        let weight_unit = weight_value
            .as_ref()
            .and(weight.and_then(|weight| weight.unit.clone()));

        let dimensions = listing.item_dimensions.as_ref().and_then(|dims| {
            let mut entry = DimensionsEntry::default();
            for (axis, measurement) in dims.axes() {
                let value = measurement.and_then(DimensionValue::from_measurement);
                match axis {
                    "height" => entry.height = value,
                    "width" => entry.width = value,
                    _ => entry.length = value,
                }
            }
            (!entry.is_empty()).then_some(entry)
        });

        Self {
            item_id: record.id.clone(),
            image_id: image_id.to_string(),
            image_path: image_path.to_string(),
            brand: brand.map(|entry| entry.value.clone()),
            brand_language: brand.and_then(|entry| entry.language_tag.clone()),
            item_name: item_name.map(|entry| entry.value.clone()),
            name_language: item_name.and_then(|entry| entry.language_tag.clone()),
            color: first_value(&listing.color).map(str::to_string),
            product_type: first_value(&listing.product_type).map(str::to_string),
            features: (!features.is_empty()).then_some(features),
            style: first_value(&listing.style).map(str::to_string),
            material: first_value(&listing.material).map(str::to_string),
            weight: weight_value,
            weight_unit,
            dimensions,
            local_path: local_path.to_string(),
        }
    }
}

/// `<output_root>/batch<n>`.
pub fn batch_dir_path(output_root: &Path, number: BatchNumber) -> PathBuf {
    output_root.join(format!("{BATCH_PREFIX}{number}"))
}

/// `<output_root>/batch<n>_metadata.json`.
pub fn batch_metadata_path(output_root: &Path, number: BatchNumber) -> PathBuf {
    output_root.join(format!("{BATCH_PREFIX}{number}{METADATA_SUFFIX}"))
}

/// Batch number encoded in a metadata file name (`batch12_metadata.json` -> 12).
pub fn parse_batch_number(file_name: &str) -> Option<BatchNumber> {
    file_name
        .strip_prefix(BATCH_PREFIX)?
        .strip_suffix(METADATA_SUFFIX)?
        .parse()
        .ok()
}

/// Existing `batch<n>_metadata.json` files in `output_root`, ordered by `n`.
///
/// A missing output root has no batches.
pub fn discover_batch_metadata(
    output_root: &Path,
) -> Result<Vec<(BatchNumber, PathBuf)>, BatchError> {
    if !output_root.is_dir() {
        return Ok(Vec::new());
    }
    let mut found: Vec<(BatchNumber, PathBuf)> = list_files(output_root)?
        .into_iter()
        .filter_map(|path| {
            let number = file_name_str(&path).and_then(parse_batch_number)?;
            Some((number, path))
        })
        .collect();
    found.sort_by_key(|(number, _)| *number);
    debug!(
        root = %output_root.display(),
        batches = found.len(),
        "discovered batch metadata"
    );
    Ok(found)
}

/// Existing `batch<n>/` directories in `output_root`, ordered by `n`.
pub fn discover_batch_dirs(output_root: &Path) -> Result<Vec<(BatchNumber, PathBuf)>, BatchError> {
    if !output_root.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(output_root).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|err| BatchError::Metadata {
            path: output_root.display().to_string(),
            reason: err.to_string(),
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let number = entry
            .file_name()
            .to_str()
            .and_then(|name| name.strip_prefix(BATCH_PREFIX))
            .and_then(|digits| digits.parse::<BatchNumber>().ok());
        if let Some(number) = number {
            found.push((number, entry.into_path()));
        }
    }
    found.sort_by_key(|(number, _)| *number);
    Ok(found)
}

/// Write `entries` as a pretty-printed JSON array, atomically.
pub fn write_batch_metadata(path: &Path, entries: &[BatchMetadataEntry]) -> Result<(), BatchError> {
    let bytes = serde_json::to_vec_pretty(entries).map_err(|err| BatchError::Metadata {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    write_atomically(path, PARTIAL_SUFFIX, &bytes)?;
    Ok(())
}

/// Read a metadata file written by [`write_batch_metadata`].
pub fn read_batch_metadata(path: &Path) -> Result<Vec<BatchMetadataEntry>, BatchError> {
    let metadata_error = |reason: String| BatchError::Metadata {
        path: path.display().to_string(),
        reason,
    };
    let bytes = fs::read(path).map_err(|err| metadata_error(err.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|err| metadata_error(err.to_string()))
}
