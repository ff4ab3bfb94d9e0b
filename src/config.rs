use std::path::PathBuf;

use crate::constants::batches::DEFAULT_BATCH_COUNT;
use crate::constants::sampler::{
    DEFAULT_MAX_PER_CATEGORY, DEFAULT_MIN_PER_CATEGORY, DEFAULT_SEED, DEFAULT_TARGET,
};
use crate::errors::BatchError;
use crate::types::BatchNumber;

/// Parameters of the balanced sampler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplingConfig {
    /// RNG seed that controls deterministic sampling order.
    pub seed: u64,
    /// Total number of records to select.
    pub target: usize,
    /// Records drawn from every category in the floor pass (capped by availability).
    pub min_per_category: usize,
    /// Cap on a category's floor + proportional contribution.
    ///
    /// The top-up pass may exceed it to reach `target`.
    pub max_per_category: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            target: DEFAULT_TARGET,
            min_per_category: DEFAULT_MIN_PER_CATEGORY,
            max_per_category: DEFAULT_MAX_PER_CATEGORY,
        }
    }
}

impl SamplingConfig {
    /// Override the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Override the target sample size.
    pub fn with_target(mut self, target: usize) -> Self {
        self.target = target;
        self
    }

    /// Override the per-category floor and cap.
    pub fn with_category_bounds(mut self, min_per_category: usize, max_per_category: usize) -> Self {
        self.min_per_category = min_per_category;
        self.max_per_category = max_per_category;
        self
    }

    /// Reject bounds where the floor exceeds the cap.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.min_per_category > self.max_per_category {
            return Err(BatchError::Configuration(format!(
                "min_per_category ({}) must not exceed max_per_category ({})",
                self.min_per_category, self.max_per_category
            )));
        }
        Ok(())
    }
}

/// How sampled images are placed into batch directories.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlacementMode {
    /// Copy the image file.
    #[default]
    Copy,
    /// Hard-link the image file (same filesystem only).
    HardLink,
}

/// Top-level configuration for one batch-building run.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Line-delimited JSON listing files, loaded in order.
    pub listing_sources: Vec<PathBuf>,
    /// `images.csv` mapping `image_id` to a path relative to `image_root`.
    pub image_index: PathBuf,
    /// Root directory that indexed image paths are relative to.
    pub image_root: PathBuf,
    /// Directory receiving `batch<n>/` directories and `batch<n>_metadata.json` files.
    pub output_root: PathBuf,
    /// Number of batches `K` the selection is split into.
    pub batch_count: usize,
    /// Balanced sampler parameters.
    pub sampling: SamplingConfig,
    /// Metadata files from earlier runs whose image ids must not be reused.
    pub exclude_metadata: Vec<PathBuf>,
    /// Also exclude image ids from every `batch<n>_metadata.json` found in `output_root`.
    pub exclude_existing: bool,
    /// Number of the first batch written; `None` continues after the highest existing batch.
    pub first_batch_number: Option<BatchNumber>,
    /// Copy or hard-link images.
    pub placement: PlacementMode,
    /// Accept a target larger than the eligible pool and emit what exists.
    pub allow_shortfall: bool,
}

impl BatchConfig {
    /// Create a config with default sampling and batch parameters.
    pub fn new(
        listing_sources: Vec<PathBuf>,
        image_index: impl Into<PathBuf>,
        image_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            listing_sources,
            image_index: image_index.into(),
            image_root: image_root.into(),
            output_root: output_root.into(),
            batch_count: DEFAULT_BATCH_COUNT,
            sampling: SamplingConfig::default(),
            exclude_metadata: Vec::new(),
            exclude_existing: false,
            first_batch_number: None,
            placement: PlacementMode::Copy,
            allow_shortfall: false,
        }
    }

    /// Override the number of batches.
    pub fn with_batch_count(mut self, batch_count: usize) -> Self {
        self.batch_count = batch_count;
        self
    }

    /// Override sampler parameters.
    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    /// Add explicit exclusion metadata files.
    pub fn with_exclude_metadata(mut self, paths: Vec<PathBuf>) -> Self {
        self.exclude_metadata = paths;
        self
    }

    /// Toggle automatic exclusion of batches already present in `output_root`.
    pub fn with_exclude_existing(mut self, exclude_existing: bool) -> Self {
        self.exclude_existing = exclude_existing;
        self
    }

    /// Pin the number of the first written batch.
    pub fn with_first_batch_number(mut self, number: BatchNumber) -> Self {
        self.first_batch_number = Some(number);
        self
    }

    /// Override image placement.
    pub fn with_placement(mut self, placement: PlacementMode) -> Self {
        self.placement = placement;
        self
    }

    /// Allow a target above the eligible pool size.
    pub fn with_allow_shortfall(mut self, allow_shortfall: bool) -> Self {
        self.allow_shortfall = allow_shortfall;
        self
    }

    /// Validate settings that do not depend on loaded data.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.batch_count == 0 {
            return Err(BatchError::Configuration(
                "batch count must be greater than zero".to_string(),
            ));
        }
        if self.listing_sources.is_empty() {
            return Err(BatchError::Configuration(
                "at least one listing source is required".to_string(),
            ));
        }
        if self.first_batch_number == Some(0) {
            return Err(BatchError::Configuration(
                "batch numbers start at 1".to_string(),
            ));
        }
        self.sampling.validate()
    }

    /// Validate the target against the eligible pool (after exclusions).
    pub fn check_capacity(&self, eligible: usize) -> Result<(), BatchError> {
        if !self.allow_shortfall && self.sampling.target > eligible {
            return Err(BatchError::Configuration(format!(
                "target sample size {} exceeds the {} eligible records",
                self.sampling.target, eligible
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> BatchConfig {
        BatchConfig::new(
            vec![PathBuf::from("combined_listings.json")],
            "images.csv",
            "images/small",
            "dataset-batches",
        )
    }

    #[test]
    fn defaults_follow_documented_values() {
        let config = base_config();
        assert_eq!(config.batch_count, 4);
        assert_eq!(config.sampling.seed, 42);
        assert_eq!(config.sampling.target, 20_000);
        assert_eq!(config.sampling.min_per_category, 5);
        assert_eq!(config.sampling.max_per_category, 200);
        assert_eq!(config.placement, PlacementMode::Copy);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_batches_are_rejected() {
        let err = base_config().with_batch_count(0).validate().unwrap_err();
        assert!(matches!(
            err,
            BatchError::Configuration(ref msg) if msg.contains("batch count")
        ));
    }

    #[test]
    fn inverted_category_bounds_are_rejected() {
        let sampling = SamplingConfig::default().with_category_bounds(10, 3);
        let err = base_config().with_sampling(sampling).validate().unwrap_err();
        assert!(matches!(
            err,
            BatchError::Configuration(ref msg) if msg.contains("min_per_category")
        ));
    }

    #[test]
    fn missing_sources_and_zero_first_batch_are_rejected() {
        let mut config = base_config();
        config.listing_sources.clear();
        assert!(config.validate().is_err());

        let config = base_config().with_first_batch_number(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn capacity_check_respects_shortfall_flag() {
        let config = base_config().with_sampling(SamplingConfig::default().with_target(100));
        assert!(config.check_capacity(100).is_ok());
        assert!(config.check_capacity(99).is_err());
        assert!(config.with_allow_shortfall(true).check_capacity(99).is_ok());
    }
}
