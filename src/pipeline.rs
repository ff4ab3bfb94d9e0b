//! End-to-end batch building: load, exclude, sample, partition, materialize.

use tracing::info;

use crate::category::CategoryIndex;
use crate::config::BatchConfig;
use crate::constants::batches::FIRST_BATCH_NUMBER;
use crate::errors::BatchError;
use crate::exclusion::ExclusionSet;
use crate::images::ImageIndex;
use crate::listing::{ListingStore, LoadReport};
use crate::materialize::{BatchMaterializer, BatchSink, FileBatchSink, MaterializedBatch};
use crate::metadata::{
    batch_dir_path, batch_metadata_path, discover_batch_dirs, discover_batch_metadata,
};
use crate::metrics::{CategorySkew, category_skew};
use crate::sampler::{BalancedSampler, SampleSet, SamplingReport};
use crate::splits::{BatchGroup, partition};
use crate::types::BatchNumber;

const NUMBER_OVERFLOW_MSG: &str = "batch numbers exceed the largest supported batch number";

/// Fail when any of the `batch_count` numbers from `first` is out of range or
/// already has a batch directory or metadata file under the output root.
fn check_batch_numbers_free(config: &BatchConfig, first: BatchNumber) -> Result<(), BatchError> {
    let span = BatchNumber::try_from(config.batch_count.saturating_sub(1))
        .map_err(|_| BatchError::Configuration(NUMBER_OVERFLOW_MSG.to_string()))?;
    let last = first
        .checked_add(span)
        .ok_or_else(|| BatchError::Configuration(NUMBER_OVERFLOW_MSG.to_string()))?;
    for number in first..=last {
        let dir = batch_dir_path(&config.output_root, number);
        let metadata = batch_metadata_path(&config.output_root, number);
        if dir.exists() || metadata.exists() {
            return Err(BatchError::Configuration(format!(
                "batch{number} already exists under {}; choose another first batch number",
                config.output_root.display()
            )));
        }
    }
    Ok(())
}

/// Everything decided before any output is written.
#[derive(Clone, Debug)]
pub struct BatchPlan {
    /// Loaded listings.
    pub store: ListingStore,
    /// Loaded image index.
    pub images: ImageIndex,
    /// Image ids excluded because earlier batches used them.
    pub excluded: usize,
    /// Eligible records left after exclusion.
    pub eligible: usize,
    /// Balanced selection.
    pub sample: SampleSet,
    /// Stratified groups, one per requested batch.
    pub groups: Vec<BatchGroup>,
    /// Number given to the first group.
    pub first_batch_number: BatchNumber,
}

impl BatchPlan {
    /// Batch number of each non-empty group with its category skew.
    pub fn group_skew(&self) -> Vec<(BatchNumber, CategorySkew)> {
        self.groups
            .iter()
            .filter_map(|group| {
                let offset = BatchNumber::try_from(group.index).ok()?;
                let skew = category_skew(&group.category_counts())?;
                Some((self.first_batch_number.checked_add(offset)?, skew))
            })
            .collect()
    }
}

/// Result of a complete run.
#[derive(Clone, Debug)]
pub struct PipelineSummary {
    /// Listing load counters.
    pub load: LoadReport,
    /// Size of the exclusion set.
    pub excluded: usize,
    /// Eligible records left after exclusion.
    pub eligible: usize,
    /// Records selected by the sampler.
    pub selected: usize,
    /// Per-pass sampler counts.
    pub sampling: SamplingReport,
    /// Category skew of the whole selection.
    pub selection_skew: Option<CategorySkew>,
    /// Category skew of each non-empty batch.
    pub batch_skew: Vec<(BatchNumber, CategorySkew)>,
    /// One entry per materialized batch.
    pub batches: Vec<MaterializedBatch>,
}

/// Runs one batch-building pass for a [`BatchConfig`].
#[derive(Clone, Debug)]
pub struct BatchPipeline {
    config: BatchConfig,
}

impl BatchPipeline {
    /// Create a pipeline for `config`.
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Load inputs, apply exclusions, sample and partition without writing anything.
    ///
    /// Configuration and capacity errors surface here, before any output exists.
    pub fn plan(&self) -> Result<BatchPlan, BatchError> {
        let config = &self.config;
        config.validate()?;

        let existing = discover_batch_metadata(&config.output_root)?;
        let first_batch_number = match config.first_batch_number {
            Some(number) => number,
            None => {
                let existing_dirs = discover_batch_dirs(&config.output_root)?;
                let highest = existing
                    .iter()
                    .chain(&existing_dirs)
                    .map(|(number, _)| *number)
                    .max();
                match highest {
                    Some(number) => number
                        .checked_add(1)
                        .ok_or_else(|| BatchError::Configuration(NUMBER_OVERFLOW_MSG.to_string()))?,
                    None => FIRST_BATCH_NUMBER,
                }
            }
        };
        check_batch_numbers_free(config, first_batch_number)?;

        let images = ImageIndex::load(&config.image_index)?;
        let store = ListingStore::load(&config.listing_sources, &images)?;

        let mut exclusion_sources = config.exclude_metadata.clone();
        if config.exclude_existing {
            for (_, path) in &existing {
                if !exclusion_sources.contains(path) {
                    exclusion_sources.push(path.clone());
                }
            }
        }
        let exclusions = ExclusionSet::load(&exclusion_sources)?;

        let eligible = store.eligible_indices(&exclusions);
        info!(
            eligible = eligible.len(),
            excluded = exclusions.len(),
            "eligible records after exclusion"
        );
        config.check_capacity(eligible.len())?;

        let index = CategoryIndex::group_by_category(&store, &eligible);
        let sample = BalancedSampler::new(config.sampling.clone()).sample(&index);
        info!(
            categories = index.len(),
            selected = sample.len(),
            target = config.sampling.target,
            "selection drawn"
        );
        let groups = partition(sample.items(), config.batch_count)?;

        Ok(BatchPlan {
            excluded: exclusions.len(),
            eligible: eligible.len(),
            store,
            images,
            sample,
            groups,
            first_batch_number,
        })
    }

    /// Plan and materialize into `output_root` on the filesystem.
    pub fn run(&self) -> Result<PipelineSummary, BatchError> {
        let sink = FileBatchSink::new(&self.config.output_root, self.config.placement);
        self.run_with_sink(sink)
    }

    /// Plan and materialize through a custom sink.
    pub fn run_with_sink<S: BatchSink>(&self, sink: S) -> Result<PipelineSummary, BatchError> {
        let plan = self.plan()?;
        let mut materializer =
            BatchMaterializer::new(&plan.store, &plan.images, &self.config.image_root, sink);
        let batches = materializer.materialize_all(&plan.groups, plan.first_batch_number)?;
        info!(
            batches = batches.len(),
            first = plan.first_batch_number,
            "batch run complete"
        );
        Ok(PipelineSummary {
            load: plan.store.report().clone(),
            excluded: plan.excluded,
            eligible: plan.eligible,
            selected: plan.sample.len(),
            sampling: plan.sample.report().clone(),
            selection_skew: category_skew(&plan.sample.category_counts()),
            batch_skew: plan.group_skew(),
            batches,
        })
    }
}
