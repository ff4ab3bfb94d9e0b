//! Balanced Sampler: selects a target-sized, category-diverse subset.
//!
//! Three passes run in a fixed order against a single seeded RNG:
//!
//! 1. floor: each category (largest first) gives `min(min_per_category, size)`;
//! 2. proportional: the remaining budget is split by remaining bucket size,
//!    capped so floor + proportional never exceeds `max_per_category`;
//! 3. top-up: any shortfall is drawn from everything left, with no cap.
//!
//! The result is shuffled and truncated to the target. Same seed plus same
//! input order gives the same selection.

use indexmap::IndexMap;
use rand::prelude::*;
use rand::seq::index;
use std::collections::HashSet;
use tracing::debug;

use crate::category::CategoryIndex;
use crate::config::SamplingConfig;
use crate::types::{CategoryId, RecordIdx};

#[derive(Debug, Clone)]
/// Small deterministic RNG used for reproducible sampling.
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    /// Seed a new generator.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Current internal state.
    pub fn state(&self) -> u64 {
        self.state
    }

    fn next_u64_internal(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9E3779B97F4A7C15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}

impl rand::RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64_internal() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u64_internal()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut offset = 0;
        while offset < dest.len() {
            let value = self.next_u64_internal();
            let bytes = value.to_le_bytes();
            let remaining = dest.len() - offset;
            let copy_len = remaining.min(bytes.len());
            dest[offset..offset + copy_len].copy_from_slice(&bytes[..copy_len]);
            offset += copy_len;
        }
    }
}

/// One selected record together with its category.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SampledItem {
    /// Record position in the `ListingStore`.
    pub record: RecordIdx,
    /// Category the record was drawn from.
    pub category: CategoryId,
}

/// Per-pass contribution of one category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CategoryContribution {
    /// Drawn in the floor pass.
    pub floor: usize,
    /// Drawn in the proportional pass.
    pub proportional: usize,
    /// Drawn in the top-up pass.
    pub top_up: usize,
}

impl CategoryContribution {
    /// Floor + proportional draws (the part bounded by `max_per_category`).
    pub fn capped(&self) -> usize {
        self.floor + self.proportional
    }

    /// Draws across all passes.
    pub fn total(&self) -> usize {
        self.floor + self.proportional + self.top_up
    }
}

/// What each pass drew, before the final truncation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SamplingReport {
    /// Contributions keyed by category, in floor-pass (size-descending) order.
    pub per_category: IndexMap<CategoryId, CategoryContribution>,
    /// Records dropped by truncating to the target.
    pub truncated: usize,
}

impl SamplingReport {
    /// Total floor-pass draws.
    pub fn floor_total(&self) -> usize {
        self.per_category.values().map(|c| c.floor).sum()
    }

    /// Total proportional-pass draws.
    pub fn proportional_total(&self) -> usize {
        self.per_category.values().map(|c| c.proportional).sum()
    }

    /// Total top-up draws.
    pub fn top_up_total(&self) -> usize {
        self.per_category.values().map(|c| c.top_up).sum()
    }

    fn entry(&mut self, category: &CategoryId) -> &mut CategoryContribution {
        self.per_category.entry(category.clone()).or_default()
    }
}

/// The chosen subset: unique records in shuffled order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleSet {
    items: Vec<SampledItem>,
    report: SamplingReport,
}

impl SampleSet {
    /// Selected items in final (shuffled) order.
    pub fn items(&self) -> &[SampledItem] {
        &self.items
    }

    /// Per-pass draw counts.
    pub fn report(&self) -> &SamplingReport {
        &self.report
    }

    /// Number of selected records.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Selected record positions in final order.
    pub fn records(&self) -> Vec<RecordIdx> {
        self.items.iter().map(|item| item.record).collect()
    }

    /// Final per-category counts, in first-appearance order.
    pub fn category_counts(&self) -> IndexMap<CategoryId, usize> {
        let mut counts: IndexMap<CategoryId, usize> = IndexMap::new();
        for item in &self.items {
            *counts.entry(item.category.clone()).or_default() += 1;
        }
        counts
    }
}

/// Category-balanced sampler driven by one seeded RNG.
#[derive(Clone, Debug)]
pub struct BalancedSampler {
    config: SamplingConfig,
    rng: DeterministicRng,
}

impl BalancedSampler {
    /// Create a sampler seeded from `config.seed`.
    pub fn new(config: SamplingConfig) -> Self {
        let rng = DeterministicRng::new(config.seed);
        Self { config, rng }
    }

    /// Active configuration.
    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Select up to `target` records from `index`.
    ///
    /// `index` must already exclude ineligible and previously emitted records.
    /// The result holds `min(target, index.total_records())` unique records.
    pub fn sample(&mut self, index: &CategoryIndex) -> SampleSet {
        let target = self.config.target;
        if target == 0 || index.is_empty() {
            return SampleSet::default();
        }

        let mut report = SamplingReport::default();
        let mut remaining: IndexMap<CategoryId, Vec<RecordIdx>> = index
            .categories_by_size_desc()
            .into_iter()
            .filter_map(|category| {
                index
                    .bucket(category)
                    .map(|bucket| (category.clone(), bucket.to_vec()))
            })
            .collect();
        let mut selection: Vec<SampledItem> = Vec::with_capacity(target);

        // Floor pass.
        for (category, bucket) in remaining.iter_mut() {
            let take = self.config.min_per_category.min(bucket.len());
            let drawn = draw_without_replacement(&mut self.rng, bucket, take);
            report.entry(category).floor = drawn.len();
            extend_selection(&mut selection, category, drawn);
        }

        // Proportional pass.
        let budget = target.saturating_sub(selection.len());
        let available: usize = remaining.values().map(Vec::len).sum();
        if budget > 0 && available > 0 {
            for (category, bucket) in remaining.iter_mut() {
                if bucket.is_empty() {
                    continue;
                }
                let allocation = proportional_allocation(budget, bucket.len(), available);
                let taken = report.entry(category).floor;
                let headroom = self.config.max_per_category.saturating_sub(taken);
                let take = allocation.min(headroom).min(bucket.len());
                if take == 0 {
                    continue;
                }
                let drawn = draw_without_replacement(&mut self.rng, bucket, take);
                report.entry(category).proportional = drawn.len();
                extend_selection(&mut selection, category, drawn);
            }
        }

        // Top-up pass: no per-category cap.
        if selection.len() < target {
            let needed = target - selection.len();
            let pool: Vec<SampledItem> = remaining
                .iter()
                .flat_map(|(category, bucket)| {
                    bucket.iter().map(move |record| SampledItem {
                        record: *record,
                        category: category.clone(),
                    })
                })
                .collect();
            let take = needed.min(pool.len());
            if take > 0 {
                for pick in index::sample(&mut self.rng, pool.len(), take) {
                    let item = pool[pick].clone();
                    report.entry(&item.category).top_up += 1;
                    selection.push(item);
                }
            }
        }

        selection.shuffle(&mut self.rng);
        report.truncated = selection.len().saturating_sub(target);
        selection.truncate(target);

        debug!(
            categories = report.per_category.len(),
            floor = report.floor_total(),
            proportional = report.proportional_total(),
            top_up = report.top_up_total(),
            truncated = report.truncated,
            selected = selection.len(),
            "balanced sample drawn"
        );

        SampleSet {
            items: selection,
            report,
        }
    }
}

/// `floor(budget * bucket / available)` without intermediate overflow.
pub fn proportional_allocation(budget: usize, bucket: usize, available: usize) -> usize {
    if available == 0 {
        return 0;
    }
    ((budget as u128 * bucket as u128) / available as u128) as usize
}

/// Draw `amount` records uniformly without replacement and remove them from `bucket`.
///
/// Removal is by position, so the rest of the bucket keeps its order.
fn draw_without_replacement<R: Rng + ?Sized>(
    rng: &mut R,
    bucket: &mut Vec<RecordIdx>,
    amount: usize,
) -> Vec<RecordIdx> {
    let amount = amount.min(bucket.len());
    if amount == 0 {
        return Vec::new();
    }
    let picks = index::sample(rng, bucket.len(), amount).into_vec();
    let drawn: Vec<RecordIdx> = picks.iter().map(|pos| bucket[*pos]).collect();
    let chosen: HashSet<usize> = picks.into_iter().collect();
    let mut position = 0usize;
    bucket.retain(|_| {
        let keep = !chosen.contains(&position);
        position += 1;
        keep
    });
    drawn
}

fn extend_selection(selection: &mut Vec<SampledItem>, category: &CategoryId, drawn: Vec<RecordIdx>) {
    selection.extend(drawn.into_iter().map(|record| SampledItem {
        record,
        category: category.clone(),
    }));
}
