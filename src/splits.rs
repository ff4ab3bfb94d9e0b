//! Batch Partitioner: stratified split of a selection into `K` groups.

use indexmap::IndexMap;

use crate::errors::BatchError;
use crate::sampler::SampledItem;
use crate::types::{CategoryId, RecordIdx};

/// One of the `K` disjoint output groups.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchGroup {
    /// Zero-based position among the groups of one partition call.
    pub index: usize,
    /// Items assigned to this group, category by category.
    pub items: Vec<SampledItem>,
}

impl BatchGroup {
    /// Number of items in the group.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the group received nothing.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Record positions in group order.
    pub fn records(&self) -> Vec<RecordIdx> {
        self.items.iter().map(|item| item.record).collect()
    }

    /// Per-category counts, in first-appearance order.
    pub fn category_counts(&self) -> IndexMap<CategoryId, usize> {
        let mut counts: IndexMap<CategoryId, usize> = IndexMap::new();
        for item in &self.items {
            *counts.entry(item.category.clone()).or_default() += 1;
        }
        counts
    }
}

/// Split `count` items into `groups` sizes: `count / groups` each, plus one
/// for the first `count % groups` groups.
///
/// ```
/// use listing_batches::splits::group_sizes;
///
/// assert_eq!(group_sizes(10, 4), vec![3, 3, 2, 2]);
/// assert_eq!(group_sizes(2, 4), vec![1, 1, 0, 0]);
/// ```
pub fn group_sizes(count: usize, groups: usize) -> Vec<usize> {
    if groups == 0 {
        return Vec::new();
    }
    let base = count / groups;
    let extra = count % groups;
    (0..groups)
        .map(|idx| base + usize::from(idx < extra))
        .collect()
}

/// Partition `items` into `batch_count` disjoint, category-stratified groups.
///
/// Categories are visited in first-appearance order. Each category's items
/// keep their relative order and are dealt out with [`group_sizes`], so per
/// category the group sizes differ by at most one. Every group is returned,
/// including empty ones.
pub fn partition(items: &[SampledItem], batch_count: usize) -> Result<Vec<BatchGroup>, BatchError> {
    if batch_count == 0 {
        return Err(BatchError::Configuration(
            "batch count must be greater than zero".to_string(),
        ));
    }
    let mut by_category: IndexMap<&CategoryId, Vec<&SampledItem>> = IndexMap::new();
    for item in items {
        by_category.entry(&item.category).or_default().push(item);
    }

    let mut groups: Vec<BatchGroup> = (0..batch_count)
        .map(|index| BatchGroup {
            index,
            items: Vec::new(),
        })
        .collect();
    for category_items in by_category.values() {
        let mut start = 0usize;
        for (group, size) in groups
            .iter_mut()
            .zip(group_sizes(category_items.len(), batch_count))
        {
            let end = start + size;
            group
                .items
                .extend(category_items[start..end].iter().map(|item| (*item).clone()));
            start = end;
        }
    }
    Ok(groups)
}
