use indexmap::IndexMap;

use crate::constants::category::UNKNOWN_CATEGORY;
use crate::data::Listing;
use crate::listing::ListingStore;
use crate::types::{CategoryId, RecordIdx};
use crate::utils::first_value;

/// Category label of a listing: its first `product_type` value, or `Unknown`.
pub fn derive_category(listing: &Listing) -> CategoryId {
    first_value(&listing.product_type)
        .unwrap_or(UNKNOWN_CATEGORY)
        .to_string()
}

/// Records grouped by category.
///
/// Buckets keep first-seen category order and input order within a bucket,
/// so grouping is a pure function of the input sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CategoryIndex {
    buckets: IndexMap<CategoryId, Vec<RecordIdx>>,
}

impl CategoryIndex {
    /// Group the records at `indices` by their derived category.
    ///
    /// Indices missing from `store` are ignored.
    pub fn group_by_category(store: &ListingStore, indices: &[RecordIdx]) -> Self {
        Self::from_pairs(indices.iter().filter_map(|idx| {
            store
                .get(*idx)
                .map(|record| (record.category.clone(), *idx))
        }))
    }

    /// Group `(category, record)` pairs, preserving order.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (CategoryId, RecordIdx)>,
    {
        let mut buckets: IndexMap<CategoryId, Vec<RecordIdx>> = IndexMap::new();
        for (category, idx) in pairs {
            buckets.entry(category).or_default().push(idx);
        }
        Self { buckets }
    }

    /// Records in `category`.
    pub fn bucket(&self, category: &str) -> Option<&[RecordIdx]> {
        self.buckets.get(category).map(Vec::as_slice)
    }

    /// Iterate buckets in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&CategoryId, &[RecordIdx])> {
        self.buckets
            .iter()
            .map(|(category, bucket)| (category, bucket.as_slice()))
    }

    /// Categories ordered by bucket size, largest first; ties keep first-seen order.
    pub fn categories_by_size_desc(&self) -> Vec<&CategoryId> {
        let mut categories: Vec<(&CategoryId, usize)> = self
            .buckets
            .iter()
            .map(|(category, bucket)| (category, bucket.len()))
            .collect();
        categories.sort_by(|a, b| b.1.cmp(&a.1));
        categories
            .into_iter()
            .map(|(category, _)| category)
            .collect()
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True when there are no categories.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total records across all buckets.
    pub fn total_records(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}
