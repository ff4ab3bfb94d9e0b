use std::io;
use std::path::Path;

use indexmap::IndexMap;

use crate::constants::analysis::{COMPLETENESS_FIELDS, UNKNOWN_BRAND};
use crate::errors::BatchError;
use crate::listing::ListingStore;
use crate::types::CategoryId;
use crate::utils::{first_entry, first_value, share};

/// A label with its count and share of some total.
#[derive(Clone, Debug, PartialEq)]
pub struct CountShare {
    pub label: String,
    pub count: usize,
    pub share: f64,
}

/// Rank counts most common first; ties keep first-seen order.
pub fn rank_counts(counts: IndexMap<String, usize>, total: usize) -> Vec<CountShare> {
    let mut ranked: Vec<CountShare> = counts
        .into_iter()
        .map(|(label, count)| CountShare {
            share: share(count, total),
            label,
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked
}

fn tally<'a, I>(labels: I) -> IndexMap<String, usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for label in labels {
        *counts.entry(label.to_string()).or_default() += 1;
    }
    counts
}

/// Descriptive statistics over every loaded record, eligible or not.
#[derive(Clone, Debug, PartialEq)]
pub struct ListingStats {
    pub total: usize,
    pub eligible: usize,
    /// First `product_type` value; records without one are not counted.
    pub product_types: Vec<CountShare>,
    /// First brand value (`Unknown` when empty); records without brands are not counted.
    pub brands: Vec<CountShare>,
    pub unique_brands: usize,
    pub countries: Vec<CountShare>,
    pub marketplaces: Vec<CountShare>,
    /// Presence of each completeness field, in fixed field order.
    pub completeness: Vec<CountShare>,
    /// Language tags across all `brand` and `item_name` entries; shares are of all tags.
    pub languages: Vec<CountShare>,
    pub with_main_image: usize,
    pub with_other_images: usize,
    pub average_images: f64,
}

impl ListingStats {
    /// Compute statistics for `store`.
    pub fn from_store(store: &ListingStore) -> Self {
        let records = store.records();
        let total = records.len();
        let listings = || records.iter().map(|record| &record.listing);

        let product_types = tally(listings().filter_map(|listing| first_value(&listing.product_type)));
        let brands = tally(listings().filter_map(|listing| {
            listing.brand.first().map(|entry| {
                if entry.value.is_empty() {
                    UNKNOWN_BRAND
                } else {
                    entry.value.as_str()
                }
            })
        }));
        let countries = tally(listings().filter_map(|listing| listing.country.as_deref()));
        let marketplaces = tally(listings().filter_map(|listing| listing.marketplace.as_deref()));

        let completeness = COMPLETENESS_FIELDS
            .iter()
            .map(|field| {
                let count = listings()
                    .filter(|listing| match *field {
                        "brand" => first_entry(&listing.brand).is_some(),
                        "item_name" => first_entry(&listing.item_name).is_some(),
                        "color" => first_entry(&listing.color).is_some(),
                        "product_type" => first_entry(&listing.product_type).is_some(),
                        _ => listing.main_image().is_some(),
                    })
                    .count();
                CountShare {
                    label: field.to_string(),
                    count,
                    share: share(count, total),
                }
            })
            .collect();

        let languages = tally(listings().flat_map(|listing| {
            listing
                .brand
                .iter()
                .chain(listing.item_name.iter())
                .filter_map(|entry| entry.language_tag.as_deref())
        }));
        let language_total = languages.values().sum();

        let with_main_image = listings()
            .filter(|listing| listing.main_image().is_some())
            .count();
        let with_other_images = listings()
            .filter(|listing| !listing.other_image_id.is_empty())
            .count();
        let image_total: usize = listings()
            .map(|listing| usize::from(listing.main_image().is_some()) + listing.other_image_id.len())
            .sum();

        Self {
            total,
            eligible: records.iter().filter(|record| record.is_eligible()).count(),
            unique_brands: brands.len(),
            product_types: rank_counts(product_types, total),
            brands: rank_counts(brands, total),
            countries: rank_counts(countries, total),
            marketplaces: rank_counts(marketplaces, total),
            completeness,
            languages: rank_counts(languages, language_total),
            with_main_image,
            with_other_images,
            average_images: if total == 0 {
                0.0
            } else {
                image_total as f64 / total as f64
            },
        }
    }
}

/// Write `rows` as a two-column `label,count` CSV with the given header.
pub fn write_count_csv(path: &Path, header: [&str; 2], rows: &[CountShare]) -> Result<(), BatchError> {
    let mut writer = csv::Writer::from_path(path).map_err(io::Error::from)?;
    writer.write_record(header).map_err(io::Error::from)?;
    for row in rows {
        writer
            .write_record([row.label.as_str(), row.count.to_string().as_str()])
            .map_err(io::Error::from)?;
    }
    writer.flush()?;
    Ok(())
}

/// Aggregate skew metrics for per-category counts of a selection or batch.
#[derive(Clone, Debug, PartialEq)]
pub struct CategorySkew {
    pub total: usize,
    pub categories: usize,
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub max_share: f64,
    pub min_share: f64,
    pub ratio: f64,
    pub per_category: Vec<CountShare>,
}

/// Compute skew metrics from per-category counts.
pub fn category_skew(counts: &IndexMap<CategoryId, usize>) -> Option<CategorySkew> {
    let min = *counts.values().min()?;
    let max = *counts.values().max()?;
    let total: usize = counts.values().sum();
    let categories = counts.len();
    let ratio = if min == 0 {
        f64::INFINITY
    } else {
        max as f64 / min as f64
    };
    let mut per_category = rank_counts(counts.clone(), total);
    per_category.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    Some(CategorySkew {
        total,
        categories,
        min,
        max,
        mean: total as f64 / categories as f64,
        max_share: share(max, total),
        min_share: share(min, total),
        ratio,
        per_category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Listing;
    use crate::images::ImageIndex;
    use std::fs;
    use tempfile::tempdir;

    fn store(lines: &[&str]) -> ListingStore {
        let listings: Vec<Listing> = lines
            .iter()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        ListingStore::from_listings(listings, &ImageIndex::from_pairs([("m1", "a/m1.jpg")]))
    }

    #[test]
    fn stats_cover_ineligible_records() {
        let store = store(&[
            r#"{"main_image_id": "m1", "other_image_id": ["o1", "o2"], "country": "US",
                "product_type": [{"value": "SHOES"}],
                "brand": [{"value": "Acme", "language_tag": "en_US"}],
                "item_name": [{"value": "Boot", "language_tag": "en_US"}]}"#,
            r#"{"main_image_id": "unresolved", "country": "DE",
                "product_type": [{"value": "SHOES"}],
                "brand": [{"value": "", "language_tag": "de_DE"}]}"#,
            r#"{"country": "US", "product_type": [{"value": "CHAIR"}], "color": [{"value": "Red"}]}"#,
        ]);
        let stats = ListingStats::from_store(&store);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.eligible, 1);
        assert_eq!(stats.product_types[0].label, "SHOES");
        assert_eq!(stats.product_types[0].count, 2);
        assert_eq!(stats.unique_brands, 2);
        assert!(stats.brands.iter().any(|row| row.label == "Unknown"));
        assert_eq!(stats.countries[0].label, "US");
        assert!((stats.countries[0].share - 2.0 / 3.0).abs() < 1e-9);
        assert!(stats.marketplaces.is_empty());

        let completeness: Vec<(&str, usize)> = stats
            .completeness
            .iter()
            .map(|row| (row.label.as_str(), row.count))
            .collect();
        assert_eq!(
            completeness,
            vec![
                ("brand", 1),
                ("item_name", 1),
                ("color", 1),
                ("product_type", 3),
                ("main_image_id", 2)
            ]
        );

        assert_eq!(stats.languages[0].label, "en_US");
        assert_eq!(stats.languages[0].count, 2);
        assert_eq!(stats.with_main_image, 2);
        assert_eq!(stats.with_other_images, 1);
        assert!((stats.average_images - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn ranking_is_stable_for_ties() {
        let ranked = rank_counts(
            IndexMap::from([("b".to_string(), 1), ("a".to_string(), 1), ("c".to_string(), 2)]),
            4,
        );
        let labels: Vec<&str> = ranked.iter().map(|row| row.label.as_str()).collect();
        assert_eq!(labels, vec!["c", "b", "a"]);
        assert!((ranked[0].share - 0.5).abs() < 1e-9);
    }

    #[test]
    fn count_csv_has_header_and_rows() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("product_types.csv");
        let rows = rank_counts(IndexMap::from([("SHOES".to_string(), 3)]), 3);
        write_count_csv(&path, ["Product Type", "Count"], &rows).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Product Type,Count\nSHOES,3\n"
        );
    }

    #[test]
    fn category_skew_reports_balance() {
        let counts = IndexMap::from([("A".to_string(), 2), ("B".to_string(), 2)]);
        let skew = category_skew(&counts).expect("skew");
        assert_eq!(skew.total, 4);
        assert_eq!(skew.categories, 2);
        assert!((skew.max_share - 0.5).abs() < 1e-6);
        assert!((skew.ratio - 1.0).abs() < 1e-6);
        assert!(
            skew.per_category
                .iter()
                .all(|entry| (entry.share - 0.5).abs() < 1e-6)
        );
    }

    #[test]
    fn category_skew_reports_imbalance() {
        let counts = IndexMap::from([
            ("B".to_string(), 2),
            ("A".to_string(), 4),
            ("C".to_string(), 2),
        ]);
        let skew = category_skew(&counts).expect("skew");
        assert_eq!(skew.total, 8);
        assert_eq!(skew.min, 2);
        assert_eq!(skew.max, 4);
        assert!((skew.ratio - 2.0).abs() < 1e-6);
        assert_eq!(skew.per_category[0].label, "A");
        assert_eq!(skew.per_category[1].label, "B");
        assert!(category_skew(&IndexMap::new()).is_none());
    }
}
