//! Listing Store: parses line-delimited JSON listings into `ProductRecord`s.
//!
//! Every parsed line becomes a record, eligible or not, so descriptive
//! statistics cover the whole corpus. Eligibility (a main image id that
//! resolves in the images index) is decided once at load time.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::category::derive_category;
use crate::constants::listing::{SKIP_MALFORMED_MSG, SYNTHETIC_ID_SEPARATOR};
use crate::data::{Listing, ProductRecord};
use crate::errors::BatchError;
use crate::exclusion::ExclusionSet;
use crate::images::ImageIndex;
use crate::transport::fs::{file_name_str, file_stem_str, find_listing_shards};
use crate::types::RecordIdx;

/// Counters collected while loading listings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Non-blank lines read across all sources.
    pub lines: usize,
    /// Lines parsed into records.
    pub parsed: usize,
    /// Lines skipped because they were not valid listing JSON.
    pub skipped: usize,
    /// Records without a main image id.
    pub missing_image: usize,
    /// Records whose main image id is absent from the images index.
    pub unresolved_image: usize,
}

impl LoadReport {
    /// Records that are eligible for sampling.
    pub fn eligible(&self) -> usize {
        self.parsed - self.missing_image - self.unresolved_image
    }
}

/// In-memory collection of every parsed product record.
#[derive(Clone, Debug, Default)]
pub struct ListingStore {
    records: Vec<ProductRecord>,
    by_image: HashMap<String, RecordIdx>,
    report: LoadReport,
}

impl ListingStore {
    /// Load every source in order, resolving eligibility against `images`.
    ///
    /// A source that cannot be opened is an error; malformed lines are skipped.
    pub fn load(sources: &[PathBuf], images: &ImageIndex) -> Result<Self, BatchError> {
        let mut store = Self::default();
        for source in sources {
            let file = File::open(source).map_err(|err| BatchError::SourceUnavailable {
                path: source.display().to_string(),
                reason: err.to_string(),
            })?;
            let label = file_stem_str(source).unwrap_or("listings").to_string();
            store.extend_from_reader(BufReader::new(file), &label, images)?;
            debug!(
                path = %source.display(),
                records = store.len(),
                "listing source loaded"
            );
        }
        info!(
            records = store.report.parsed,
            skipped = store.report.skipped,
            eligible = store.report.eligible(),
            "listings loaded"
        );
        Ok(store)
    }

    /// Parse records from a line-delimited JSON reader.
    ///
    /// `label` names the source in logs and in synthesized record ids.
    pub fn extend_from_reader<R: BufRead>(
        &mut self,
        reader: R,
        label: &str,
        images: &ImageIndex,
    ) -> Result<(), BatchError> {
        for (line_idx, line) in reader.lines().enumerate() {
            let line_no = line_idx + 1;
            let line = match line {
                Ok(line) => line,
                Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                    self.report.lines += 1;
                    self.report.skipped += 1;
                    warn!(source = label, line = line_no, error = %err, SKIP_MALFORMED_MSG);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            self.report.lines += 1;
            match serde_json::from_str::<Listing>(trimmed) {
                Ok(listing) => {
                    let fallback_id = format!("{label}{SYNTHETIC_ID_SEPARATOR}{line_no}");
                    self.push_listing(listing, fallback_id, images);
                }
                Err(err) => {
                    self.report.skipped += 1;
                    warn!(source = label, line = line_no, error = %err, SKIP_MALFORMED_MSG);
                }
            }
        }
        Ok(())
    }

    /// Build a store from already-parsed listings (ids fall back to `listing:<n>`).
    pub fn from_listings<I>(listings: I, images: &ImageIndex) -> Self
    where
        I: IntoIterator<Item = Listing>,
    {
        let mut store = Self::default();
        for (idx, listing) in listings.into_iter().enumerate() {
            store.report.lines += 1;
            let fallback_id = format!("listing{SYNTHETIC_ID_SEPARATOR}{}", idx + 1);
            store.push_listing(listing, fallback_id, images);
        }
        store
    }

    fn push_listing(&mut self, listing: Listing, fallback_id: String, images: &ImageIndex) {
        self.report.parsed += 1;
        let id = listing
            .item_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or(fallback_id);
        let category = derive_category(&listing);
        let image_id = match listing.main_image() {
            None => {
                self.report.missing_image += 1;
                None
            }
            Some(image_id) if images.contains(image_id) => Some(image_id.to_string()),
            Some(image_id) => {
                self.report.unresolved_image += 1;
                debug!(record = %id, image_id, "main image not in image index");
                None
            }
        };
        let idx = self.records.len();
        if let Some(main_image) = listing.main_image() {
            self.by_image.insert(main_image.to_string(), idx);
        }
        self.records.push(ProductRecord {
            id,
            category,
            image_id,
            listing,
        });
    }

    /// All loaded records, in load order.
    pub fn records(&self) -> &[ProductRecord] {
        &self.records
    }

    /// Record at `idx`.
    pub fn get(&self, idx: RecordIdx) -> Option<&ProductRecord> {
        self.records.get(idx)
    }

    /// Number of loaded records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing was loaded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Load counters.
    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// Positions of eligible records whose image id is not excluded, in load order.
    ///
    /// Records sharing a main image collapse to the last loaded one, the same
    /// record [`ListingStore::find_by_image_id`] returns.
    pub fn eligible_indices(&self, exclusions: &ExclusionSet) -> Vec<RecordIdx> {
        self.records
            .iter()
            .enumerate()
            .filter(|(idx, record)| {
                record.image_id.as_deref().is_some_and(|image_id| {
                    !exclusions.contains(image_id) && self.by_image.get(image_id) == Some(idx)
                })
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Last loaded record whose `main_image_id` equals `image_id`, eligible or not.
    pub fn find_by_image_id(&self, image_id: &str) -> Option<&ProductRecord> {
        self.by_image
            .get(image_id)
            .and_then(|idx| self.records.get(*idx))
    }
}

/// Outcome of combining listing shards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CombineReport {
    /// Shard files found.
    pub shards: usize,
    /// Valid JSON lines written.
    pub written: usize,
    /// Invalid lines skipped.
    pub skipped: usize,
    /// Shards that could not be read.
    pub unreadable: usize,
}

/// Merge every `listings_*` shard in `listings_dir` into one line-delimited file.
///
/// Lines are validated as JSON and copied verbatim; invalid lines are skipped.
pub fn combine_listing_files(
    listings_dir: &Path,
    output: &Path,
) -> Result<CombineReport, BatchError> {
    let shards = find_listing_shards(listings_dir)?;
    info!(
        dir = %listings_dir.display(),
        shards = shards.len(),
        "found listing shards"
    );
    let mut report = CombineReport {
        shards: shards.len(),
        ..CombineReport::default()
    };
    let mut writer = BufWriter::new(File::create(output)?);
    for (idx, shard) in shards.iter().enumerate() {
        let name = file_name_str(shard).unwrap_or("<non-utf8>");
        let file = match File::open(shard) {
            Ok(file) => file,
            Err(err) => {
                report.unreadable += 1;
                warn!(path = %shard.display(), error = %err, "skipping unreadable listing shard");
                continue;
            }
        };
        let mut shard_written = 0usize;
        for (line_idx, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    report.skipped += 1;
                    warn!(shard = name, line = line_idx + 1, error = %err, SKIP_MALFORMED_MSG);
                    continue;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(trimmed) {
                Ok(_) => {
                    writer.write_all(trimmed.as_bytes())?;
                    writer.write_all(b"\n")?;
                    shard_written += 1;
                }
                Err(err) => {
                    report.skipped += 1;
                    warn!(shard = name, line = line_idx + 1, error = %err, SKIP_MALFORMED_MSG);
                }
            }
        }
        report.written += shard_written;
        debug!(
            shard = name,
            position = idx + 1,
            of = shards.len(),
            written = shard_written,
            "combined listing shard"
        );
    }
    writer.flush()?;
    info!(
        output = %output.display(),
        written = report.written,
        skipped = report.skipped,
        "combined listings"
    );
    Ok(report)
}
