#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Command-line runners behind the binaries in `src/bin`.
pub mod apps;
/// Category derivation and the category index.
pub mod category;
/// Sampling and batch run configuration.
pub mod config;
/// Centralized constants used across loading, sampling, and batch output.
pub mod constants;
/// Listing model and product records.
#[allow(missing_docs)]
pub mod data;
/// Exclusion of image ids used by earlier batches.
pub mod exclusion;
/// Images index lookup.
pub mod images;
/// Listing store and shard combiner.
pub mod listing;
/// Batch image placement and metadata sinks.
pub mod materialize;
/// Batch metadata entries and file layout.
#[allow(missing_docs)]
pub mod metadata;
/// Descriptive statistics and category skew.
#[allow(missing_docs)]
pub mod metrics;
/// End-to-end batch building.
pub mod pipeline;
/// Balanced sampler.
pub mod sampler;
/// Stratified batch partitioning.
pub mod splits;
/// Storage transports (local filesystem).
pub mod transport;
/// Shared type aliases.
pub mod types;
/// Helpers over locale-tagged attribute lists.
pub mod utils;

mod errors;

pub use category::{CategoryIndex, derive_category};
pub use config::{BatchConfig, PlacementMode, SamplingConfig};
pub use data::{Listing, LocalizedValue, ProductRecord};
pub use errors::BatchError;
pub use exclusion::ExclusionSet;
pub use images::ImageIndex;
pub use listing::{ListingStore, LoadReport, combine_listing_files};
pub use materialize::{BatchMaterializer, BatchSink, FileBatchSink, MaterializedBatch};
pub use metadata::BatchMetadataEntry;
pub use pipeline::{BatchPipeline, PipelineSummary};
pub use sampler::{BalancedSampler, DeterministicRng, SampleSet, SampledItem, SamplingReport};
pub use splits::{BatchGroup, partition};
pub use types::{BatchNumber, CategoryId, ImageId, PathString, RecordId, RecordIdx};
