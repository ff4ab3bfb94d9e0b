/// Constants used by category derivation.
pub mod category {
    /// Category assigned to listings without a usable `product_type`.
    pub const UNKNOWN_CATEGORY: &str = "Unknown";
}

/// Constants used by listing loading and shard combination.
pub mod listing {
    /// File name prefix of sharded listing files (`listings_0.json`, `listings_a`, ...).
    pub const LISTING_SHARD_PREFIX: &str = "listings_";
    /// Default output file for the shard combiner.
    pub const DEFAULT_COMBINED_FILENAME: &str = "combined_listings.json";
    /// Separator between source stem and line number in synthesized record ids.
    pub const SYNTHETIC_ID_SEPARATOR: &str = ":";
    /// Log message used when malformed listing lines are skipped.
    pub const SKIP_MALFORMED_MSG: &str = "skipping malformed listing line";
}

/// Constants used by the images index and image placement.
pub mod images {
    /// Extension used when an indexed image path carries none.
    pub const DEFAULT_IMAGE_EXTENSION: &str = "jpg";
}

/// Default sampling parameters.
pub mod sampler {
    /// Default RNG seed.
    pub const DEFAULT_SEED: u64 = 42;
    /// Default total number of sampled records.
    pub const DEFAULT_TARGET: usize = 20_000;
    /// Default floor-pass draw per category.
    pub const DEFAULT_MIN_PER_CATEGORY: usize = 5;
    /// Default cap on floor + proportional contributions per category.
    pub const DEFAULT_MAX_PER_CATEGORY: usize = 200;
}

/// Constants used by batch layout and metadata sinks.
pub mod batches {
    /// Default number of output batches per run.
    pub const DEFAULT_BATCH_COUNT: usize = 4;
    /// Directory / metadata file name prefix (`batch5/`, `batch5_metadata.json`).
    pub const BATCH_PREFIX: &str = "batch";
    /// Metadata file name suffix following the batch number.
    pub const METADATA_SUFFIX: &str = "_metadata.json";
    /// Extension appended to metadata files while they are being written.
    pub const PARTIAL_SUFFIX: &str = ".partial";
    /// First batch number used on an empty output root.
    pub const FIRST_BATCH_NUMBER: u32 = 1;
}

/// Constants used by descriptive statistics.
pub mod analysis {
    /// Number of rows shown for "top N" distributions.
    pub const DEFAULT_TOP_N: usize = 10;
    /// Default directory for analysis CSV outputs.
    pub const DEFAULT_ANALYSIS_DIR: &str = "analysis_results";
    /// Product type distribution CSV file name.
    pub const PRODUCT_TYPES_CSV: &str = "product_types.csv";
    /// Brand distribution CSV file name.
    pub const BRANDS_CSV: &str = "brands.csv";
    /// Country distribution CSV file name.
    pub const COUNTRIES_CSV: &str = "countries.csv";
    /// Brand label used when a brand entry carries an empty value.
    pub const UNKNOWN_BRAND: &str = "Unknown";
    /// Fields checked by the completeness report, in report order.
    pub const COMPLETENESS_FIELDS: [&str; 5] =
        ["brand", "item_name", "color", "product_type", "main_image_id"];
}
