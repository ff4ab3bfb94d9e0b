use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, error::ErrorKind};

use crate::config::{BatchConfig, PlacementMode, SamplingConfig};
use crate::constants::analysis::{
    BRANDS_CSV, COUNTRIES_CSV, DEFAULT_ANALYSIS_DIR, DEFAULT_TOP_N, PRODUCT_TYPES_CSV,
};
use crate::constants::batches::DEFAULT_BATCH_COUNT;
use crate::constants::listing::DEFAULT_COMBINED_FILENAME;
use crate::constants::sampler::{
    DEFAULT_MAX_PER_CATEGORY, DEFAULT_MIN_PER_CATEGORY, DEFAULT_SEED, DEFAULT_TARGET,
};
use crate::images::ImageIndex;
use crate::listing::{ListingStore, combine_listing_files};
use crate::materialize::rebuild_group_metadata;
use crate::metadata::{
    batch_dir_path, batch_metadata_path, discover_batch_dirs, write_batch_metadata,
};
use crate::metrics::{CategorySkew, CountShare, ListingStats, write_count_csv};
use crate::pipeline::{BatchPipeline, PipelineSummary};
use crate::types::BatchNumber;
use crate::utils::format_with_commas;

#[derive(Debug, Parser)]
#[command(
    name = "combine_listings",
    disable_help_subcommand = true,
    about = "Merge listing shards into one file",
    long_about = "Merge every listings_* shard in a directory into one line-delimited JSON file, dropping lines that are not valid JSON."
)]
struct CombineListingsCli {
    #[arg(
        long = "listings-dir",
        value_name = "DIR",
        help = "Directory holding listings_* shard files"
    )]
    listings_dir: PathBuf,
    #[arg(
        long,
        value_name = "FILE",
        default_value = DEFAULT_COMBINED_FILENAME,
        help = "Combined output file"
    )]
    output: PathBuf,
}

#[derive(Debug, Parser)]
#[command(
    name = "analyze_listings",
    disable_help_subcommand = true,
    about = "Descriptive statistics for a listing corpus",
    long_about = "Print product type, brand, country, marketplace, completeness, language and image statistics, and write distribution CSVs.",
    after_help = "Without --image-index every record counts as ineligible; the other statistics are unaffected."
)]
struct AnalyzeListingsCli {
    #[arg(
        long = "listings",
        value_name = "FILE",
        default_value = DEFAULT_COMBINED_FILENAME,
        help = "Line-delimited JSON listing file, repeat as needed"
    )]
    listings: Vec<PathBuf>,
    #[arg(
        long = "image-index",
        value_name = "CSV",
        help = "Optional images.csv used to count eligible records"
    )]
    image_index: Option<PathBuf>,
    #[arg(
        long = "output-dir",
        value_name = "DIR",
        default_value = DEFAULT_ANALYSIS_DIR,
        help = "Directory receiving product_types.csv, brands.csv and countries.csv"
    )]
    output_dir: PathBuf,
    #[arg(
        long,
        default_value_t = DEFAULT_TOP_N,
        value_parser = parse_positive_usize,
        help = "Rows printed for top-N distributions"
    )]
    top: usize,
}

#[derive(Debug, Parser)]
#[command(
    name = "build_batches",
    disable_help_subcommand = true,
    about = "Sample a category-balanced subset into numbered batches",
    long_about = "Load listings, drop records whose image was used by earlier batches, draw a category-balanced sample and write it as K stratified batch directories with metadata files.",
    after_help = "Batch numbering continues after the highest batch<n> directory or metadata file in the output root unless --first-batch is given. Numbers that already exist are rejected."
)]
struct BuildBatchesCli {
    #[arg(
        long = "listings",
        value_name = "FILE",
        required = true,
        help = "Line-delimited JSON listing file, repeat as needed in load order"
    )]
    listings: Vec<PathBuf>,
    #[arg(long = "image-index", value_name = "CSV", help = "images.csv mapping image_id to path")]
    image_index: PathBuf,
    #[arg(
        long = "image-root",
        value_name = "DIR",
        help = "Directory that image index paths are relative to"
    )]
    image_root: PathBuf,
    #[arg(long = "output-root", value_name = "DIR", help = "Directory receiving batch output")]
    output_root: PathBuf,
    #[arg(
        long,
        default_value_t = DEFAULT_BATCH_COUNT,
        value_parser = parse_positive_usize,
        help = "Number of batches the sample is split into"
    )]
    batches: usize,
    #[arg(long, default_value_t = DEFAULT_TARGET, help = "Total number of products to sample")]
    target: usize,
    #[arg(
        long = "min-per-category",
        default_value_t = DEFAULT_MIN_PER_CATEGORY,
        help = "Products drawn from every category before proportional allocation"
    )]
    min_per_category: usize,
    #[arg(
        long = "max-per-category",
        default_value_t = DEFAULT_MAX_PER_CATEGORY,
        help = "Cap on a category's floor plus proportional draws"
    )]
    max_per_category: usize,
    #[arg(long, default_value_t = DEFAULT_SEED, help = "Deterministic sampling seed")]
    seed: u64,
    #[arg(
        long = "exclude-metadata",
        value_name = "FILE",
        help = "Earlier batch metadata whose image ids must not be reused, repeat as needed"
    )]
    exclude_metadata: Vec<PathBuf>,
    #[arg(
        long = "exclude-existing",
        help = "Also exclude every batch<n>_metadata.json already in the output root"
    )]
    exclude_existing: bool,
    #[arg(
        long = "first-batch",
        value_name = "N",
        help = "Number of the first written batch"
    )]
    first_batch: Option<BatchNumber>,
    #[arg(long = "hard-link", help = "Hard-link images instead of copying them")]
    hard_link: bool,
    #[arg(
        long = "allow-shortfall",
        help = "Write fewer products than --target when not enough are eligible"
    )]
    allow_shortfall: bool,
    #[arg(long = "dry-run", help = "Report the plan without writing anything")]
    dry_run: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "rebuild_metadata",
    disable_help_subcommand = true,
    about = "Regenerate batch metadata from batch directories",
    long_about = "Rewrite batch<n>_metadata.json for existing batch directories, looking up each image file's listing by image id."
)]
struct RebuildMetadataCli {
    #[arg(
        long = "listings",
        value_name = "FILE",
        required = true,
        help = "Line-delimited JSON listing file, repeat as needed"
    )]
    listings: Vec<PathBuf>,
    #[arg(long = "image-index", value_name = "CSV", help = "images.csv mapping image_id to path")]
    image_index: PathBuf,
    #[arg(long = "output-root", value_name = "DIR", help = "Directory holding batch<n>/ directories")]
    output_root: PathBuf,
    #[arg(
        long = "batch",
        value_name = "N",
        help = "Batch number to rebuild, repeat as needed (default: every batch directory)"
    )]
    batches: Vec<BatchNumber>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Merge listing shards into one file.
pub fn run_combine_listings<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<CombineListingsCli, _>(
        std::iter::once("combine_listings".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let report = combine_listing_files(&cli.listings_dir, &cli.output)?;
    println!("=== combine listings ===");
    println!("shards: {}", report.shards);
    println!("lines written: {}", format_with_commas(report.written));
    println!("lines skipped: {}", format_with_commas(report.skipped));
    if report.unreadable > 0 {
        println!("unreadable shards: {}", report.unreadable);
    }
    println!("output: {}", cli.output.display());
    Ok(())
}

/// Print listing statistics and write distribution CSVs.
pub fn run_analyze_listings<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<AnalyzeListingsCli, _>(
        std::iter::once("analyze_listings".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let images = match &cli.image_index {
        Some(path) => ImageIndex::load(path)?,
        None => ImageIndex::default(),
    };
    let store = ListingStore::load(&cli.listings, &images)?;
    let stats = ListingStats::from_store(&store);

    println!("=== listing analysis ===");
    println!("total products: {}", format_with_commas(stats.total));
    println!(
        "skipped lines: {}",
        format_with_commas(store.report().skipped)
    );
    if cli.image_index.is_some() {
        println!("eligible products: {}", format_with_commas(stats.eligible));
    }
    println!();
    print_distribution(
        &format!("product types (top {})", cli.top),
        &stats.product_types,
        Some(cli.top),
    );
    println!("unique brands: {}", format_with_commas(stats.unique_brands));
    print_distribution(&format!("brands (top {})", cli.top), &stats.brands, Some(cli.top));
    print_distribution("countries", &stats.countries, None);
    print_distribution("marketplaces", &stats.marketplaces, None);
    print_distribution("completeness", &stats.completeness, None);
    print_distribution(
        &format!("languages (top {})", cli.top),
        &stats.languages,
        Some(cli.top),
    );
    println!("[IMAGES]");
    println!(
        "  with main image: {} ({:.1}%)",
        format_with_commas(stats.with_main_image),
        percent(stats.with_main_image, stats.total)
    );
    println!(
        "  with additional images: {} ({:.1}%)",
        format_with_commas(stats.with_other_images),
        percent(stats.with_other_images, stats.total)
    );
    println!("  average images per product: {:.2}", stats.average_images);
    println!();

    fs::create_dir_all(&cli.output_dir)?;
    let outputs: [(&str, [&str; 2], &[CountShare]); 3] = [
        (
            PRODUCT_TYPES_CSV,
            ["Product Type", "Count"],
            stats.product_types.as_slice(),
        ),
        (BRANDS_CSV, ["Brand", "Count"], stats.brands.as_slice()),
        (COUNTRIES_CSV, ["Country", "Count"], stats.countries.as_slice()),
    ];
    for (file_name, header, rows) in outputs {
        let path = cli.output_dir.join(file_name);
        write_count_csv(&path, header, rows)?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

/// Sample, partition and materialize a new set of batches.
pub fn run_build_batches<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<BuildBatchesCli, _>(
        std::iter::once("build_batches".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let sampling = SamplingConfig::default()
        .with_seed(cli.seed)
        .with_target(cli.target)
        .with_category_bounds(cli.min_per_category, cli.max_per_category);
    let placement = if cli.hard_link {
        PlacementMode::HardLink
    } else {
        PlacementMode::Copy
    };
    let mut config = BatchConfig::new(cli.listings, cli.image_index, cli.image_root, cli.output_root)
        .with_batch_count(cli.batches)
        .with_sampling(sampling)
        .with_exclude_metadata(cli.exclude_metadata)
        .with_exclude_existing(cli.exclude_existing)
        .with_placement(placement)
        .with_allow_shortfall(cli.allow_shortfall);
    if let Some(number) = cli.first_batch {
        config = config.with_first_batch_number(number);
    }
    let pipeline = BatchPipeline::new(config);

    if cli.dry_run {
        let plan = pipeline.plan()?;
        println!("=== batch plan (dry run) ===");
        println!("eligible after exclusion: {}", format_with_commas(plan.eligible));
        println!("excluded image ids: {}", format_with_commas(plan.excluded));
        println!("selected: {}", format_with_commas(plan.sample.len()));
        for (number, skew) in plan.group_skew() {
            print_skew_line(&batch_label(pipeline.config().output_root.as_path(), number), &skew);
        }
        return Ok(());
    }

    let summary = pipeline.run()?;
    print_pipeline_summary(&summary);
    Ok(())
}

/// Rewrite metadata files for existing batch directories.
pub fn run_rebuild_metadata<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<RebuildMetadataCli, _>(
        std::iter::once("rebuild_metadata".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let images = ImageIndex::load(&cli.image_index)?;
    let store = ListingStore::load(&cli.listings, &images)?;
    let targets: Vec<(BatchNumber, PathBuf)> = if cli.batches.is_empty() {
        discover_batch_dirs(&cli.output_root)?
    } else {
        cli.batches
            .iter()
            .map(|number| (*number, batch_dir_path(&cli.output_root, *number)))
            .collect()
    };
    if targets.is_empty() {
        println!(
            "No batch directories found under {}.",
            cli.output_root.display()
        );
        return Ok(());
    }

    for (number, dir) in targets {
        if !dir.is_dir() {
            eprintln!("batch {number}: directory {} not found", dir.display());
            continue;
        }
        let entries = rebuild_group_metadata(&dir, &store, &images)?;
        let path = batch_metadata_path(&cli.output_root, number);
        write_batch_metadata(&path, &entries)?;
        println!(
            "batch {number}: {} entries -> {}",
            format_with_commas(entries.len()),
            path.display()
        );
    }
    Ok(())
}

fn print_pipeline_summary(summary: &PipelineSummary) {
    println!("=== batch run ===");
    println!("[LISTINGS]");
    println!("  lines read: {}", format_with_commas(summary.load.lines));
    println!("  parsed: {}", format_with_commas(summary.load.parsed));
    println!("  skipped: {}", format_with_commas(summary.load.skipped));
    println!(
        "  without main image: {}",
        format_with_commas(summary.load.missing_image)
    );
    println!(
        "  image not indexed: {}",
        format_with_commas(summary.load.unresolved_image)
    );
    println!(
        "  excluded image ids: {}",
        format_with_commas(summary.excluded)
    );
    println!(
        "  eligible after exclusion: {}",
        format_with_commas(summary.eligible)
    );
    println!();

    println!("[SAMPLING]");
    println!(
        "  floor: {}  proportional: {}  top-up: {}  truncated: {}",
        format_with_commas(summary.sampling.floor_total()),
        format_with_commas(summary.sampling.proportional_total()),
        format_with_commas(summary.sampling.top_up_total()),
        format_with_commas(summary.sampling.truncated)
    );
    println!("  selected: {}", format_with_commas(summary.selected));
    if let Some(skew) = &summary.selection_skew {
        print_skew_line("  selection", skew);
        for entry in skew.per_category.iter().take(DEFAULT_TOP_N) {
            println!(
                "    {}: {} ({:.1}%)",
                entry.label,
                entry.count,
                entry.share * 100.0
            );
        }
    }
    println!();

    println!("[BATCHES]");
    for batch in &summary.batches {
        println!(
            "  batch {}: {} entries, {} unresolved, {} failed -> {}",
            batch.number,
            format_with_commas(batch.entries),
            batch.unresolved,
            batch.failed,
            batch.metadata_path.display()
        );
    }
    for (number, skew) in &summary.batch_skew {
        print_skew_line(&format!("  batch {number}"), skew);
    }
}

fn print_distribution(label: &str, rows: &[CountShare], limit: Option<usize>) {
    println!("[{}]", label.to_uppercase());
    if rows.is_empty() {
        println!("  (none)");
    }
    for row in rows.iter().take(limit.unwrap_or(rows.len())) {
        println!(
            "  {}: {} ({:.1}%)",
            row.label,
            format_with_commas(row.count),
            row.share * 100.0
        );
    }
    println!();
}

fn print_skew_line(label: &str, skew: &CategorySkew) {
    println!(
        "{}: categories={} total={} min={} max={} mean={:.2} ratio={:.2}",
        label, skew.categories, skew.total, skew.min, skew.max, skew.mean, skew.ratio
    );
}

fn batch_label(output_root: &Path, number: BatchNumber) -> String {
    format!("  {}", batch_dir_path(output_root, number).display())
}

fn percent(count: usize, total: usize) -> f64 {
    crate::utils::share(count, total) * 100.0
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{}' as a positive integer", raw))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_usize_rejects_zero_and_garbage() {
        assert_eq!(parse_positive_usize("4"), Ok(4));
        assert!(parse_positive_usize("0").is_err());
        assert!(parse_positive_usize("four").is_err());
    }

    #[test]
    fn build_batches_cli_uses_documented_defaults() {
        let cli = BuildBatchesCli::try_parse_from([
            "build_batches",
            "--listings",
            "a.json",
            "--listings",
            "b.json",
            "--image-index",
            "images.csv",
            "--image-root",
            "images/small",
            "--output-root",
            "out",
        ])
        .unwrap();
        assert_eq!(cli.listings.len(), 2);
        assert_eq!(cli.batches, 4);
        assert_eq!(cli.target, 20_000);
        assert_eq!(cli.min_per_category, 5);
        assert_eq!(cli.max_per_category, 200);
        assert_eq!(cli.seed, 42);
        assert!(!cli.exclude_existing && !cli.hard_link && !cli.dry_run);
        assert_eq!(cli.first_batch, None);
    }

    #[test]
    fn build_batches_cli_rejects_zero_batches() {
        let err = BuildBatchesCli::try_parse_from([
            "build_batches",
            "--listings",
            "a.json",
            "--image-index",
            "images.csv",
            "--image-root",
            "images",
            "--output-root",
            "out",
            "--batches",
            "0",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn help_is_not_an_error() {
        let parsed = parse_cli::<CombineListingsCli, _>(["combine_listings", "--help"]).unwrap();
        assert!(parsed.is_none());
    }
}
