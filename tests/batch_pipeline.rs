use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

use listing_batches::materialize::rebuild_group_metadata;
use listing_batches::metadata::{
    BatchMetadataEntry, batch_dir_path, batch_metadata_path, discover_batch_metadata,
    read_batch_metadata,
};
use listing_batches::{
    BatchConfig, BatchError, BatchPipeline, ImageIndex, ListingStore, PlacementMode,
    SamplingConfig, combine_listing_files,
};

const CATEGORIES: [(&str, usize); 4] = [("SOFA", 16), ("LAMP", 12), ("RUG", 8), ("MUG", 4)];

struct Dataset {
    _temp: TempDir,
    root: PathBuf,
    listings: PathBuf,
    images_csv: PathBuf,
    image_root: PathBuf,
    output_root: PathBuf,
}

/// 40 eligible listings split into two shards, plus noise the loader must tolerate.
fn dataset() -> Dataset {
    let temp = tempdir().unwrap();
    let root = temp.path().to_path_buf();
    let image_root = root.join("images").join("small");
    let shards = root.join("listings");
    fs::create_dir_all(&shards).unwrap();

    let mut csv = String::from("image_id,height,width,path\n");
    let mut lines = Vec::new();
    for (category, size) in CATEGORIES {
        for n in 0..size {
            let image_id = format!("{category}{n:03}");
            let relative = format!("{}/{image_id}.jpg", &category[..2].to_lowercase());
            fs::create_dir_all(image_root.join(&relative).parent().unwrap()).unwrap();
            fs::write(image_root.join(&relative), image_id.as_bytes()).unwrap();
            csv.push_str(&format!("{image_id},256,256,{relative}\n"));
            lines.push(format!(
                concat!(
                    r#"{{"item_id": "{category}-{n}", "main_image_id": "{image_id}", "#,
                    r#""country": "US", "product_type": [{{"value": "{category}"}}], "#,
                    r#""brand": [{{"value": "Brand{n}", "language_tag": "en_US"}}], "#,
                    r#""bullet_point": [{{"value": "first"}}, {{"value": "second"}}], "#,
                    r#""item_weight": [{{"value": {n}.5, "unit": "pounds"}}]}}"#
                ),
                category = category,
                n = n,
                image_id = image_id,
            ));
        }
    }
    lines.push(r#"{"item_id": "ghost-1", "main_image_id": "not-indexed", "product_type": [{"value": "SOFA"}]}"#.to_string());
    lines.push(r#"{"item_id": "ghost-2", "product_type": [{"value": "LAMP"}]}"#.to_string());
    lines.push("{truncated".to_string());

    let (first, second) = lines.split_at(lines.len() / 2);
    fs::write(shards.join("listings_0.json"), first.join("\n")).unwrap();
    fs::write(shards.join("listings_1.json"), second.join("\n")).unwrap();

    let images_csv = root.join("images.csv");
    fs::write(&images_csv, csv).unwrap();

    let listings = root.join("combined_listings.json");
    let report = combine_listing_files(&shards, &listings).unwrap();
    assert_eq!(report.shards, 2);
    assert_eq!(report.written, 42);
    assert_eq!(report.skipped, 1);

    Dataset {
        output_root: root.join("dataset-batches"),
        _temp: temp,
        root,
        listings,
        images_csv,
        image_root,
    }
}

fn config(data: &Dataset, target: usize) -> BatchConfig {
    BatchConfig::new(
        vec![data.listings.clone()],
        &data.images_csv,
        &data.image_root,
        &data.output_root,
    )
    .with_sampling(
        SamplingConfig::default()
            .with_seed(7)
            .with_target(target)
            .with_category_bounds(2, 8),
    )
    .with_batch_count(4)
    .with_exclude_existing(true)
}

fn image_ids(path: &Path) -> Vec<String> {
    read_batch_metadata(path)
        .unwrap()
        .into_iter()
        .map(|entry| entry.image_id)
        .collect()
}

#[test]
fn first_run_writes_numbered_batches_with_metadata() {
    let data = dataset();
    let summary = BatchPipeline::new(config(&data, 20)).run().unwrap();

    assert_eq!(summary.load.parsed, 42);
    assert_eq!(summary.load.unresolved_image, 1);
    assert_eq!(summary.load.missing_image, 1);
    assert_eq!(summary.eligible, 40);
    assert_eq!(summary.excluded, 0);
    assert_eq!(summary.selected, 20);

    let numbers: Vec<u32> = summary.batches.iter().map(|batch| batch.number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(
        summary.batches.iter().map(|batch| batch.entries).sum::<usize>(),
        20
    );
    assert_eq!(summary.batch_skew.len(), 4);

    let sizes: Vec<usize> = summary.batches.iter().map(|batch| batch.entries).collect();
    let min = *sizes.iter().min().unwrap();
    let max = *sizes.iter().max().unwrap();
    assert!(max - min <= summary.sampling.per_category.len());

    let store = ListingStore::load(
        &[data.listings.clone()],
        &ImageIndex::load(&data.images_csv).unwrap(),
    )
    .unwrap();
    let images = ImageIndex::load(&data.images_csv).unwrap();
    for batch in &summary.batches {
        assert_eq!(batch.directory, batch_dir_path(&data.output_root, batch.number));
        assert_eq!(
            batch.metadata_path,
            batch_metadata_path(&data.output_root, batch.number)
        );
        let entries = read_batch_metadata(&batch.metadata_path).unwrap();
        for entry in &entries {
            let local = batch.directory.join(&entry.local_path);
            assert_eq!(fs::read(&local).unwrap(), entry.image_id.as_bytes());
            assert_eq!(images.resolve(&entry.image_id), Some(entry.image_path.as_str()));
            assert_eq!(entry.features.as_ref().map(Vec::len), Some(2));
            assert_eq!(entry.weight_unit.as_deref(), Some("pounds"));
            assert_eq!(entry.brand_language.as_deref(), Some("en_US"));
        }

        let mut rebuilt = rebuild_group_metadata(&batch.directory, &store, &images).unwrap();
        let mut written = entries;
        let by_image = |a: &BatchMetadataEntry, b: &BatchMetadataEntry| a.image_id.cmp(&b.image_id);
        rebuilt.sort_by(by_image);
        written.sort_by(by_image);
        assert_eq!(rebuilt, written);
    }
}

#[test]
fn second_run_continues_numbering_and_skips_used_images() {
    let data = dataset();
    BatchPipeline::new(config(&data, 20)).run().unwrap();
    let second = BatchPipeline::new(config(&data, 20)).run().unwrap();

    assert_eq!(second.excluded, 20);
    assert_eq!(second.eligible, 20);
    let numbers: Vec<u32> = second.batches.iter().map(|batch| batch.number).collect();
    assert_eq!(numbers, vec![5, 6, 7, 8]);

    let discovered = discover_batch_metadata(&data.output_root).unwrap();
    assert_eq!(discovered.len(), 8);

    let mut seen = HashSet::new();
    for (_, path) in &discovered {
        for image_id in image_ids(path) {
            assert!(seen.insert(image_id.clone()), "{image_id} emitted twice");
        }
    }
    assert_eq!(seen.len(), 40);
}

#[test]
fn target_above_eligible_fails_before_writing() {
    let data = dataset();
    let err = BatchPipeline::new(config(&data, 41)).run().unwrap_err();
    assert!(matches!(
        err,
        BatchError::Configuration(ref msg) if msg.contains("exceeds")
    ));
    assert!(!data.output_root.exists());

    let summary = BatchPipeline::new(config(&data, 41).with_allow_shortfall(true))
        .run()
        .unwrap();
    assert_eq!(summary.selected, 40);
}

#[test]
fn invalid_configuration_fails_before_loading() {
    let data = dataset();
    let err = BatchPipeline::new(config(&data, 10).with_batch_count(0))
        .run()
        .unwrap_err();
    assert!(matches!(err, BatchError::Configuration(_)));
    assert!(!data.output_root.exists());

    let mut missing = config(&data, 10);
    missing.listing_sources = vec![data.root.join("absent.json")];
    let err = BatchPipeline::new(missing).run().unwrap_err();
    assert!(matches!(err, BatchError::SourceUnavailable { .. }));
}

#[test]
fn explicit_exclusions_and_first_batch_number_are_honored() {
    let data = dataset();
    let first = BatchPipeline::new(config(&data, 8).with_batch_count(2))
        .run()
        .unwrap();
    let used: HashSet<String> = first
        .batches
        .iter()
        .flat_map(|batch| image_ids(&batch.metadata_path))
        .collect();
    assert_eq!(used.len(), 8);

    let explicit = config(&data, 8)
        .with_batch_count(2)
        .with_exclude_existing(false)
        .with_exclude_metadata(vec![
            batch_metadata_path(&data.output_root, 1),
            batch_metadata_path(&data.output_root, 2),
            data.root.join("never-written_metadata.json"),
        ])
        .with_first_batch_number(20)
        .with_placement(PlacementMode::HardLink);
    let second = BatchPipeline::new(explicit).run().unwrap();
    assert_eq!(second.excluded, 8);
    assert_eq!(
        second.batches.iter().map(|batch| batch.number).collect::<Vec<_>>(),
        vec![20, 21]
    );
    for batch in &second.batches {
        for image_id in image_ids(&batch.metadata_path) {
            assert!(!used.contains(&image_id));
        }
    }
}

#[test]
fn explicit_numbers_over_existing_batches_are_rejected() {
    let data = dataset();
    BatchPipeline::new(config(&data, 4).with_batch_count(1))
        .run()
        .unwrap();
    let metadata = batch_metadata_path(&data.output_root, 1);
    let before = fs::read(&metadata).unwrap();
    let files_before = fs::read_dir(batch_dir_path(&data.output_root, 1))
        .unwrap()
        .count();

    let err = BatchPipeline::new(
        config(&data, 4)
            .with_batch_count(1)
            .with_first_batch_number(1),
    )
    .run()
    .unwrap_err();
    assert!(matches!(
        err,
        BatchError::Configuration(ref msg) if msg.contains("batch1 already exists")
    ));
    assert_eq!(fs::read(&metadata).unwrap(), before);
    assert_eq!(
        fs::read_dir(batch_dir_path(&data.output_root, 1))
            .unwrap()
            .count(),
        files_before
    );

    fs::create_dir_all(batch_dir_path(&data.output_root, 3)).unwrap();
    let err = BatchPipeline::new(
        config(&data, 4)
            .with_batch_count(2)
            .with_first_batch_number(2),
    )
    .plan()
    .unwrap_err();
    assert!(matches!(
        err,
        BatchError::Configuration(ref msg) if msg.contains("batch3 already exists")
    ));
    assert!(!batch_dir_path(&data.output_root, 2).exists());
}

#[test]
fn batch_directory_without_metadata_still_advances_numbering() {
    let data = dataset();
    fs::create_dir_all(batch_dir_path(&data.output_root, 3)).unwrap();

    let plan = BatchPipeline::new(config(&data, 8)).plan().unwrap();
    assert_eq!(plan.first_batch_number, 4);

    let summary = BatchPipeline::new(config(&data, 8)).run().unwrap();
    assert_eq!(summary.batches.first().map(|batch| batch.number), Some(4));
    assert!(summary.batches.iter().all(|batch| batch.number >= 4));
    assert_eq!(
        fs::read_dir(batch_dir_path(&data.output_root, 3))
            .unwrap()
            .count(),
        0
    );
}

#[test]
fn batch_numbers_past_the_maximum_are_rejected() {
    let data = dataset();
    let err = BatchPipeline::new(config(&data, 8).with_first_batch_number(u32::MAX))
        .plan()
        .unwrap_err();
    assert!(matches!(err, BatchError::Configuration(_)));

    fs::create_dir_all(&data.output_root).unwrap();
    fs::write(batch_metadata_path(&data.output_root, u32::MAX), "[]").unwrap();
    let err = BatchPipeline::new(config(&data, 8)).plan().unwrap_err();
    assert!(matches!(err, BatchError::Configuration(_)));
}

#[test]
fn same_seed_reproduces_the_same_batches() {
    let first = dataset();
    let second = dataset();
    BatchPipeline::new(config(&first, 16)).run().unwrap();
    BatchPipeline::new(config(&second, 16)).run().unwrap();
    for number in 1..=4 {
        assert_eq!(
            image_ids(&batch_metadata_path(&first.output_root, number)),
            image_ids(&batch_metadata_path(&second.output_root, number))
        );
    }
}

#[test]
fn dry_run_plan_writes_nothing() {
    let data = dataset();
    let plan = BatchPipeline::new(config(&data, 12)).plan().unwrap();
    assert_eq!(plan.sample.len(), 12);
    assert_eq!(plan.groups.len(), 4);
    assert_eq!(plan.first_batch_number, 1);
    let skew = plan.group_skew();
    assert_eq!(skew.first().map(|(number, _)| *number), Some(1));
    assert_eq!(skew.iter().map(|(_, skew)| skew.total).sum::<usize>(), 12);
    assert!(!data.output_root.exists());
}
