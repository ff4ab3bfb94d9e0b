use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    listing_batches::apps::run_rebuild_metadata(std::env::args().skip(1))
}
