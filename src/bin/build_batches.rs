use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    listing_batches::apps::run_build_batches(std::env::args().skip(1))
}
