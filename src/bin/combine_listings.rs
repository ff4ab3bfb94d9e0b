use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    listing_batches::apps::run_combine_listings(std::env::args().skip(1))
}
