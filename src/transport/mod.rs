/// Local filesystem transport: shard discovery, image placement, atomic writes.
pub mod fs;
