/// Unique record identifier (stable across runs).
/// Examples: `B07HCR1LSQ`, `listings_0:17`
pub type RecordId = String;
/// Identifier of an image in the images index.
/// Example: `81iZlv3bjpL`
pub type ImageId = String;
/// Derived category label used to balance samples.
/// Examples: `SHOES`, `CELLULAR_PHONE_CASE`, `Unknown`
pub type CategoryId = String;
/// Position of a record inside a `ListingStore`.
///
/// Sampling and partitioning track records by this position, never by value
/// equality, so two listings with identical content stay distinct.
pub type RecordIdx = usize;
/// BCP-47 style locale tag attached to listing values.
/// Examples: `en_US`, `de_DE`
pub type LanguageTag = String;
/// Path strings stored in indexes and metadata.
/// Example: `8c/8ccb5859.jpg`
pub type PathString = String;
/// One-based batch number used for output directory and metadata naming.
/// Example: `5` for `batch5/` and `batch5_metadata.json`
pub type BatchNumber = u32;
