use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use crate::types::{CategoryId, ImageId, LanguageTag, RecordId};

/// One entry of a multi-valued, locale-tagged listing attribute.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizedValue {
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_tag: Option<LanguageTag>,
}

impl LocalizedValue {
    /// Build an entry with an optional locale tag.
    pub fn new(value: impl Into<String>, language_tag: Option<&str>) -> Self {
        Self {
            value: value.into(),
            language_tag: language_tag.map(str::to_string),
        }
    }
}

/// A value with a unit (`item_weight`, one axis of `item_dimensions`).
///
/// `value` is kept as raw JSON so numbers and strings both pass through to
/// batch metadata unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Accepts either a single object or a list of them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    // Listed first: structs also deserialize from sequences.
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    /// The single value, or the first of many.
    pub fn first(&self) -> Option<&T> {
        match self {
            OneOrMany::Many(values) => values.first(),
            OneOrMany::One(value) => Some(value),
        }
    }
}

/// Per-axis product dimensions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemDimensions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<Measurement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<Measurement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<Measurement>,
}

impl ItemDimensions {
    /// Axes in canonical order, paired with their names.
    pub fn axes(&self) -> [(&'static str, Option<&Measurement>); 3] {
        [
            ("height", self.height.as_ref()),
            ("width", self.width.as_ref()),
            ("length", self.length.as_ref()),
        ]
    }
}

/// One product listing as it appears on a line of the listing source.
///
/// Every attribute is optional; unknown attributes are ignored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Listing {
    pub item_id: Option<String>,
    pub main_image_id: Option<ImageId>,
    pub other_image_id: Vec<ImageId>,
    pub country: Option<String>,
    pub marketplace: Option<String>,
    pub brand: Vec<LocalizedValue>,
    pub item_name: Vec<LocalizedValue>,
    pub color: Vec<LocalizedValue>,
    pub product_type: Vec<LocalizedValue>,
    pub bullet_point: Vec<LocalizedValue>,
    pub style: Vec<LocalizedValue>,
    pub material: Vec<LocalizedValue>,
    pub item_weight: Option<OneOrMany<Measurement>>,
    pub item_dimensions: Option<ItemDimensions>,
}

impl Listing {
    /// Non-empty main image id, if any.
    pub fn main_image(&self) -> Option<&str> {
        self.main_image_id
            .as_deref()
            .filter(|image_id| !image_id.is_empty())
    }
}

/// A loaded product: listing payload plus the fields sampling needs.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductRecord {
    /// Stable record identifier.
    pub id: RecordId,
    /// Derived category label (may be `Unknown`).
    pub category: CategoryId,
    /// Main image id, present only when it resolves in the images index.
    pub image_id: Option<ImageId>,
    /// Parsed listing attributes.
    pub listing: Listing,
}

impl ProductRecord {
    /// True when the record can be sampled into image batches.
    pub fn is_eligible(&self) -> bool {
        self.image_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_parses_abo_shaped_line() {
        let line = r#"{
            "item_id": "B06X9STHNG",
            "main_image_id": "81iZlv3bjpL",
            "other_image_id": ["61vE4Vc2IzL", "71t4JzY1a7L"],
            "country": "US",
            "marketplace": "Amazon",
            "domain_name": "amazon.com",
            "brand": [{"language_tag": "en_US", "value": "AmazonBasics"}],
            "product_type": [{"value": "CELLULAR_PHONE_CASE"}],
            "item_weight": [{"normalized_value": {"unit": "pounds", "value": 0.1}, "unit": "pounds", "value": 0.1}],
            "item_dimensions": {"height": {"unit": "inches", "value": 6.2}}
        }"#;
        let listing: Listing = serde_json::from_str(line).unwrap();
        assert_eq!(listing.item_id.as_deref(), Some("B06X9STHNG"));
        assert_eq!(listing.main_image(), Some("81iZlv3bjpL"));
        assert_eq!(listing.other_image_id.len(), 2);
        assert_eq!(listing.brand[0].language_tag.as_deref(), Some("en_US"));
        assert_eq!(listing.product_type[0].value, "CELLULAR_PHONE_CASE");

        let weight = listing.item_weight.as_ref().and_then(OneOrMany::first).unwrap();
        assert_eq!(weight.unit.as_deref(), Some("pounds"));
        assert_eq!(weight.value, Some(serde_json::json!(0.1)));

        let dims = listing.item_dimensions.unwrap();
        assert!(dims.height.is_some());
        assert!(dims.width.is_none());
    }

    #[test]
    fn item_weight_accepts_single_object() {
        let listing: Listing =
            serde_json::from_str(r#"{"item_weight": {"value": 2, "unit": "kilograms"}}"#).unwrap();
        let weight = listing.item_weight.as_ref().and_then(OneOrMany::first).unwrap();
        assert_eq!(weight.value, Some(serde_json::json!(2)));
        assert_eq!(weight.unit.as_deref(), Some("kilograms"));
    }

    #[test]
    fn empty_object_is_a_valid_listing() {
        let listing: Listing = serde_json::from_str("{}").unwrap();
        assert_eq!(listing, Listing::default());
        assert_eq!(listing.main_image(), None);
    }

    #[test]
    fn empty_main_image_id_is_treated_as_missing() {
        let listing: Listing = serde_json::from_str(r#"{"main_image_id": ""}"#).unwrap();
        assert_eq!(listing.main_image(), None);
    }
}
