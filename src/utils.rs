//! Helpers over multi-valued, locale-tagged listing attributes.

use crate::data::LocalizedValue;

/// First entry of an attribute list, if its value is non-empty.
pub fn first_entry(values: &[LocalizedValue]) -> Option<&LocalizedValue> {
    values.first().filter(|entry| !entry.value.is_empty())
}

/// Value of the first entry of an attribute list.
///
/// An empty list and an empty first value both yield `None`.
pub fn first_value(values: &[LocalizedValue]) -> Option<&str> {
    first_entry(values).map(|entry| entry.value.as_str())
}

/// All non-empty values of an attribute list, in order.
pub fn all_values(values: &[LocalizedValue]) -> Vec<String> {
    values
        .iter()
        .filter(|entry| !entry.value.is_empty())
        .map(|entry| entry.value.clone())
        .collect()
}

/// Format `value` with thousands separators (`20000` -> `20,000`).
pub fn format_with_commas(value: usize) -> String {
    let raw = value.to_string();
    let mut grouped_reversed = String::with_capacity(raw.len() + (raw.len() / 3));
    for (idx, ch) in raw.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            grouped_reversed.push(',');
        }
        grouped_reversed.push(ch);
    }
    grouped_reversed.chars().rev().collect()
}

/// `count / total` as a fraction, `0.0` for an empty total.
pub fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}
