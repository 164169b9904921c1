/// Megabytes per unit, decimal
const UNITS: &[(&str, f64)] = &[
    ("B", 1e-6),
    ("KB", 1e-3),
    ("MB", 1.0),
    ("GB", 1e3),
    ("TB", 1e6),
];

/// Convert a human size string like `"8GB"` or `"500 MB"` to megabytes.
///
/// Units are decimal and case-insensitive. A bare number is read as
/// gigabytes. Returns `None` for an unknown unit or a malformed number.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn megabyte_int_from_size_string(size: &str) -> Option<u64> {
    let size = size.trim();
    let split = size
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(size.len());
    let (number, unit) = size.split_at(split);

    let value: f64 = number.parse().ok()?;
    let unit = unit.trim().to_uppercase();
    let multiplier = if unit.is_empty() {
        1e3
    } else {
        UNITS.iter().find(|(name, _)| *name == unit)?.1
    };

    let megabytes = (value * multiplier).round();
    if !megabytes.is_finite() || megabytes < 0.0 {
        return None;
    }
    Some(megabytes as u64)
}
