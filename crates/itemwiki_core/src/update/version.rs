//! Dotted version comparison.

use std::cmp::Ordering;

/// Compares dotted versions component by component.
///
/// Each component orders by its leading digits numerically, then by any
/// remaining suffix. A component without a suffix ranks above one with a
/// suffix, so `2.1.0 > 2.1.0-rc1`; two suffixes compare as text. Missing
/// trailing components count as `0`, and a leading `v` is ignored, so
/// `v2.10 > 2.9.0` and `2.0 == 2.0.0`.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let left = components(left);
    let right = components(right);
    let len = left.len().max(right.len());

    for index in 0..len {
        let (a_number, a_suffix) = left.get(index).copied().unwrap_or(("", ""));
        let (b_number, b_suffix) = right.get(index).copied().unwrap_or(("", ""));
        let ordering =
            compare_numbers(a_number, b_number).then_with(|| compare_suffixes(a_suffix, b_suffix));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Whether `candidate` is strictly newer than `current`.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare_versions(candidate, current) == Ordering::Greater
}

/// Digit strings without leading zeros: longer is larger, equal lengths
/// compare by text. No component can overflow.
fn compare_numbers(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_suffixes(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.cmp(b),
    }
}

/// Splits into `(digits, suffix)` pairs; digits have leading zeros removed.
fn components(version: &str) -> Vec<(&str, &str)> {
    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix(['v', 'V'])
        .unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Vec::new();
    }

    trimmed
        .split('.')
        .map(|part| {
            let digits = part.len() - part.trim_start_matches(|c: char| c.is_ascii_digit()).len();
            let (number, suffix) = part.split_at(digits);
            (number.trim_start_matches('0'), suffix)
        })
        .collect()
}
