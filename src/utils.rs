/// Rounds to `places` decimals. Negative zero is folded to `0.0`.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Scan in order and return the first item the predicate maps to `Some`.
///
/// Every first-match-wins rule in the crate (header lookup, month role
/// classification, data start probing) goes through here so they share one
/// tie-break order.
pub fn first_match<I, T, F>(items: I, predicate: F) -> Option<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Option<T>,
{
    items.into_iter().find_map(predicate)
}

/// True when any keyword is a substring of the already-lowercased `text`.
pub fn contains_any(text: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .any(|k| !k.is_empty() && text.contains(&k))
}
