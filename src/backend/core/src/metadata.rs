//! Reversible escaping of property-map keys for storage compatibility.
//!
//! Document backends reject map keys containing `.` and keys starting
//! with `$`. Escaped keys are what lands in storage; the rest of the
//! platform keeps using keys like `forms.id` or `$ref` unchanged.
//!
//! The replacement tokens are a stable wire format: changing them
//! invalidates every previously persisted key.

use std::collections::HashMap;

/// Token substituted for every `.` in a key.
pub const DOT_REPLACEMENT: &str = "__dot__";

/// Prefix substituted for a leading `$` in a key.
pub const DOLLAR_REPLACEMENT_PREFIX: &str = "__dollar__";

/// Escape a single key for storage.
pub fn escape_key(key: &str) -> String {
    let out = key.replace('.', DOT_REPLACEMENT);
    match out.strip_prefix('$') {
        Some(rest) => format!("{}{}", DOLLAR_REPLACEMENT_PREFIX, rest),
        None => out,
    }
}

/// Exact inverse of [`escape_key`].
///
/// The leading-`$` prefix is restored first, then every dot token; the
/// reverse order would corrupt keys whose escaped form starts with the
/// dollar prefix.
pub fn unescape_key(key: &str) -> String {
    let out = match key.strip_prefix(DOLLAR_REPLACEMENT_PREFIX) {
        Some(rest) => format!("${}", rest),
        None => key.to_string(),
    };
    out.replace(DOT_REPLACEMENT, ".")
}

/// Escape every key of `map` for storage.
///
/// `None` and empty maps pass through unchanged. Keys that already
/// contain a replacement token verbatim will not round-trip; that
/// ambiguity is accepted.
pub fn escape_keys(map: Option<HashMap<String, String>>) -> Option<HashMap<String, String>> {
    let map = map?;
    if map.is_empty() {
        return Some(map);
    }

    Some(
        map.into_iter()
            .map(|(key, value)| (escape_key(&key), value))
            .collect(),
    )
}

/// Exact inverse of [`escape_keys`].
pub fn unescape_keys(map: Option<HashMap<String, String>>) -> Option<HashMap<String, String>> {
    let map = map?;
    if map.is_empty() {
        return Some(map);
    }

    Some(
        map.into_iter()
            .map(|(key, value)| (unescape_key(&key), value))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_none_passes_through() {
        assert_eq!(escape_keys(None), None);
        assert_eq!(unescape_keys(None), None);
    }

    #[test]
    fn test_empty_map_passes_through() {
        assert_eq!(escape_keys(Some(HashMap::new())), Some(HashMap::new()));
        assert_eq!(unescape_keys(Some(HashMap::new())), Some(HashMap::new()));
    }

    #[test]
    fn test_dots_are_replaced() {
        let escaped = escape_keys(Some(map(&[("forms.answer.id", "42")]))).unwrap();
        assert_eq!(escaped.get("forms__dot__answer__dot__id"), Some(&"42".to_string()));
    }

    #[test]
    fn test_leading_dollar_is_replaced() {
        let escaped = escape_keys(Some(map(&[("$ref", "x")]))).unwrap();
        assert_eq!(escaped.get("__dollar__ref"), Some(&"x".to_string()));
    }

    #[test]
    fn test_interior_dollar_is_untouched() {
        let escaped = escape_keys(Some(map(&[("price$usd", "3")]))).unwrap();
        assert_eq!(escaped.get("price$usd"), Some(&"3".to_string()));
    }

    #[test]
    fn test_dollar_then_dot_combination() {
        let escaped = escape_keys(Some(map(&[("$a.b", "v")]))).unwrap();
        assert_eq!(escaped.get("__dollar__a__dot__b"), Some(&"v".to_string()));
    }

    #[test]
    fn test_round_trip() {
        let original = map(&[
            ("plain", "1"),
            ("forms.id", "2"),
            ("$ref", "3"),
            ("$a.b.c", "4"),
            ("price$usd", "5"),
        ]);

        let restored = unescape_keys(escape_keys(Some(original.clone()))).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_values_are_never_touched() {
        let escaped = escape_keys(Some(map(&[("key", "a.b$c")]))).unwrap();
        assert_eq!(escaped.get("key"), Some(&"a.b$c".to_string()));
    }
}
