//! UTF-8 sanitization.
//!
//! Everything handed back to a caller goes through here. Valid text is never
//! modified, so sanitizing twice is the same as sanitizing once.

use std::borrow::Cow;

use serde_json::{Map, Value};

/// Turn arbitrary bytes into valid UTF-8.
///
/// Valid input is borrowed unchanged. Otherwise every valid scalar value is
/// kept and invalid byte sequences are dropped. If that leaves nothing, the
/// ASCII bytes of the input are retained instead.
pub fn sanitize_bytes(bytes: &[u8]) -> Cow<'_, str> {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }

    if out.is_empty() && !bytes.is_empty() {
        out = bytes
            .iter()
            .filter(|b| b.is_ascii())
            .map(|&b| b as char)
            .collect();
    }

    Cow::Owned(out)
}

/// Sanitize a string slice.
///
/// A `&str` is valid UTF-8 by construction, so this is the identity; it exists
/// so that every public boundary reads the same.
pub fn sanitize_str(s: &str) -> Cow<'_, str> {
    Cow::Borrowed(s)
}

/// Recursively sanitize every string and map key inside a producer value.
///
/// Non-string leaves (numbers, booleans, null) are left untouched.
pub fn sanitize_deep(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(&s).into_owned()),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_deep).collect()),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(sanitize_str(&k).into_owned(), sanitize_deep(v));
            }
            Value::Object(out)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_valid_utf8_is_borrowed() {
        let input = "Accès à mes comptes".as_bytes();
        assert!(matches!(sanitize_bytes(input), Cow::Borrowed(_)));
        assert_eq!(sanitize_bytes(input), "Accès à mes comptes");
    }

    #[test]
    fn test_invalid_bytes_are_dropped() {
        assert_eq!(sanitize_bytes(b"caf\xE9 ok"), "caf ok");
        assert_eq!(sanitize_bytes(b"\xF0\x9F\x98"), "");
        assert_eq!(sanitize_bytes(b"a\xFFb\xC3\xA9"), "abé");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(sanitize_bytes(b""), "");
    }

    #[test]
    fn test_sanitize_deep_keeps_structure() {
        let value = json!({
            "subject": "Hello",
            "parts": [{"size": 12, "inline": true, "name": "a.txt"}, null],
        });
        assert_eq!(sanitize_deep(value.clone()), value);
    }

    proptest! {
        #[test]
        fn prop_valid_strings_unchanged(s in ".*") {
            prop_assert_eq!(sanitize_bytes(s.as_bytes()), s.as_str());
        }

        #[test]
        fn prop_output_valid_and_idempotent(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let once = sanitize_bytes(&bytes).into_owned();
            let twice = sanitize_bytes(once.as_bytes()).into_owned();
            prop_assert!(std::str::from_utf8(once.as_bytes()).is_ok());
            prop_assert_eq!(once, twice);
        }
    }
}
