//! Charset conversion to UTF-8 with a deterministic fallback chain.
//!
//! Declared charset → Latin-1 → sanitized. Conversion never fails; exotic
//! encodings that are neither aliased nor known to `encoding_rs` may lose
//! characters.

use encoding_rs::{Encoding, UTF_8_INIT, WINDOWS_1252, WINDOWS_1252_INIT};
use tracing::debug;

use super::sanitize::sanitize_str;

/// Charset labels resolved without consulting `encoding_rs`.
///
/// ISO-8859-1 and US-ASCII are decoded as windows-1252, which assigns a
/// character to every byte.
static CHARSET_ALIASES: &[(&str, &Encoding)] = &[
    ("utf-8", &UTF_8_INIT),
    ("utf8", &UTF_8_INIT),
    ("us-ascii", &WINDOWS_1252_INIT),
    ("ascii", &WINDOWS_1252_INIT),
    ("iso-8859-1", &WINDOWS_1252_INIT),
    ("iso8859-1", &WINDOWS_1252_INIT),
    ("latin1", &WINDOWS_1252_INIT),
    ("latin-1", &WINDOWS_1252_INIT),
    ("windows-1252", &WINDOWS_1252_INIT),
    ("cp1252", &WINDOWS_1252_INIT),
];

/// Resolve a declared charset label to a decoder.
///
/// Returns `None` for labels neither in the alias table nor known to
/// `encoding_rs`.
pub fn resolve_charset(declared: &str) -> Option<&'static Encoding> {
    let label = normalize_label(declared);
    if label.is_empty() {
        return None;
    }
    CHARSET_ALIASES
        .iter()
        .find(|(alias, _)| *alias == label)
        .map(|(_, enc)| *enc)
        .or_else(|| Encoding::for_label(label.as_bytes()))
}

/// Convert `bytes` declared as `declared_charset` to a UTF-8 string.
pub fn to_utf8(bytes: &[u8], declared_charset: &str) -> String {
    let decoded = match resolve_charset(declared_charset) {
        Some(encoding) => match encoding.decode_without_bom_handling_and_without_replacement(bytes)
        {
            Some(text) => text.into_owned(),
            None => {
                debug!(
                    charset = declared_charset,
                    encoding = encoding.name(),
                    "Malformed input for declared charset, falling back to Latin-1"
                );
                latin1(bytes)
            }
        },
        None => {
            debug!(
                charset = declared_charset,
                "Unknown charset, falling back to Latin-1"
            );
            latin1(bytes)
        }
    };
    sanitize_str(&decoded).into_owned()
}

fn latin1(bytes: &[u8]) -> String {
    let (decoded, _, _) = WINDOWS_1252.decode(bytes);
    decoded.into_owned()
}

/// Lower-case, trim quotes and whitespace, and drop an RFC 2231 `*language` suffix.
fn normalize_label(declared: &str) -> String {
    let trimmed = declared.trim().trim_matches('"').trim();
    let without_lang = trimmed.split('*').next().unwrap_or("");
    without_lang.to_ascii_lowercase()
}
