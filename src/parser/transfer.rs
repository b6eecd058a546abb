//! Content-Transfer-Encoding decoders: Base64 (standard and URL-safe) and
//! Quoted-Printable.
//!
//! Producers are sloppy about padding and line breaks, so the Base64 engines
//! accept missing or present padding and whitespace is stripped first.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::error::Result;

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

/// Standard alphabet, padding optional.
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

/// URL-safe alphabet (Gmail API `body.data`), padding optional.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Decode standard Base64, ignoring ASCII whitespace and padding mistakes.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let compact = strip_whitespace(data);
    Ok(STANDARD_LENIENT.decode(compact)?)
}

/// Decode URL-safe Base64, falling back to the standard alphabet.
pub fn decode_base64_url(data: &[u8]) -> Result<Vec<u8>> {
    let compact = strip_whitespace(data);
    match URL_SAFE_LENIENT.decode(&compact) {
        Ok(bytes) => Ok(bytes),
        Err(_) => Ok(STANDARD_LENIENT.decode(compact)?),
    }
}

/// Decode Quoted-Printable body text (RFC 2045 §6.7).
///
/// Soft line breaks are removed; malformed escapes are kept literally.
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] != b'=' {
            out.push(data[i]);
            i += 1;
            continue;
        }
        // Soft line break: "=\r\n" or "=\n"
        if data[i + 1..].starts_with(b"\r\n") {
            i += 3;
            continue;
        }
        if data[i + 1..].starts_with(b"\n") {
            i += 2;
            continue;
        }
        match data.get(i + 1..i + 3).and_then(hex_byte) {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(b'=');
                i += 1;
            }
        }
    }
    out
}

/// Decode a two-digit hex pair.
pub(crate) fn hex_byte(pair: &[u8]) -> Option<u8> {
    let s = std::str::from_utf8(pair).ok()?;
    if s.len() != 2 {
        return None;
    }
    u8::from_str_radix(s, 16).ok()
}

/// Decode a part body according to its declared transfer encoding.
///
/// Unknown encodings (`7bit`, `8bit`, `binary`, empty) pass the bytes through.
pub fn decode_transfer(data: &[u8], encoding: &str) -> Result<Vec<u8>> {
    match encoding.trim().to_ascii_lowercase().as_str() {
        "base64" => decode_base64(data),
        "quoted-printable" => Ok(decode_quoted_printable(data)),
        _ => Ok(data.to_vec()),
    }
}

fn strip_whitespace(data: &[u8]) -> Vec<u8> {
    data.iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect()
}
