//! Header decoding: RFC 2047 encoded-words, address fields, raw header blocks,
//! and date parsing.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

use super::charset::to_utf8;
use super::sanitize::{sanitize_bytes, sanitize_str};
use super::transfer::{decode_base64, hex_byte};
use crate::model::address::EmailAddress;

/// `=?charset?Q|B?encoded-text?=`
static ENCODED_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"=\?([^?\s]+)\?([QqBb])\?([^?\s]*)\?=").expect("valid encoded-word regex")
});

const NAME_KEYS: &[&str] = &["name", "display_name", "displayName", "personal"];
const ADDRESS_KEYS: &[&str] = &["address", "email", "addr"];

/// Decode a header value.
///
/// `None` passes through. Values without encoded-words are returned as plain
/// text; otherwise every encoded-word is decoded independently.
pub fn decode_header(value: Option<&str>) -> Option<String> {
    value.map(decode_encoded_words)
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Literal text around encoded-words is kept verbatim, except whitespace that
/// only separates two encoded-words (RFC 2047 §6.2). A token that fails to
/// decode is kept as written.
pub fn decode_encoded_words(input: &str) -> String {
    if !ENCODED_WORD.is_match(input) {
        return sanitize_str(input).into_owned();
    }

    let mut result = String::with_capacity(input.len());
    let mut last_end = 0;
    let mut last_was_encoded = false;

    for caps in ENCODED_WORD.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        let before = &input[last_end..whole.start()];
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        match decode_one_word(&caps) {
            Some(text) => {
                result.push_str(&text);
                last_was_encoded = true;
            }
            None => {
                result.push_str(whole.as_str());
                last_was_encoded = false;
            }
        }
        last_end = whole.end();
    }

    result.push_str(&input[last_end..]);
    sanitize_str(&result).into_owned()
}

fn decode_one_word(caps: &Captures<'_>) -> Option<String> {
    let charset = caps.get(1)?.as_str();
    let encoding = caps.get(2)?.as_str();
    let encoded_text = caps.get(3)?.as_str();

    let bytes = if encoding.eq_ignore_ascii_case("b") {
        match decode_base64(encoded_text.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(token = encoded_text, error = %e, "Bad base64 in encoded-word, keeping token");
                return None;
            }
        }
    } else {
        decode_q_encoding(encoded_text)
    };

    Some(to_utf8(&bytes, charset))
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' => match bytes.get(i + 1..i + 3).and_then(hex_byte) {
                Some(byte) => {
                    result.push(byte);
                    i += 3;
                }
                None => {
                    result.push(b'=');
                    i += 1;
                }
            },
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Render an address-shaped producer value as decoded text.
///
/// - string → decoded as a header value
/// - `{name, address}` (several key spellings) → `"Name <address>"`
/// - `[name, address]` tuple → `"Name <address>"`
/// - list of any of the above → joined with `", "`
///
/// Empty names are omitted. Returns `None` for `null` or when nothing renders.
pub fn decode_address_field(value: &Value) -> Option<String> {
    let rendered = match value {
        Value::Null => return None,
        Value::String(s) => decode_encoded_words(s),
        Value::Object(_) => render_mailbox_object(value)?,
        Value::Array(items) => {
            if let Some(tuple) = render_tuple(items) {
                tuple
            } else {
                items
                    .iter()
                    .filter_map(decode_address_field)
                    .filter(|s| !s.trim().is_empty())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }
        other => other.to_string(),
    };
    if rendered.trim().is_empty() {
        None
    } else {
        Some(rendered)
    }
}

fn render_mailbox_object(value: &Value) -> Option<String> {
    let name = first_str(value, NAME_KEYS).map(decode_encoded_words);
    let address = first_str(value, ADDRESS_KEYS).map(str::to_string).or_else(|| {
        // IMAP ENVELOPE style: {mailbox, host}
        let mailbox = first_str(value, &["mailbox"])?;
        match first_str(value, &["host"]) {
            Some(host) => Some(format!("{mailbox}@{host}")),
            None => Some(mailbox.to_string()),
        }
    });
    if name.is_none() && address.is_none() {
        return None;
    }
    Some(EmailAddress::new(name.unwrap_or_default(), address.unwrap_or_default()).display())
}

/// `["Name", "user@host"]`: exactly two strings, the second an address.
fn render_tuple(items: &[Value]) -> Option<String> {
    match items {
        [Value::String(name), Value::String(addr)] if addr.contains('@') && !name.contains('@') => {
            Some(EmailAddress::new(decode_encoded_words(name), addr.as_str()).display())
        }
        _ => None,
    }
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find_map(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

// ── Raw header blocks ───────────────────────────────────────────

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Latin-1 (which accepts every byte).
pub(crate) fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => to_utf8(bytes, "iso-8859-1"),
    }
}

/// Split a header block into `(lowercase_name, value)` pairs, joining folded
/// continuation lines onto the header they continue. Lines that are neither a
/// header nor a continuation are ignored.
pub(crate) fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
        } else if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }
    headers
}

/// Parse the header block at the top of a raw message.
pub(crate) fn parse_header_block(raw: &[u8]) -> Vec<(String, String)> {
    let raw = skip_from_line(raw);
    let end = find_header_end(raw).unwrap_or(raw.len());
    unfold_headers(&decode_header_bytes(&raw[..end]))
}

/// Get the first value for a header name (case-insensitive).
pub(crate) fn get_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Offset of the blank line ending the header block (LF or CRLF style).
pub(crate) fn find_header_end(data: &[u8]) -> Option<usize> {
    (0..data.len()).find(|&i| {
        let rest = &data[i..];
        rest.starts_with(b"\n\n") || rest.starts_with(b"\r\n\r\n")
    })
}

/// Byte offset where the body starts (just past the first blank line).
pub(crate) fn find_body_start(data: &[u8]) -> Option<usize> {
    let end = find_header_end(data)?;
    if data[end..].starts_with(b"\r\n\r\n") {
        Some(end + 4)
    } else {
        Some(end + 2)
    }
}

/// Drop a leading BOM and an mbox `From ` separator line left in by a producer.
pub(crate) fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    if !data.starts_with(b"From ") {
        return data;
    }
    match data.iter().position(|&b| b == b'\n') {
        Some(newline) => &data[newline + 1..],
        None => data,
    }
}

/// The `<...>` part of a Message-ID value, or the trimmed value when there is none.
pub fn extract_angle_bracket(s: &str) -> String {
    let trimmed = s.trim();
    trimmed
        .find('<')
        .and_then(|open| {
            let close = trimmed[open..].find('>')?;
            Some(trimmed[open..=open + close].to_string())
        })
        .unwrap_or_else(|| trimmed.to_string())
}

/// Sanitized lossy preview of raw bytes, for diagnostics.
pub(crate) fn preview(raw: &[u8], max_chars: usize) -> String {
    sanitize_bytes(raw).chars().take(max_chars).collect()
}

// ── Dates ───────────────────────────────────────────────────────

/// Formats tried after RFC 2822 and RFC 3339, on the weekday-less value.
const DATE_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M %z",
    "%b %d %H:%M:%S %Y",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const WEEKDAYS: &[&str] = &["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

const MONTHS: &[&str] = &[
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Zone abbreviations seen in the wild, with their offsets.
const NAMED_ZONES: &[(&str, &str)] = &[
    ("UT", "+0000"),
    ("UTC", "+0000"),
    ("GMT", "+0000"),
    ("Z", "+0000"),
    ("WET", "+0000"),
    ("CET", "+0100"),
    ("CEST", "+0200"),
    ("EET", "+0200"),
    ("MSK", "+0300"),
    ("IST", "+0530"),
    ("JST", "+0900"),
    ("AEST", "+1000"),
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
];

/// Parse a `Date` header.
///
/// RFC 2822 and RFC 3339 first, then common broken variants: missing or
/// misplaced weekday, IMAP `16-JUL-2025` dates, named zones. Values without
/// any zone are taken as UTC. `mail-parser`'s lenient parser is the last try.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let parsed = DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| date_variants(s).iter().find_map(|v| parse_with_formats(v)))
        .or_else(|| mail_parser_date(s));
    if parsed.is_none() {
        debug!(date = s, "Unrecognized date format");
    }
    parsed
}

/// Rewrites of `s` worth trying, numeric-zone versions first so a named zone
/// is never silently dropped by a zone-less format.
fn date_variants(s: &str) -> Vec<String> {
    let bare = without_weekday(s);
    let spaced = imap_to_rfc(&bare);
    let mut variants: Vec<String> = [&bare, &spaced]
        .into_iter()
        .filter_map(|v| with_numeric_zone(v))
        .collect();
    variants.push(bare.clone());
    if spaced != bare {
        variants.push(spaced);
    }
    variants
}

fn parse_with_formats(s: &str) -> Option<DateTime<Utc>> {
    DATE_FORMATS.iter().find_map(|fmt| {
        DateTime::parse_from_str(s, fmt)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| NaiveDateTime::parse_from_str(s, fmt).ok().map(|n| n.and_utc()))
    })
}

/// `"Thu, 04 Jan 2024 ..."` and `"Thu 04 Jan 2024 ..."` → `"04 Jan 2024 ..."`.
fn without_weekday(s: &str) -> String {
    let rest = WEEKDAYS
        .iter()
        .find_map(|day| s.get(..3).filter(|p| p.eq_ignore_ascii_case(day)).map(|_| &s[3..]))
        .filter(|rest| rest.starts_with([',', ' ']));
    match rest {
        Some(rest) => rest.trim_start_matches(',').trim().to_string(),
        None => s.to_string(),
    }
}

/// `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn imap_to_rfc(s: &str) -> String {
    let upper = s.to_ascii_uppercase();
    MONTHS
        .iter()
        .find_map(|month| {
            let pattern = format!("-{}-", month.to_ascii_uppercase());
            let at = upper.find(&pattern)?;
            Some(format!("{} {month} {}", &s[..at], &s[at + pattern.len()..]))
        })
        .unwrap_or_else(|| s.to_string())
}

/// Replace a trailing zone abbreviation (optionally parenthesized) with its offset.
fn with_numeric_zone(s: &str) -> Option<String> {
    let (head, zone) = s.rsplit_once(' ')?;
    let zone = zone.trim_matches(|c| c == '(' || c == ')');
    let (_, offset) = NAMED_ZONES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(zone))?;
    Some(format!("{} {offset}", head.trim_end()))
}

fn mail_parser_date(s: &str) -> Option<DateTime<Utc>> {
    let header = format!("Date: {s}\r\n\r\n");
    let parsed = mail_parser::MessageParser::default().parse(header.as_bytes())?;
    DateTime::from_timestamp(parsed.date()?.to_timestamp(), 0)
}
