//! Field access over producer values whose shape is not known in advance.
//!
//! Every accessor is total: a missing key or a value of the wrong type is
//! `None`, never an error.

use std::borrow::Cow;

use serde_json::Value;

use super::header::{get_header, parse_header_block};
use super::sanitize::sanitize_bytes;
use super::transfer::decode_base64_url;
use crate::model::message::RawMessage;

/// Containers that may hold a message's headers, in probe order.
const HEADER_CONTAINERS: &[&str] = &["headers", "header"];

/// Fields that may hold the original RFC 5322 text.
const RAW_FIELDS: &[&str] = &["raw", "source", "rfc822", "mime", "eml"];

/// Look up `key` in an object, exact match first, then case-insensitively.
pub fn get_ci<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let map = value.as_object()?;
    if let Some(v) = map.get(key) {
        return Some(v);
    }
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

/// First of `keys` that is present and not `null`.
pub fn get_any<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| get_ci(value, k))
        .find(|v| !v.is_null())
}

/// Bytes carried by a value: a string, an array of byte values, or a `{data}` wrapper.
pub fn as_bytes(value: &Value) -> Option<Cow<'_, [u8]>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_bytes())),
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect::<Option<Vec<u8>>>()
            .map(Cow::Owned),
        Value::Object(_) => get_ci(value, "data").and_then(as_bytes),
        _ => None,
    }
}

/// Text carried by a value (see [`as_bytes`]), sanitized.
pub fn as_text(value: &Value) -> Option<String> {
    as_bytes(value).map(|b| sanitize_bytes(&b).into_owned())
}

/// Raw header value for `name`, or the structured value a producer put there.
///
/// Probe order: direct field (also `message_id`-style spellings), a
/// `headers` container (map, `[[name, value]]` pairs or `[{name, value}]`
/// objects), Gmail `payload.headers`, an IMAP-style `envelope`, and finally
/// the header block of the raw message.
pub fn header_value(msg: &RawMessage, name: &str) -> Option<Value> {
    let value = msg.value();
    let underscored = name.replace('-', "_");
    let camel = camel_case(name);
    let spellings = [name, underscored.as_str(), camel.as_str()];

    if let Some(v) = get_any(value, &spellings) {
        if !v.is_object() || is_address_object(v) {
            return Some(v.clone());
        }
    }

    for container in HEADER_CONTAINERS {
        if let Some(v) = get_ci(value, container).and_then(|h| lookup_in_container(h, name)) {
            return Some(v.clone());
        }
    }

    if let Some(v) = get_ci(value, "payload")
        .and_then(|p| get_ci(p, "headers"))
        .and_then(|h| lookup_in_container(h, name))
    {
        return Some(v.clone());
    }

    if let Some(v) = get_ci(value, "envelope").and_then(|e| get_any(e, &spellings)) {
        return Some(v.clone());
    }

    let raw = raw_source(msg)?;
    let headers = parse_header_block(&raw);
    get_header(&headers, name).map(|s| Value::String(s.to_string()))
}

fn lookup_in_container<'a>(container: &'a Value, name: &str) -> Option<&'a Value> {
    match container {
        Value::Object(_) => get_ci(container, name).filter(|v| !v.is_null()),
        Value::Array(items) => items.iter().find_map(|item| match item {
            Value::Array(pair) => match pair.as_slice() {
                [Value::String(k), v, ..] if k.eq_ignore_ascii_case(name) => Some(v),
                _ => None,
            },
            Value::Object(_) => {
                let k = get_ci(item, "name").or_else(|| get_ci(item, "key"))?.as_str()?;
                if k.eq_ignore_ascii_case(name) {
                    get_ci(item, "value")
                } else {
                    None
                }
            }
            _ => None,
        }),
        _ => None,
    }
}

fn is_address_object(v: &Value) -> bool {
    ["address", "email", "mailbox", "name"]
        .iter()
        .any(|k| get_ci(v, k).is_some())
}

/// `"message-id"` → `"messageId"`.
fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '-' || c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// The original RFC 5322 bytes, if the producer supplied them anywhere.
///
/// Looks at the bytes given to [`RawMessage::from_bytes`]/[`RawMessage::with_raw`],
/// then at `raw`-like string fields. A single-line field is assumed to be
/// URL-safe Base64 (Gmail `format=raw`) and decoded when that succeeds.
pub fn raw_source(msg: &RawMessage) -> Option<Cow<'_, [u8]>> {
    if let Some(raw) = msg.raw() {
        return Some(Cow::Borrowed(raw));
    }
    let field = get_any(msg.value(), RAW_FIELDS)?;
    let bytes = as_bytes(field)?;
    if !bytes.contains(&b'\n') && !bytes.contains(&b':') {
        if let Ok(decoded) = decode_base64_url(&bytes) {
            return Some(Cow::Owned(decoded));
        }
    }
    Some(bytes)
}
