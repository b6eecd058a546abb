//! MIME part ingestion and HTML-to-text conversion.
//!
//! A message's part structure is converted into a [`MimePart`] tree once,
//! from whichever representation the producer supplied: a structured value
//! (part lists, tuple parts, Gmail `payload` trees) or raw RFC 5322 bytes
//! (parsed with `mail-parser`). Everything downstream walks the tree.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use mail_parser::{Message, MessagePart, MessageParser, MimeHeaders, PartType};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::fields::{as_bytes, get_any, get_ci, raw_source};
use super::header::skip_from_line;
use super::transfer::{decode_base64_url, decode_transfer};
use crate::error::Result;
use crate::model::message::RawMessage;
use crate::model::part::{bare_content_type, header_params, LeafPart, MimePart};

/// Fields that may hold a structured part list, in probe order.
const PART_LIST_FIELDS: &[&str] = &["attachments", "parts", "body", "mime_parts"];

const CONTENT_TYPE_KEYS: &[&str] = &["content_type", "contentType", "mime_type", "mimeType", "type"];
const DISPOSITION_KEYS: &[&str] = &["disposition", "content_disposition", "contentDisposition"];
const FILENAME_KEYS: &[&str] = &["filename", "fileName", "file_name", "name"];
const CONTENT_KEYS: &[&str] = &["content", "data", "payload", "text", "body"];
const ENCODING_KEYS: &[&str] = &[
    "content_transfer_encoding",
    "contentTransferEncoding",
    "transfer_encoding",
    "encoding",
];
const SUBPART_KEYS: &[&str] = &["parts", "subparts", "children"];

/// Where a part tree came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeOrigin {
    /// Built from the producer's structured value.
    Value,
    /// Parsed from raw RFC 5322 bytes.
    Raw,
}

/// Build the part tree of a message, trying the structured value first and
/// the raw bytes second. `None` when no structured part access is possible.
pub fn part_tree(msg: &RawMessage, max_depth: usize) -> Option<(MimePart, TreeOrigin)> {
    if let Some(tree) = tree_from_value(msg.value(), max_depth) {
        return Some((tree, TreeOrigin::Value));
    }
    let raw = raw_source(msg)?;
    tree_from_raw(&raw, max_depth).map(|tree| (tree, TreeOrigin::Raw))
}

/// Build a part tree from a structured producer value.
pub fn tree_from_value(value: &Value, max_depth: usize) -> Option<MimePart> {
    for field in PART_LIST_FIELDS {
        if let Some(Value::Array(items)) = get_ci(value, field) {
            if items.is_empty() {
                continue;
            }
            let parts = parts_from_list(items, 1, max_depth);
            if !parts.is_empty() {
                debug!(field = *field, parts = parts.len(), "Part list found in value");
                return Some(MimePart::Multipart {
                    content_type: "multipart/mixed".to_string(),
                    parts,
                });
            }
        }
    }

    let payload = get_ci(value, "payload").filter(|p| p.is_object())?;
    part_from_value(payload, 0, max_depth)
}

/// Convert a list of producer parts, dropping entries that are not parts.
pub fn parts_from_list(items: &[Value], depth: usize, max_depth: usize) -> Vec<MimePart> {
    items
        .iter()
        .filter_map(|item| part_from_value(item, depth, max_depth))
        .collect()
}

/// Convert one producer part.
///
/// Accepted shapes: an object with content-type/content keys (nested `parts`
/// make it a multipart), a `[content_type, params, content]` tuple, or a bare
/// string (plain text).
pub fn part_from_value(value: &Value, depth: usize, max_depth: usize) -> Option<MimePart> {
    if depth > max_depth {
        warn!(depth, "Part nesting too deep, skipping");
        return None;
    }
    match value {
        Value::String(s) => Some(MimePart::Leaf(LeafPart::new(
            "text/plain",
            s.as_bytes().to_vec(),
        ))),
        Value::Array(items) => tuple_part(items, depth, max_depth),
        Value::Object(_) => object_part(value, depth, max_depth),
        _ => None,
    }
}

fn object_part(value: &Value, depth: usize, max_depth: usize) -> Option<MimePart> {
    let raw_content_type = get_any(value, CONTENT_TYPE_KEYS).and_then(Value::as_str);
    let content_type = raw_content_type.map(bare_content_type);

    let subparts = get_any(value, SUBPART_KEYS)
        .or_else(|| {
            let is_multipart = content_type.as_deref().is_some_and(|ct| ct.starts_with("multipart/"));
            get_any(value, CONTENT_KEYS).filter(|_| is_multipart)
        })
        .and_then(Value::as_array)
        .filter(|items| is_part_list(items));

    if let Some(items) = subparts {
        return Some(MimePart::Multipart {
            content_type: content_type.unwrap_or_else(|| "multipart/mixed".to_string()),
            parts: parts_from_list(items, depth + 1, max_depth),
        });
    }

    let content = match object_content(value) {
        Ok(Some(content)) => content,
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %e, "Undecodable part content, skipping");
            return None;
        }
    };

    let mut leaf = LeafPart::new(
        content_type.as_deref().unwrap_or("application/octet-stream"),
        content,
    );
    leaf.params = raw_content_type.map(header_params).unwrap_or_default();
    leaf.params.extend(object_params(value));
    leaf.filename = get_any(value, FILENAME_KEYS)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty());
    leaf.disposition = get_any(value, DISPOSITION_KEYS)
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| header_in_list(value, "content-disposition"));
    if let Some(charset) = get_ci(value, "charset").and_then(Value::as_str) {
        leaf.params.insert("charset".to_string(), charset.to_string());
    }
    Some(MimePart::Leaf(leaf))
}

/// Decoded content of an object part.
///
/// A Gmail-style `body: {data}` object is URL-safe Base64; otherwise a declared
/// transfer encoding is honoured.
fn object_content(value: &Value) -> Result<Option<Vec<u8>>> {
    if let Some(body @ Value::Object(_)) = get_ci(value, "body") {
        if let Some(data) = get_ci(body, "data").and_then(as_bytes) {
            return decode_base64_url(&data).map(Some);
        }
    }
    let Some(raw) = get_any(value, CONTENT_KEYS).and_then(as_bytes) else {
        return Ok(None);
    };
    let encoding = get_any(value, ENCODING_KEYS)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let encoding = if encoding.is_empty() {
        header_in_list(value, "content-transfer-encoding").unwrap_or_default()
    } else {
        encoding
    };
    decode_transfer(&raw, &encoding).map(Some)
}

fn object_params(value: &Value) -> BTreeMap<String, String> {
    get_any(value, &["params", "parameters"])
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| Some((k.to_ascii_lowercase(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Header value from a part's own `headers: [{name, value}]` list (Gmail parts).
fn header_in_list(value: &Value, name: &str) -> Option<String> {
    get_ci(value, "headers")?
        .as_array()?
        .iter()
        .find(|h| {
            get_ci(h, "name")
                .and_then(Value::as_str)
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|h| get_ci(h, "value"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Whether an array holds sub-parts rather than content bytes.
fn is_part_list(items: &[Value]) -> bool {
    let is_byte = |v: &Value| v.as_u64().is_some_and(|n| n <= u64::from(u8::MAX));
    !items.is_empty() && !items.iter().all(is_byte)
}

/// `[content_type, params, content]`. `params` may be a mapping or a
/// disposition string.
fn tuple_part(items: &[Value], depth: usize, max_depth: usize) -> Option<MimePart> {
    let [ct, params, content, ..] = items else {
        return None;
    };
    let raw_content_type = ct.as_str()?;
    let content_type = bare_content_type(raw_content_type);

    if content_type.starts_with("multipart/") {
        if let Some(sub) = content.as_array().filter(|items| is_part_list(items)) {
            return Some(MimePart::Multipart {
                content_type,
                parts: parts_from_list(sub, depth + 1, max_depth),
            });
        }
    }

    let mut leaf = LeafPart::new(&content_type, as_bytes(content)?.into_owned());
    leaf.params = header_params(raw_content_type);
    match params {
        Value::Object(map) => {
            for (k, v) in map {
                let Some(v) = v.as_str() else { continue };
                match k.to_ascii_lowercase().as_str() {
                    "filename" | "name" if leaf.filename.is_none() => {
                        leaf.filename = Some(v.to_string());
                    }
                    "disposition" | "content-disposition" => {
                        leaf.disposition = Some(v.to_string());
                    }
                    key => {
                        leaf.params.insert(key.to_string(), v.to_string());
                    }
                }
            }
        }
        Value::String(s) if !s.trim().is_empty() => leaf.disposition = Some(s.clone()),
        _ => {}
    }
    Some(MimePart::Leaf(leaf))
}

// ── Raw bytes (mail-parser) ─────────────────────────────────────

/// Parse raw RFC 5322 bytes into a part tree.
pub fn tree_from_raw(raw: &[u8], max_depth: usize) -> Option<MimePart> {
    let message_bytes = skip_from_line(raw);
    let msg = MessageParser::default().parse(message_bytes)?;
    let root = msg.parts.first()?;
    Some(convert_part(&msg, root, 0, max_depth))
}

fn convert_part(msg: &Message<'_>, part: &MessagePart<'_>, depth: usize, max_depth: usize) -> MimePart {
    let content_type = part
        .content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .unwrap_or_else(|| default_content_type(&part.body).to_string())
        .to_ascii_lowercase();

    if let PartType::Multipart(ids) = &part.body {
        let parts = if depth >= max_depth {
            warn!(depth, "Multipart nesting too deep, skipping children");
            Vec::new()
        } else {
            ids.iter()
                .filter_map(|id| msg.parts.get(*id))
                .map(|p| convert_part(msg, p, depth + 1, max_depth))
                .collect()
        };
        return MimePart::Multipart {
            content_type,
            parts,
        };
    }

    let mut leaf = LeafPart::new(&content_type, part.contents().to_vec());

    if let Some(ct) = part.content_type() {
        for key in ["charset", "name", "format"] {
            if let Some(v) = ct.attribute(key) {
                leaf.params.insert(key.to_string(), v.to_string());
            }
        }
    }
    // mail-parser already decoded text parts to UTF-8
    if matches!(part.body, PartType::Text(_) | PartType::Html(_)) {
        leaf.params.insert("charset".to_string(), "utf-8".to_string());
    }

    if let Some(disp) = part.content_disposition() {
        let mut value = disp.ctype().to_string();
        if let Some(filename) = disp.attribute("filename") {
            value.push_str(&format!("; filename=\"{filename}\""));
        }
        leaf.disposition = Some(value);
    }
    leaf.filename = part.attachment_name().map(str::to_string);

    MimePart::Leaf(leaf)
}

fn default_content_type(body: &PartType<'_>) -> &'static str {
    match body {
        PartType::Text(_) => "text/plain",
        PartType::Html(_) => "text/html",
        PartType::Multipart(_) => "multipart/mixed",
        PartType::Message(_) => "message/rfc822",
        _ => "application/octet-stream",
    }
}

// ── HTML ────────────────────────────────────────────────────────

static HIDDEN_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:script|style)\b.*?(?:</(?:script|style)\s*>|\z)")
        .expect("valid hidden block regex")
});

static LINE_BREAK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*(?:br|/?\s*(?:p|div|tr|li|h[1-6]))\b[^>]*>").expect("valid line break regex")
});

static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,6});").expect("valid entity regex")
});

/// Flatten an HTML body for display.
///
/// Scripts and styles are dropped, block-level tags and `<br>` become line
/// breaks, entities are decoded, and runs of blank lines collapse to one.
pub fn html_to_text(html: &str) -> String {
    let visible = HIDDEN_BLOCK.replace_all(html, "");
    let broken = LINE_BREAK_TAG.replace_all(&visible, "\n");
    let stripped = ANY_TAG.replace_all(&broken, "");
    let decoded = ENTITY.replace_all(&stripped, |caps: &regex::Captures<'_>| {
        decode_entity(&caps[1]).map_or_else(|| caps[0].to_string(), String::from)
    });

    let mut lines: Vec<&str> = Vec::new();
    for line in decoded.lines().map(str::trim) {
        if line.is_empty() && lines.last().is_none_or(|prev| prev.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(|c| if c == '\u{a0}' { ' ' } else { c });
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MULTIPART: &[u8] = b"From: a@example.com\r\n\
Subject: Report\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
caf=E9\r\n\
--XYZ\r\n\
Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQ=\r\n\
--XYZ--\r\n";

    #[test]
    fn test_tree_from_raw() {
        let tree = tree_from_raw(MULTIPART, 10).expect("parsed");
        assert_eq!(tree.content_type(), "multipart/mixed");
        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 2);
        assert!(leaves[0].is_plain_text());
        assert_eq!(leaves[0].charset(), Some("utf-8"));
        assert_eq!(String::from_utf8_lossy(&leaves[0].content).trim(), "café");
        assert_eq!(leaves[1].content_type, "application/pdf");
        assert_eq!(leaves[1].filename.as_deref(), Some("report.pdf"));
        assert_eq!(leaves[1].content, b"%PDF-1.4");
        assert!(leaves[1]
            .disposition
            .as_deref()
            .is_some_and(|d| d.starts_with("attachment")));
    }

    #[test]
    fn test_tree_from_value_object_parts() {
        let value = json!({
            "attachments": [
                {"content_type": "application/pdf", "filename": "a.pdf",
                 "content": "JVBERi0xLjQ=", "encoding": "base64"},
                {"mime_type": "text/plain; charset=utf-8", "data": [104, 105]}
            ]
        });
        let tree = tree_from_value(&value, 10).expect("tree");
        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].filename.as_deref(), Some("a.pdf"));
        assert_eq!(leaves[0].content, b"%PDF-1.4");
        assert_eq!(leaves[1].content_type, "text/plain");
        assert_eq!(leaves[1].charset(), Some("utf-8"));
        assert_eq!(leaves[1].content, b"hi");
    }

    #[test]
    fn test_tuple_parts() {
        let value = json!({"body": [
            ["text/plain", null, "hello"],
            ["text/html", {"charset": "utf-8"}, "<p>hi</p>"],
            ["application/zip", "attachment; filename=\"x.zip\"", [80, 75]]
        ]});
        let leaves_tree = tree_from_value(&value, 10).expect("tree");
        let leaves = leaves_tree.leaves();
        assert_eq!(leaves.len(), 3);
        assert_eq!(leaves[1].charset(), Some("utf-8"));
        assert_eq!(
            leaves[2].disposition.as_deref(),
            Some("attachment; filename=\"x.zip\"")
        );
    }

    #[test]
    fn test_gmail_payload_tree() {
        let value = json!({"payload": {
            "mimeType": "multipart/mixed",
            "parts": [
                {"mimeType": "text/plain", "body": {"data": "aGVsbG8"}},
                {"mimeType": "image/png", "filename": "p.png",
                 "headers": [{"name": "Content-Disposition", "value": "attachment"}],
                 "body": {"data": "iVBORw"}}
            ]
        }});
        let tree = tree_from_value(&value, 10).expect("tree");
        let leaves = tree.leaves();
        assert_eq!(leaves[0].content, b"hello");
        assert_eq!(leaves[1].disposition.as_deref(), Some("attachment"));
        assert_eq!(leaves[1].content, [0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_depth_limit() {
        let value = json!({"parts": [{"content_type": "multipart/mixed",
            "parts": [{"content_type": "multipart/mixed",
                "parts": [{"content_type": "text/plain", "content": "deep"}]}]}]});
        let shallow = tree_from_value(&value, 1).expect("tree");
        assert!(shallow.leaves().is_empty());
        let deep = tree_from_value(&value, 10).expect("tree");
        assert_eq!(deep.leaves().len(), 1);
    }

    #[test]
    fn test_no_part_structure() {
        assert!(tree_from_value(&json!({"subject": "x", "body": "text"}), 10).is_none());
        assert!(tree_from_value(&json!({"parts": []}), 10).is_none());
    }

    #[test]
    fn test_html_to_text_basic() {
        let text = html_to_text("<p>Hello <b>world</b></p><p>Second paragraph</p>");
        assert!(text.contains("Hello world"));
        assert!(text.contains("Second paragraph"));
    }

    #[test]
    fn test_html_to_text_entities() {
        assert_eq!(html_to_text("Tom &amp; Jerry &lt;3&gt;"), "Tom & Jerry <3>");
    }

    #[test]
    fn test_html_to_text_numeric_entities_and_breaks() {
        assert_eq!(
            html_to_text("Caf&#233;<BR/>line&#x20;two<br>&amp;lt;&nbsp;&bogus;"),
            "Café\nline two\n&lt; &bogus;"
        );
    }

    #[test]
    fn test_html_to_text_collapses_blank_lines() {
        assert_eq!(
            html_to_text("<div>one</div>\n\n\n<div class=\"x\">two</div><style>p{}</style>"),
            "one\n\ntwo"
        );
    }

    #[test]
    fn test_html_to_text_removes_scripts() {
        assert_eq!(
            html_to_text("Before<SCRIPT>alert('x')</script>After"),
            "BeforeAfter"
        );
    }
}
