//! Attachment extraction.
//!
//! Structured extraction walks the message's [`MimePart`] tree. When no tree
//! can be built at all, or the tree yields nothing while the raw bytes clearly
//! carry attachment markers, the raw boundary scanner in [`super::raw`] takes
//! over. As a last resort, and only when the caller's policy asks for it, the
//! whole message is returned as a `.eml` pseudo-attachment.
//!
//! Extraction never fails. Parts that cannot be decoded are logged and skipped.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use super::charset::to_utf8;
use super::fields::raw_source;
use super::header::decode_encoded_words;
use super::mime::part_tree;
use super::raw;
use super::transfer::hex_byte;
use crate::config::{ExtractionConfig, FallbackPolicy};
use crate::model::attachment::{sanitize_filename, Attachment};
use crate::model::message::RawMessage;
use crate::model::part::{LeafPart, MimePart};

/// `filename*=charset'lang'percent-encoded` (RFC 2231).
static FILENAME_EXTENDED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\*\s*=\s*"?([^'";]*)'[^']*'([^";\r\n]+)"?"#)
        .expect("valid extended filename regex")
});

/// `filename="..."` or `filename=token`.
static FILENAME_PLAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bfilename\s*=\s*(?:"([^"]*)"|([^";\r\n]+))"#)
        .expect("valid filename regex")
});

/// Content type → file extension for synthesized names.
static EXTENSIONS: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    ("application/zip", "zip"),
    ("application/gzip", "gz"),
    ("application/json", "json"),
    ("application/xml", "xml"),
    ("application/msword", "doc"),
    ("application/vnd.ms-excel", "xls"),
    ("application/vnd.ms-powerpoint", "ppt"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx",
    ),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xlsx",
    ),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "pptx",
    ),
    ("application/octet-stream", "bin"),
    ("application/pkcs7-signature", "p7s"),
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/svg+xml", "svg"),
    ("text/plain", "txt"),
    ("text/html", "html"),
    ("text/csv", "csv"),
    ("text/calendar", "ics"),
    ("text/xml", "xml"),
    ("message/rfc822", "eml"),
    ("audio/mpeg", "mp3"),
    ("video/mp4", "mp4"),
];

/// How the attachments of an [`Extraction`] were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionSource {
    /// Walked a structured part tree.
    Structured,
    /// Recovered by the raw boundary scanner (best effort).
    RawBoundary,
    /// The whole message was attached as `.eml`.
    EmlDump,
    /// No attachments.
    Nothing,
}

/// Result of a full extraction run.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub attachments: Vec<Attachment>,
    pub source: ExtractionSource,
    /// Instructions for the reader when output is degraded.
    pub notice: Option<String>,
}

impl Extraction {
    fn new(attachments: Vec<Attachment>, source: ExtractionSource) -> Self {
        Self {
            attachments,
            source,
            notice: None,
        }
    }
}

/// Extract attachments with the default policy (no `.eml` fallback).
pub fn extract_attachments(msg: &RawMessage) -> Vec<Attachment> {
    extract_with_policy(msg, &ExtractionConfig::default()).attachments
}

/// Extract attachments, applying `config`'s depth limit and fallback policy.
pub fn extract_with_policy(msg: &RawMessage, config: &ExtractionConfig) -> Extraction {
    let tree = part_tree(msg, config.max_depth);
    let structured_reachable = tree.is_some();

    if let Some((tree, origin)) = &tree {
        let attachments = attachments_from_tree(tree);
        debug!(
            origin = ?origin,
            count = attachments.len(),
            "Structured extraction finished"
        );
        if !attachments.is_empty() {
            return Extraction::new(attachments, ExtractionSource::Structured);
        }
    }

    let raw = raw_source(msg);
    let has_markers = raw.as_deref().is_some_and(raw::has_attachment_marker);

    if let Some(bytes) = raw.as_deref() {
        if !structured_reachable || has_markers {
            let scanned = raw::scan(bytes);
            if !scanned.is_empty() {
                warn!(
                    id = %msg.id(),
                    count = scanned.len(),
                    "Attachments recovered by raw boundary scan"
                );
                return Extraction::new(scanned, ExtractionSource::RawBoundary);
            }
        }
    }

    let nothing_useful = !structured_reachable || has_markers;
    if config.fallback_policy == FallbackPolicy::EmlDump && nothing_useful {
        if let Some(attachment) = raw::eml_dump(msg) {
            info!(
                id = %msg.id(),
                filename = %attachment.filename,
                "Attaching original message as .eml"
            );
            let notice = raw::dump_notice(&attachment.filename);
            return Extraction {
                attachments: vec![attachment],
                source: ExtractionSource::EmlDump,
                notice: Some(notice),
            };
        }
    }

    Extraction::new(Vec::new(), ExtractionSource::Nothing)
}

/// Walk a part tree and collect every attachment candidate.
pub fn attachments_from_tree(tree: &MimePart) -> Vec<Attachment> {
    let mut out = Vec::new();
    let mut counter = 0;
    match tree {
        MimePart::Leaf(_) => walk(tree, "1", &mut out, &mut counter),
        MimePart::Multipart { parts, .. } => {
            for (i, part) in parts.iter().enumerate() {
                walk(part, &(i + 1).to_string(), &mut out, &mut counter);
            }
        }
    }
    out
}

fn walk(part: &MimePart, path: &str, out: &mut Vec<Attachment>, counter: &mut usize) {
    match part {
        MimePart::Multipart { parts, .. } => {
            for (i, child) in parts.iter().enumerate() {
                walk(child, &format!("{path}.{}", i + 1), out, counter);
            }
        }
        MimePart::Leaf(leaf) => {
            if !is_attachment_candidate(leaf) {
                return;
            }
            let attachment = leaf_to_attachment(leaf, counter);
            debug!(
                path,
                filename = %attachment.filename,
                content_type = %attachment.content_type,
                size = attachment.content.len(),
                "Attachment found"
            );
            out.push(attachment);
        }
    }
}

/// Whether a leaf is an attachment rather than message body.
///
/// `attachment` dispositions always are. Anything that is not text/plain,
/// text/html or multipart is. An `inline` disposition makes a part an
/// attachment unless it is an unnamed text/plain or text/html part, which is
/// how many clients mark the body itself.
pub fn is_attachment_candidate(leaf: &LeafPart) -> bool {
    let disposition = leaf
        .disposition
        .as_deref()
        .unwrap_or("")
        .to_ascii_lowercase();
    if disposition.contains("attachment") {
        return true;
    }
    let body_type = leaf.is_plain_text() || leaf.is_html();
    if disposition.contains("inline") {
        return !body_type || resolve_filename(leaf).is_some();
    }
    !(body_type || leaf.content_type.starts_with("multipart/"))
}

fn leaf_to_attachment(leaf: &LeafPart, counter: &mut usize) -> Attachment {
    let content_type = if leaf.content_type.is_empty() {
        "application/octet-stream".to_string()
    } else {
        leaf.content_type.clone()
    };
    let name = resolve_filename(leaf).unwrap_or_default();
    Attachment::new(
        &name,
        || {
            *counter += 1;
            synthesize_name(&content_type, *counter)
        },
        content_type.clone(),
        leaf.content.clone(),
    )
}

/// Explicit filename → `name`/`filename` parameter → disposition string.
///
/// Names may be RFC 2047 encoded and are reduced to a safe single component.
pub fn resolve_filename(leaf: &LeafPart) -> Option<String> {
    let explicit = leaf
        .filename
        .as_deref()
        .or_else(|| leaf.params.get("filename").map(String::as_str))
        .or_else(|| leaf.params.get("name").map(String::as_str))
        .and_then(|raw| sanitize_filename(&decode_encoded_words(raw)));
    explicit.or_else(|| {
        leaf.disposition
            .as_deref()
            .and_then(disposition_filename)
            .and_then(|raw| sanitize_filename(&raw))
    })
}

/// Filename declared in a `Content-Disposition`-style string.
pub(crate) fn disposition_filename(disposition: &str) -> Option<String> {
    if let Some(caps) = FILENAME_EXTENDED.captures(disposition) {
        let charset = caps.get(1).map_or("utf-8", |m| m.as_str());
        let encoded = caps.get(2)?.as_str();
        return Some(to_utf8(&percent_decode(encoded), charset));
    }
    let caps = FILENAME_PLAIN.captures(disposition)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
    Some(decode_encoded_words(raw))
}

fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(byte) = bytes.get(i + 1..i + 3).and_then(hex_byte) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// `attachment_<counter>.<ext>` for a content type.
pub(crate) fn synthesize_name(content_type: &str, counter: usize) -> String {
    format!("attachment_{counter}.{}", extension_for(content_type))
}

fn extension_for(content_type: &str) -> String {
    let ct = content_type.to_ascii_lowercase();
    if let Some((_, ext)) = EXTENSIONS.iter().find(|(t, _)| *t == ct) {
        return (*ext).to_string();
    }
    let subtype: String = ct
        .split_once('/')
        .map(|(_, sub)| sub)
        .unwrap_or("")
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(10)
        .collect();
    if subtype.is_empty() {
        "bin".to_string()
    } else {
        subtype
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(content_type: &str, disposition: Option<&str>) -> LeafPart {
        LeafPart {
            disposition: disposition.map(str::to_string),
            ..LeafPart::new(content_type, b"data".to_vec())
        }
    }

    #[test]
    fn test_candidate_rules() {
        assert!(is_attachment_candidate(&leaf("application/pdf", None)));
        assert!(is_attachment_candidate(&leaf("text/plain", Some("attachment"))));
        assert!(!is_attachment_candidate(&leaf("text/plain", None)));
        assert!(!is_attachment_candidate(&leaf("text/html", Some("inline"))));
        assert!(is_attachment_candidate(&leaf("image/png", Some("inline"))));
        assert!(is_attachment_candidate(&leaf(
            "text/plain",
            Some("inline; filename=\"notes.txt\"")
        )));
    }

    #[test]
    fn test_disposition_filename() {
        assert_eq!(
            disposition_filename("attachment; filename=\"report.pdf\"").as_deref(),
            Some("report.pdf")
        );
        assert_eq!(
            disposition_filename("attachment; filename=plain.txt; size=3").as_deref(),
            Some("plain.txt")
        );
        assert_eq!(
            disposition_filename("attachment; filename*=UTF-8''R%C3%A9sum%C3%A9.pdf").as_deref(),
            Some("Résumé.pdf")
        );
        assert_eq!(disposition_filename("attachment"), None);
    }

    #[test]
    fn test_encoded_filename_param() {
        let mut part = leaf("application/pdf", None);
        part.params
            .insert("name".into(), "=?UTF-8?B?QWNjw6hzLnBkZg==?=".into());
        assert_eq!(resolve_filename(&part).as_deref(), Some("Accès.pdf"));
    }

    #[test]
    fn test_synthesized_names() {
        let tree = MimePart::Multipart {
            content_type: "multipart/mixed".into(),
            parts: vec![
                MimePart::Leaf(leaf("text/plain", None)),
                MimePart::Leaf(leaf("application/pdf", None)),
                MimePart::Leaf(leaf("image/x-weird+thing", None)),
                MimePart::Leaf(leaf("image/png", Some("attachment; filename=\"../p.png\""))),
            ],
        };
        let names: Vec<String> = attachments_from_tree(&tree)
            .into_iter()
            .map(|a| a.filename)
            .collect();
        assert_eq!(names, ["attachment_1.pdf", "attachment_2.xweirdthin", "p.png"]);
    }

    #[test]
    fn test_structured_report_pdf() {
        let msg = RawMessage::from_value(json!({"parts": [
            {"content_type": "text/plain", "content": "see attached"},
            {"content_type": "application/pdf",
             "disposition": "attachment; filename=\"report.pdf\"",
             "content": [37, 80, 68, 70]}
        ]}));
        let extraction = extract_with_policy(&msg, &ExtractionConfig::default());
        assert_eq!(extraction.source, ExtractionSource::Structured);
        assert_eq!(extraction.attachments.len(), 1);
        assert_eq!(extraction.attachments[0].filename, "report.pdf");
        assert_eq!(extraction.attachments[0].content, b"%PDF");
    }

    #[test]
    fn test_idempotent() {
        let msg = RawMessage::from_value(json!({"attachments": [
            {"content_type": "image/png", "content": "a"},
            {"content_type": "image/png", "content": "b"}
        ]}));
        let first = extract_attachments(&msg);
        let second = extract_attachments(&msg);
        assert_eq!(first, second);
        assert_eq!(first[1].filename, "attachment_2.png");
    }

    #[test]
    fn test_unknown_shape_is_empty_by_default() {
        let msg = RawMessage::from_value(json!({"subject": "x", "body": "no parts"}));
        let extraction = extract_with_policy(&msg, &ExtractionConfig::default());
        assert!(extraction.attachments.is_empty());
        assert_eq!(extraction.source, ExtractionSource::Nothing);
    }

    #[test]
    fn test_multipart_attachment_with_byte_content() {
        let tuple = RawMessage::from_value(json!({"body": [
            ["text/plain", null, "hello"],
            ["multipart/mixed", "attachment; filename=\"report.pdf\"", [37, 80, 68, 70]]
        ]}));
        let object = RawMessage::from_value(json!({"parts": [{
            "content_type": "multipart/mixed",
            "disposition": "attachment; filename=\"report.pdf\"",
            "content": [37, 80, 68, 70]
        }]}));

        for msg in [tuple, object] {
            let attachments = extract_attachments(&msg);
            assert_eq!(attachments.len(), 1);
            assert_eq!(attachments[0].filename, "report.pdf");
            assert_eq!(attachments[0].content, b"%PDF");
        }
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("application/PDF"), "pdf");
        assert_eq!(extension_for("application/x-tar"), "xtar");
        assert_eq!(extension_for("weird"), "bin");
    }
}
