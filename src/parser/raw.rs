//! Best-effort attachment recovery from raw bytes.
//!
//! Used only when structured part access failed. Splits on the first declared
//! multipart boundary and keeps fragments carrying a `Content-Disposition`
//! marker. Nested multiparts are not followed.

use std::sync::LazyLock;

use regex::bytes::Regex;
use tracing::{debug, warn};

use super::attachment::{disposition_filename, synthesize_name};
use super::fields::raw_source;
use super::header::{decode_header_bytes, find_body_start, find_header_end, get_header, unfold_headers};
use super::transfer::{decode_base64, decode_quoted_printable};
use super::UNEXTRACTABLE;
use crate::model::attachment::Attachment;
use crate::model::message::RawMessage;
use crate::model::part::bare_content_type;

static BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)boundary\s*=\s*"?([^";\r\n]+)"?"#).expect("valid boundary regex")
});

static ATTACHMENT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)content-disposition\s*:\s*attachment").expect("valid marker regex")
});

/// Recover attachments by splitting on the first multipart boundary.
pub fn scan(raw: &[u8]) -> Vec<Attachment> {
    let Some(boundary) = first_boundary(raw) else {
        debug!("Raw scan: no boundary declared");
        return Vec::new();
    };
    let delimiter = [b"--".as_slice(), boundary.as_slice()].concat();

    let mut out = Vec::new();
    let mut counter = 0;
    for (index, fragment) in split_on(raw, &delimiter).into_iter().enumerate().skip(1) {
        if fragment.starts_with(b"--") {
            break;
        }
        match fragment_attachment(fragment, &mut counter) {
            Some(attachment) => {
                debug!(
                    fragment = index,
                    filename = %attachment.filename,
                    size = attachment.content.len(),
                    "Raw scan: attachment recovered"
                );
                out.push(attachment);
            }
            None => debug!(fragment = index, "Raw scan: fragment skipped"),
        }
    }
    out
}

/// Whether the raw bytes declare any `Content-Disposition: attachment` part.
pub fn has_attachment_marker(raw: &[u8]) -> bool {
    ATTACHMENT_MARKER.is_match(raw)
}

/// The whole message as a `message_<id>.eml` attachment, when raw bytes exist.
pub fn eml_dump(msg: &RawMessage) -> Option<Attachment> {
    let raw = raw_source(msg)?;
    if raw.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    let id = file_safe_id(&msg.id());
    Some(Attachment::new(
        &format!("message_{id}.eml"),
        || "message.eml".to_string(),
        "message/rfc822",
        raw.into_owned(),
    ))
}

/// Producer id reduced to characters that are safe inside a file name.
fn file_safe_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Reader-facing notice accompanying an `.eml` dump.
pub fn dump_notice(filename: &str) -> String {
    format!(
        "{UNEXTRACTABLE} Attachments could not be separated from this message. \
         The original message is attached as {filename}; open it in a mail client \
         to access its attachments."
    )
}

fn first_boundary(raw: &[u8]) -> Option<Vec<u8>> {
    let caps = BOUNDARY.captures(raw)?;
    let value = caps.get(1)?.as_bytes().trim_ascii();
    (!value.is_empty()).then(|| value.to_vec())
}

fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            parts.push(&haystack[start..i]);
            i += needle.len();
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&haystack[start..]);
    parts
}

fn fragment_attachment(fragment: &[u8], counter: &mut usize) -> Option<Attachment> {
    let fragment = strip_leading_newline(fragment);
    let header_end = find_header_end(fragment)?;
    let body_start = find_body_start(fragment)?;
    let headers = unfold_headers(&decode_header_bytes(&fragment[..header_end]));

    let disposition = get_header(&headers, "content-disposition")?;
    let lower = disposition.to_ascii_lowercase();
    if !(lower.starts_with("attachment") || lower.starts_with("inline")) {
        return None;
    }

    let content_type = get_header(&headers, "content-type")
        .map(bare_content_type)
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let encoding = get_header(&headers, "content-transfer-encoding")
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let body = strip_trailer(&fragment[body_start..]);
    let content = match encoding.as_str() {
        "base64" => decode_base64(body).unwrap_or_else(|e| {
            warn!(error = %e, "Raw scan: base64 decode failed, keeping raw text");
            body.to_vec()
        }),
        "quoted-printable" => decode_quoted_printable(body),
        _ => body.to_vec(),
    };

    let filename = disposition_filename(disposition).unwrap_or_default();
    Some(Attachment::new(
        &filename,
        || {
            *counter += 1;
            synthesize_name(&content_type, *counter)
        },
        content_type.clone(),
        content,
    ))
}

fn strip_leading_newline(data: &[u8]) -> &[u8] {
    data.strip_prefix(b"\r\n")
        .or_else(|| data.strip_prefix(b"\n"))
        .unwrap_or(data)
}

/// Drop a trailing `--` and exactly one line break before the next delimiter.
fn strip_trailer(data: &[u8]) -> &[u8] {
    let data = data.strip_suffix(b"--").unwrap_or(data);
    data.strip_suffix(b"\r\n")
        .or_else(|| data.strip_suffix(b"\n"))
        .unwrap_or(data)
}
