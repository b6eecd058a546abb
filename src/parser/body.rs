//! Plain-text body location.
//!
//! The body can live in many places depending on the producer. Rather than
//! guessing dynamically, [`BodyLocator`] walks a fixed, ordered list of named
//! adapters; the first one that yields non-blank text wins. An adapter that
//! finds a key missing or of the wrong type simply returns `None`.

use serde_json::Value;
use tracing::{debug, warn};

use super::charset::to_utf8;
use super::fields::{as_text, get_any, get_ci, raw_source};
use super::header::preview;
use super::mime::{html_to_text, part_from_value, parts_from_list, tree_from_raw};
use super::sanitize::sanitize_str;
use super::UNEXTRACTABLE;
use crate::config::ExtractionConfig;
use crate::model::message::RawMessage;
use crate::model::part::{LeafPart, MimePart};

/// Text found by an adapter, before HTML conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyText {
    pub text: String,
    pub is_html: bool,
}

impl BodyText {
    fn plain(text: String) -> Self {
        Self {
            text,
            is_html: false,
        }
    }

    fn html(text: String) -> Self {
        Self {
            text,
            is_html: true,
        }
    }
}

/// A body adapter: a total function from a message to an optional body.
pub type Adapter = fn(&BodyLocator, &RawMessage) -> Option<BodyText>;

/// Adapters in priority order.
pub const ADAPTERS: &[(&str, Adapter)] = &[
    ("direct", direct_field),
    ("part_list", part_list),
    ("nested", nested_body),
    ("content", content_field),
    ("gmail_payload", gmail_payload),
    ("raw_mime", raw_mime),
];

const DIRECT_KEYS: &[&str] = &["body", "text_body", "body_text", "plain", "text_plain"];
const PART_LIST_KEYS: &[&str] = &["body", "bodies", "parts"];

/// Locates the best available plain-text body of a message.
#[derive(Debug, Clone)]
pub struct BodyLocator {
    html_to_text: bool,
    max_depth: usize,
    max_placeholder_len: usize,
}

impl Default for BodyLocator {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

impl BodyLocator {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            html_to_text: config.html_to_text,
            max_depth: config.max_depth,
            max_placeholder_len: config.max_placeholder_len,
        }
    }

    /// Return the body text. Never empty: falls back to an
    /// `[unextractable]`-tagged rendering of the message.
    pub fn locate(&self, msg: &RawMessage) -> String {
        for (name, adapter) in ADAPTERS {
            let Some(found) = adapter(self, msg) else {
                continue;
            };
            let text = if found.is_html && self.html_to_text {
                html_to_text(&found.text)
            } else {
                found.text
            };
            if text.trim().is_empty() {
                debug!(adapter = *name, "Adapter produced a blank body, trying next");
                continue;
            }
            debug!(adapter = *name, html = found.is_html, "Body located");
            return sanitize_str(text.trim_end()).into_owned();
        }
        warn!(id = %msg.id(), "No body found, emitting placeholder");
        self.placeholder(msg)
    }

    fn placeholder(&self, msg: &RawMessage) -> String {
        let rendering = match (msg.value(), raw_source(msg)) {
            (Value::Null, Some(raw)) => preview(&raw, self.max_placeholder_len),
            (Value::Null, None) => "(empty message)".to_string(),
            (value, _) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        };
        let truncated: String = rendering.chars().take(self.max_placeholder_len).collect();
        format!("{UNEXTRACTABLE} {truncated}")
    }

    /// First body-like leaf of a part tree: plain text wins, HTML otherwise.
    fn pick_from_tree(&self, tree: &MimePart) -> Option<BodyText> {
        let leaves = tree.leaves();
        let bodies: Vec<&LeafPart> = leaves.into_iter().filter(|l| is_body_leaf(l)).collect();
        bodies
            .iter()
            .filter(|l| l.is_plain_text())
            .map(|l| leaf_text(l))
            .find(|t| !t.trim().is_empty())
            .map(BodyText::plain)
            .or_else(|| {
                bodies
                    .iter()
                    .filter(|l| l.is_html())
                    .map(|l| leaf_text(l))
                    .find(|t| !t.trim().is_empty())
                    .map(BodyText::html)
            })
    }

    fn pick_from_list(&self, items: &[Value]) -> Option<BodyText> {
        let parts = parts_from_list(items, 1, self.max_depth);
        if parts.is_empty() {
            return None;
        }
        self.pick_from_tree(&MimePart::Multipart {
            content_type: "multipart/mixed".to_string(),
            parts,
        })
    }
}

/// Locate the body with default settings.
pub fn locate_body(msg: &RawMessage) -> String {
    BodyLocator::default().locate(msg)
}

/// Text/plain or text/html that is not itself a named attachment.
fn is_body_leaf(leaf: &LeafPart) -> bool {
    if !(leaf.is_plain_text() || leaf.is_html()) {
        return false;
    }
    let attached = leaf
        .disposition
        .as_deref()
        .is_some_and(|d| d.to_ascii_lowercase().contains("attachment"));
    !attached
}

fn leaf_text(leaf: &LeafPart) -> String {
    to_utf8(&leaf.content, leaf.charset().unwrap_or("utf-8"))
}

// ── Adapters ────────────────────────────────────────────────────

/// 1. A string directly under a body-like key.
fn direct_field(_: &BodyLocator, msg: &RawMessage) -> Option<BodyText> {
    DIRECT_KEYS
        .iter()
        .filter_map(|k| get_ci(msg.value(), k))
        .find_map(Value::as_str)
        .map(|s| BodyText::plain(s.to_string()))
}

/// 2. A list of parts under `body`/`bodies`/`parts`.
fn part_list(locator: &BodyLocator, msg: &RawMessage) -> Option<BodyText> {
    PART_LIST_KEYS
        .iter()
        .filter_map(|k| get_ci(msg.value(), k))
        .filter_map(Value::as_array)
        .find_map(|items| locator.pick_from_list(items))
}

/// 3. `body.text`, `body.plain`, then `body.html`.
fn nested_body(_: &BodyLocator, msg: &RawMessage) -> Option<BodyText> {
    let body = get_ci(msg.value(), "body").filter(|b| b.is_object())?;
    get_any(body, &["text", "plain"])
        .and_then(as_text)
        .map(BodyText::plain)
        .or_else(|| get_ci(body, "html").and_then(as_text).map(BodyText::html))
}

/// 4. `content` as a string, a `{data}` wrapper, or a part list.
fn content_field(locator: &BodyLocator, msg: &RawMessage) -> Option<BodyText> {
    match get_ci(msg.value(), "content")? {
        Value::Array(items) => locator.pick_from_list(items),
        other => as_text(other).map(BodyText::plain),
    }
}

/// 5. Gmail API `payload` tree with URL-safe Base64 `body.data`.
fn gmail_payload(locator: &BodyLocator, msg: &RawMessage) -> Option<BodyText> {
    let payload = get_ci(msg.value(), "payload").filter(|p| p.is_object())?;
    let tree = part_from_value(payload, 0, locator.max_depth)?;
    locator.pick_from_tree(&tree)
}

/// 6. The raw RFC 5322 bytes, parsed with `mail-parser`.
fn raw_mime(locator: &BodyLocator, msg: &RawMessage) -> Option<BodyText> {
    let raw = raw_source(msg)?;
    let tree = tree_from_raw(&raw, locator.max_depth)?;
    locator.pick_from_tree(&tree)
}
