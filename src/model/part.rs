//! MIME part tree, built once when a message is ingested.

use std::collections::BTreeMap;

/// One node of a message's MIME structure.
#[derive(Debug, Clone, PartialEq)]
pub enum MimePart {
    /// A part carrying content.
    Leaf(LeafPart),
    /// A `multipart/*` container.
    Multipart {
        /// Full lower-case content type (e.g. `"multipart/mixed"`).
        content_type: String,
        /// Sub-parts in message order.
        parts: Vec<MimePart>,
    },
}

/// A content-bearing MIME part.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeafPart {
    /// Lower-case `type/subtype`, without parameters.
    pub content_type: String,
    /// Raw `Content-Disposition` value, if any (e.g. `attachment; filename="a.pdf"`).
    pub disposition: Option<String>,
    /// Content-Type and disposition parameters, lower-case keys.
    pub params: BTreeMap<String, String>,
    /// Explicit filename, possibly still RFC 2047 encoded.
    pub filename: Option<String>,
    /// Decoded payload (transfer encoding already removed).
    pub content: Vec<u8>,
}

impl LeafPart {
    /// Build a leaf from a content type, lower-casing it and stripping parameters.
    pub fn new(content_type: &str, content: Vec<u8>) -> Self {
        Self {
            content_type: bare_content_type(content_type),
            content,
            ..Self::default()
        }
    }

    /// Declared charset, if any.
    pub fn charset(&self) -> Option<&str> {
        self.params.get("charset").map(String::as_str)
    }

    pub fn is_plain_text(&self) -> bool {
        self.content_type == "text/plain"
    }

    pub fn is_html(&self) -> bool {
        self.content_type == "text/html"
    }

    /// The subtype half of the content type (`"pdf"` for `application/pdf`).
    pub fn subtype(&self) -> &str {
        self.content_type
            .split_once('/')
            .map(|(_, sub)| sub)
            .unwrap_or("")
    }
}

impl MimePart {
    /// Content type of this node.
    pub fn content_type(&self) -> &str {
        match self {
            MimePart::Leaf(leaf) => &leaf.content_type,
            MimePart::Multipart { content_type, .. } => content_type,
        }
    }

    /// Depth-first iterator over every leaf, in message order.
    pub fn leaves(&self) -> Vec<&LeafPart> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }
}

fn collect_leaves<'a>(part: &'a MimePart, out: &mut Vec<&'a LeafPart>) {
    match part {
        MimePart::Leaf(leaf) => out.push(leaf),
        MimePart::Multipart { parts, .. } => {
            for p in parts {
                collect_leaves(p, out);
            }
        }
    }
}

/// `"Text/Plain; charset=utf-8"` → `"text/plain"`.
pub fn bare_content_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

/// Parameters of a content-type or disposition string, lower-case keys.
///
/// `"text/plain; charset=\"UTF-8\"; format=flowed"` → `{charset: UTF-8, format: flowed}`
pub fn header_params(raw: &str) -> BTreeMap<String, String> {
    raw.split(';')
        .skip(1)
        .filter_map(|param| {
            let (k, v) = param.split_once('=')?;
            let key = k.trim().to_ascii_lowercase();
            let value = v.trim().trim_matches('"').to_string();
            (!key.is_empty()).then_some((key, value))
        })
        .collect()
}
