//! The normalized output handed to the ticket-creation pipeline.

use chrono::{DateTime, Utc};

use super::attachment::Attachment;

/// Decoded headers, body and attachments of one message.
///
/// Every string is valid UTF-8 and therefore JSON-encodable. Missing headers
/// are empty strings.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Normalized {
    /// Decoded `From` header.
    pub from: String,
    /// Decoded `To` header.
    pub to: String,
    /// Decoded `Cc` header.
    pub cc: String,
    /// `Date` header as supplied (sanitized).
    pub date: String,
    /// Parsed `Date` header, when one of the known formats matched.
    pub timestamp: Option<DateTime<Utc>>,
    /// Decoded `Subject` header.
    pub subject: String,
    /// `Message-ID` header.
    pub message_id: String,
    /// Best-effort plain text body. Starts with `[unextractable]` when degraded.
    pub body: String,
    /// Recovered attachments (metadata only when serialized).
    pub attachments: Vec<Attachment>,
    /// Degradation notices produced along the way.
    pub notices: Vec<String>,
}

impl Normalized {
    /// Whether any part of the output came from a last-resort fallback.
    pub fn is_degraded(&self) -> bool {
        self.body.starts_with(crate::parser::UNEXTRACTABLE) || !self.notices.is_empty()
    }
}
