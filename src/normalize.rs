//! One-call normalization of an inbound message.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ExtractionConfig;
use crate::model::message::RawMessage;
use crate::model::normalized::Normalized;
use crate::parser::attachment::{extract_with_policy, ExtractionSource};
use crate::parser::body::BodyLocator;
use crate::parser::fields::header_value;
use crate::parser::header::{decode_address_field, decode_encoded_words, extract_angle_bracket, parse_date};
use crate::parser::sanitize::sanitize_str;

/// Normalizes messages with a fixed extraction configuration.
///
/// Holds no per-message state and can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: ExtractionConfig,
    locator: BodyLocator,
}

impl Normalizer {
    pub fn new(config: ExtractionConfig) -> Self {
        let locator = BodyLocator::new(&config);
        Self { config, locator }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Decode headers, locate the body and extract attachments.
    ///
    /// The three steps are independent: a failure in one never affects the
    /// others. Missing headers become empty strings.
    pub fn normalize(&self, msg: &RawMessage) -> Normalized {
        let id = msg.id();
        let (date, timestamp) = date_header(msg);
        let body = self.locator.locate(msg);
        let extraction = extract_with_policy(msg, &self.config);

        let mut notices = Vec::new();
        if let Some(notice) = extraction.notice {
            notices.push(notice);
        }
        if extraction.source == ExtractionSource::RawBoundary {
            warn!(id = %id, "Attachments came from the raw boundary scanner");
        }

        let normalized = Normalized {
            from: address_header(msg, "from"),
            to: address_header(msg, "to"),
            cc: address_header(msg, "cc"),
            date,
            timestamp,
            subject: text_header(msg, "subject"),
            message_id: extract_angle_bracket(&text_header(msg, "message-id")),
            body,
            attachments: extraction.attachments,
            notices,
        };
        debug!(
            id = %id,
            attachments = normalized.attachments.len(),
            degraded = normalized.is_degraded(),
            "Message normalized"
        );
        normalized
    }
}

/// Normalize with the default configuration.
pub fn normalize(msg: &RawMessage) -> Normalized {
    Normalizer::default().normalize(msg)
}

fn address_header(msg: &RawMessage, name: &str) -> String {
    header_value(msg, name)
        .and_then(|v| decode_address_field(&v))
        .unwrap_or_default()
}

fn text_header(msg: &RawMessage, name: &str) -> String {
    match header_value(msg, name) {
        Some(Value::String(s)) => decode_encoded_words(&s),
        Some(Value::Null) | None => String::new(),
        Some(other) => decode_address_field(&other).unwrap_or_default(),
    }
}

/// The `Date` header as text plus its parsed timestamp.
///
/// Numeric dates are Unix timestamps, in seconds or (when too large for
/// seconds) milliseconds.
fn date_header(msg: &RawMessage) -> (String, Option<DateTime<Utc>>) {
    match header_value(msg, "date") {
        Some(Value::Number(n)) => {
            let timestamp = n.as_i64().and_then(timestamp_from_epoch);
            let text = timestamp.map_or_else(|| n.to_string(), |t| t.to_rfc2822());
            (text, timestamp)
        }
        Some(Value::String(s)) => {
            let text = sanitize_str(s.trim()).into_owned();
            let timestamp = parse_date(&text);
            if timestamp.is_none() && !text.is_empty() {
                debug!(date = %text, "Unparseable Date header");
            }
            (text, timestamp)
        }
        _ => (String::new(), None),
    }
}

fn timestamp_from_epoch(n: i64) -> Option<DateTime<Utc>> {
    if n.unsigned_abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FallbackPolicy;
    use serde_json::json;

    #[test]
    fn test_normalize_structured_value() {
        let msg = RawMessage::from_value(json!({
            "from": {"name": "=?UTF-8?Q?Jos=C3=A9?=", "address": "jose@example.com"},
            "to": [["Ann", "ann@example.com"], "bob@example.com"],
            "subject": "=?UTF-8?B?SGVsbG8gV29ybGQ=?=",
            "message_id": "Message-ID: <abc@example.com>",
            "body": "plain body",
        }));
        let out = normalize(&msg);
        assert_eq!(out.from, "José <jose@example.com>");
        assert_eq!(out.to, "Ann <ann@example.com>, bob@example.com");
        assert_eq!(out.cc, "");
        assert_eq!(out.subject, "Hello World");
        assert_eq!(out.message_id, "<abc@example.com>");
        assert_eq!(out.body, "plain body");
        assert!(out.attachments.is_empty());
        assert!(!out.is_degraded());
    }

    #[test]
    fn test_numeric_date() {
        let msg = RawMessage::from_value(json!({"date": 1_700_000_000_000_i64}));
        let out = normalize(&msg);
        assert_eq!(out.timestamp.map(|t| t.timestamp()), Some(1_700_000_000));
        assert!(out.date.contains("2023"));
    }

    #[test]
    fn test_out_of_range_numeric_date() {
        let msg = RawMessage::from_value(json!({"date": i64::MIN, "body": "x"}));
        let out = normalize(&msg);
        assert_eq!(out.timestamp, None);
        assert_eq!(out.date, i64::MIN.to_string());
        assert_eq!(out.body, "x");
    }

    #[test]
    fn test_string_date() {
        let msg = RawMessage::from_value(json!({"Date": "Tue, 14 Nov 2023 22:13:20 +0000"}));
        let out = normalize(&msg);
        assert_eq!(out.timestamp.map(|t| t.timestamp()), Some(1_700_000_000));
        assert_eq!(out.date, "Tue, 14 Nov 2023 22:13:20 +0000");
    }

    #[test]
    fn test_raw_message() {
        let raw = b"From: =?ISO-8859-1?Q?Andr=E9?= <andre@example.com>\r\n\
Subject: Hi\r\n\
Content-Type: text/plain\r\n\
\r\n\
Body here\r\n";
        let out = normalize(&RawMessage::from_bytes(raw.to_vec()));
        assert_eq!(out.from, "André <andre@example.com>");
        assert_eq!(out.subject, "Hi");
        assert_eq!(out.body, "Body here");
    }

    #[test]
    fn test_degraded_message_with_eml_policy() {
        let config = ExtractionConfig {
            fallback_policy: FallbackPolicy::EmlDump,
            ..ExtractionConfig::default()
        };
        let msg = RawMessage::from_value(json!({"id": "q1", "weird": true}));
        let out = Normalizer::new(config).normalize(&msg);
        assert!(out.is_degraded());
        assert!(out.body.starts_with("[unextractable]"));
        assert!(out.attachments.is_empty());
    }
}
