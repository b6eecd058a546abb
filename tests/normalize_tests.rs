//! Integration tests: full normalization of fixture messages, attachment
//! export and staging.

use std::path::{Path, PathBuf};

use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::json;

use mailnorm::config::{ExtractionConfig, FallbackPolicy};
use mailnorm::export::attachment::export_attachments;
use mailnorm::export::staging::with_staged;
use mailnorm::parser::attachment::{extract_attachments, extract_with_policy, ExtractionSource};
use mailnorm::{normalize, Normalizer, RawMessage};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn load(name: &str) -> RawMessage {
    RawMessage::from_path(&fixture(name)).unwrap()
}

// ─── Raw multipart message ──────────────────────────────────────────

#[test]
fn test_multipart_headers() {
    let out = normalize(&load("multipart.eml"));
    assert!(out.from.contains("bot@example.com"));
    assert_eq!(out.to, "Renée <renee@example.com>, ops@example.com");
    assert_eq!(out.subject, "Monthly report – March");
    assert_eq!(out.message_id, "<report-2025-03@example.com>");
    assert_eq!(
        out.timestamp.map(|t| t.to_rfc3339()),
        Some("2025-03-03T08:15:00+00:00".to_string())
    );
}

#[test]
fn test_multipart_body_prefers_plain_text() {
    let out = normalize(&load("multipart.eml"));
    assert_eq!(out.body, "Please find the résumé attached.");
    assert!(!out.is_degraded());
}

#[test]
fn test_multipart_attachments() {
    let attachments = extract_attachments(&load("multipart.eml"));
    assert_eq!(attachments.len(), 2);

    assert_eq!(attachments[0].filename, "report.pdf");
    assert_eq!(attachments[0].content_type, "application/pdf");
    assert!(attachments[0].content.starts_with(b"%PDF-1.4\n"));

    assert_eq!(attachments[1].filename, "attachment_1.png");
    assert_eq!(attachments[1].content_type, "image/png");
    assert_eq!(attachments[1].content, b"\x89PNG\r\n\x1a\n");
}

#[test]
fn test_extraction_is_idempotent() {
    let msg = load("multipart.eml");
    let first = extract_attachments(&msg);
    let second = extract_attachments(&msg);
    assert_eq!(first, second);
}

// ─── Plain message ──────────────────────────────────────────────────

#[test]
fn test_plain_message() {
    let out = normalize(&load("plain.eml"));
    assert_eq!(out.from, "Alice <alice@example.com>");
    assert_eq!(out.to, "bob@example.com");
    assert_eq!(out.cc, "");
    assert_eq!(out.body, "Just a note, no attachments.");
    assert!(out.attachments.is_empty());
}

#[test]
fn test_plain_message_is_not_dumped() {
    let config = ExtractionConfig {
        fallback_policy: FallbackPolicy::EmlDump,
        ..ExtractionConfig::default()
    };
    let extraction = extract_with_policy(&load("plain.eml"), &config);
    assert!(extraction.attachments.is_empty());
    assert_eq!(extraction.source, ExtractionSource::Nothing);
    assert!(extraction.notice.is_none());
}

// ─── Gmail API message ──────────────────────────────────────────────

#[test]
fn test_gmail_message() {
    let out = normalize(&load("gmail.json"));
    assert_eq!(out.from, "André Dupont <andre@example.fr>");
    assert_eq!(out.to, "support@example.com");
    assert_eq!(out.subject, "Facture n° 42");
    assert_eq!(out.message_id, "<gmail-42@example.fr>");
    assert_eq!(out.body, "Bonjour, voici la facture.");
    assert_eq!(out.attachments.len(), 1);
    assert_eq!(out.attachments[0].filename, "facture-42.pdf");
    assert_eq!(out.attachments[0].content, b"%PDF-1.7 facture");
}

#[test]
fn test_json_output_is_serializable() {
    let out = normalize(&load("gmail.json"));
    let value = serde_json::to_value(&out).unwrap();
    assert_eq!(value["subject"], "Facture n° 42");
    assert_eq!(value["attachments"][0]["filename"], "facture-42.pdf");
    assert!(value["attachments"][0].get("content").is_none());
}

// ─── Extraction fallbacks ───────────────────────────────────────────

/// Declares boundary `AAA` but delimits its parts with `BBB`.
const MISMATCHED_BOUNDARY: &[u8] = b"From: a@example.com\r\n\
Subject: Broken\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"AAA\"\r\n\
\r\n\
--BBB\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"lost.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQ=\r\n\
--BBB--\r\n";

#[test]
fn test_unseparable_message_dumped_as_eml() {
    let msg = RawMessage::from_bytes(MISMATCHED_BOUNDARY.to_vec()).with_id("broken-1");
    let config = ExtractionConfig {
        fallback_policy: FallbackPolicy::EmlDump,
        ..ExtractionConfig::default()
    };

    let extraction = extract_with_policy(&msg, &config);
    assert_eq!(extraction.source, ExtractionSource::EmlDump);
    assert_eq!(extraction.attachments.len(), 1);
    assert_eq!(extraction.attachments[0].filename, "message_broken-1.eml");
    assert_eq!(extraction.attachments[0].content_type, "message/rfc822");
    assert_eq!(extraction.attachments[0].content, MISMATCHED_BOUNDARY);
    assert!(extraction
        .notice
        .as_deref()
        .is_some_and(|n| n.starts_with("[unextractable]") && n.contains("message_broken-1.eml")));

    let out = Normalizer::new(config).normalize(&msg);
    assert_eq!(out.attachments.len(), 1);
    assert!(out.is_degraded());
}

#[test]
fn test_unseparable_message_discarded_by_default() {
    let msg = RawMessage::from_bytes(MISMATCHED_BOUNDARY.to_vec()).with_id("broken-1");
    let extraction = extract_with_policy(&msg, &ExtractionConfig::default());
    assert_eq!(extraction.source, ExtractionSource::Nothing);
    assert!(extraction.attachments.is_empty());
    assert!(extraction.notice.is_none());
}

#[test]
fn test_raw_boundary_recovery_behind_text_parts() {
    let msg = RawMessage::from_value(json!({
        "parts": [{"content_type": "text/plain", "content": "See attached."}],
        "raw": "Content-Type: multipart/mixed; boundary=\"zz\"\r\n\r\n\
--zz\r\nContent-Type: text/plain\r\n\r\nSee attached.\r\n\
--zz\r\nContent-Type: text/csv\r\n\
Content-Disposition: attachment; filename=\"totals.csv\"\r\n\r\n\
a,b\r\n1,2\r\n--zz--\r\n"
    }));

    let extraction = extract_with_policy(&msg, &ExtractionConfig::default());
    assert_eq!(extraction.source, ExtractionSource::RawBoundary);
    assert_eq!(extraction.attachments.len(), 1);
    assert_eq!(extraction.attachments[0].filename, "totals.csv");
    assert_eq!(extraction.attachments[0].content_type, "text/csv");
    assert_eq!(extraction.attachments[0].content, b"a,b\r\n1,2");
    assert!(extraction.notice.is_none());
}

// ─── Degraded input ─────────────────────────────────────────────────

#[test]
fn test_unknown_shape_degrades_visibly() {
    let msg = RawMessage::from_value(json!({"id": 7, "blob": {"nested": [1, 2, 3]}}));
    let out = normalize(&msg);
    assert!(out.body.starts_with("[unextractable]"));
    assert!(out.body.contains("nested"));
    assert_eq!(out.subject, "");
    assert!(out.attachments.is_empty());
}

#[test]
fn test_invalid_utf8_never_escapes() {
    let raw = b"Subject: caf\xE9\r\nContent-Type: text/plain\r\n\r\nbad \xFF\xFE bytes\r\n".to_vec();
    let out = normalize(&RawMessage::from_bytes(raw));
    let json = serde_json::to_string(&out).unwrap();
    assert!(json.contains("bytes"));
    assert!(out.subject.starts_with("caf"));
}

#[test]
fn test_normalizer_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Normalizer>();
}

// ─── Export and staging ─────────────────────────────────────────────

#[test]
fn test_export_attachments_to_directory() {
    let temp = assert_fs::TempDir::new().unwrap();
    let out_dir = temp.child("attachments");
    let attachments = extract_attachments(&load("multipart.eml"));

    let paths = export_attachments(&attachments, out_dir.path()).unwrap();
    assert_eq!(paths.len(), 2);
    out_dir.child("report.pdf").assert(predicate::path::is_file());
    out_dir
        .child("attachment_1.png")
        .assert(predicate::path::is_file());

    // A second export never overwrites
    export_attachments(&attachments, out_dir.path()).unwrap();
    out_dir.child("report_1.pdf").assert(predicate::path::is_file());
}

#[test]
fn test_staged_file_removed_after_use() {
    let temp = assert_fs::TempDir::new().unwrap();
    let attachments = extract_attachments(&load("gmail.json"));
    let mut staged_path = None;

    let size = with_staged(&attachments[0], Some(temp.path()), |path| {
        staged_path = Some(path.to_path_buf());
        std::fs::metadata(path).unwrap().len()
    })
    .unwrap();

    assert_eq!(size, attachments[0].size());
    let staged_path = staged_path.unwrap();
    assert!(staged_path.ends_with("facture-42.pdf"));
    assert!(!staged_path.exists());
}
