//! The opaque inbound message.
//!
//! Producers disagree about how a message looks: some hand over a mapping with
//! a header list, some a Gmail-style `payload` tree, some only the RFC 5322
//! bytes. [`RawMessage`] carries whatever was supplied without interpreting it;
//! the probing happens in [`crate::parser`].

use std::path::Path;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{NormalizeError, Result};
use crate::parser::sanitize::sanitize_bytes;

/// Top-level fields consulted for a producer-assigned identifier.
const ID_FIELDS: &[&str] = &["id", "uid", "ID", "UID"];

/// One inbound message, borrowed for the duration of a processing call.
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    value: Value,
    raw: Option<Vec<u8>>,
    id: Option<String>,
}

impl RawMessage {
    /// Wrap a structured producer value.
    pub fn from_value(value: Value) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    /// Wrap the original RFC 5322 bytes.
    pub fn from_bytes(raw: impl Into<Vec<u8>>) -> Self {
        Self {
            value: Value::Null,
            raw: Some(raw.into()),
            id: None,
        }
    }

    /// Parse producer JSON. Invalid UTF-8 in the JSON text is dropped first.
    pub fn from_json_bytes(json: &[u8]) -> Result<Self> {
        let text = sanitize_bytes(json);
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| NormalizeError::InvalidInput(format!("not a JSON message: {e}")))?;
        Ok(Self::from_value(value))
    }

    /// Read a message file: `.json` is a producer value, anything else raw bytes.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NormalizeError::FileNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path).map_err(|e| NormalizeError::io(path, e))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_bytes(&bytes)
        } else {
            Ok(Self::from_bytes(bytes))
        }
    }

    /// Attach the original RFC 5322 bytes to a structured value.
    pub fn with_raw(mut self, raw: impl Into<Vec<u8>>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    /// Set an explicit identifier (used to name the `.eml` fallback dump).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The structured producer value (`Value::Null` for byte-only messages).
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The original bytes, if the producer supplied them.
    pub fn raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// Stable identifier for this message.
    ///
    /// Explicit id, then a top-level `id`/`uid` field, then the first 16 hex
    /// digits of the SHA-256 of the raw bytes (or of the serialized value).
    pub fn id(&self) -> String {
        if let Some(id) = &self.id {
            return id.clone();
        }
        for field in ID_FIELDS {
            match self.value.get(field) {
                Some(Value::String(s)) if !s.trim().is_empty() => return s.trim().to_string(),
                Some(Value::Number(n)) => return n.to_string(),
                _ => {}
            }
        }
        let mut hasher = Sha256::new();
        match &self.raw {
            Some(raw) => hasher.update(raw),
            None => hasher.update(self.value.to_string().as_bytes()),
        }
        let digest = hasher.finalize();
        digest[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}
