//! Message decoding: charsets, headers, MIME part trees, body location and
//! attachment recovery.

pub mod attachment;
pub mod body;
pub mod charset;
pub mod fields;
pub mod header;
pub mod mime;
pub mod raw;
pub mod sanitize;
pub mod transfer;

/// Prefix marking degraded output (placeholder bodies, `.eml` dump notices).
pub const UNEXTRACTABLE: &str = "[unextractable]";
