//! `mailnorm`: normalization of inbound email into clean text and files.
//!
//! Messages arrive in whatever shape the producer chose (header lists, Gmail
//! `payload` trees, raw RFC 5322 bytes). This crate decodes headers to clean
//! UTF-8, locates the best plain-text body and recovers attachments, degrading
//! visibly instead of failing.

pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod normalize;
pub mod parser;

pub use model::attachment::Attachment;
pub use model::message::RawMessage;
pub use model::normalized::Normalized;
pub use normalize::{normalize, Normalizer};
