//! Core data model: inbound message, MIME part tree, attachments and normalized output.

pub mod address;
pub mod attachment;
pub mod message;
pub mod normalized;
pub mod part;
