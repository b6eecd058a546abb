//! Centralized error types for mailnorm.
//!
//! The decoding engine itself never returns these: every engine operation is
//! total. They surface from ingestion of external input, per-part decoding
//! (logged and skipped by the extractor), configuration, staging and export.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailnorm library.
#[derive(Error, Debug)]
pub enum NormalizeError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified input file does not exist.
    #[error("Input file not found: {0}")]
    FileNotFound(PathBuf),

    /// The producer value could not be read at all.
    #[error("Invalid message input: {0}")]
    InvalidInput(String),

    /// A transfer-encoding or payload decoding error.
    #[error("Decoding error: {0}")]
    Decode(String),

    /// The configuration could not be located, read or written.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An attachment could not be staged to a temporary file.
    #[error("Staging error: {0}")]
    Staging(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NormalizeError>;

impl NormalizeError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<base64::DecodeError> for NormalizeError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}
