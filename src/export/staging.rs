//! Scoped temp-file staging for attachment upload.
//!
//! A [`StagedAttachment`] owns a fresh temporary directory holding exactly one
//! file. Both are removed when the guard drops, whichever way the caller
//! leaves the scope.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::{NormalizeError, Result};
use crate::model::attachment::{sanitize_filename, Attachment};

/// An attachment written to a temporary file.
#[derive(Debug)]
pub struct StagedAttachment {
    path: PathBuf,
    dir: TempDir,
}

impl StagedAttachment {
    /// Write `attachment` to `<tmp>/mailnorm-XXXX/<filename>`.
    ///
    /// `parent` overrides the system temp directory.
    pub fn stage(attachment: &Attachment, parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mailnorm-");
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| NormalizeError::Staging(format!("cannot create temp dir: {e}")))?;

        let filename = sanitize_filename(&attachment.filename)
            .unwrap_or_else(|| "attachment.bin".to_string());
        let path = dir.path().join(filename);
        std::fs::write(&path, &attachment.content).map_err(|e| NormalizeError::io(&path, e))?;
        debug!(path = %path.display(), size = attachment.content.len(), "Attachment staged");
        Ok(Self { path, dir })
    }

    /// Path of the staged file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory that will be removed on drop.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Stage `attachment`, run `f` on the staged path, then clean up.
///
/// The temp file is gone by the time this returns, including when `f` panics.
pub fn with_staged<R>(
    attachment: &Attachment,
    parent: Option<&Path>,
    f: impl FnOnce(&Path) -> R,
) -> Result<R> {
    let staged = StagedAttachment::stage(attachment, parent)?;
    Ok(f(staged.path()))
}
