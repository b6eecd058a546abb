//! Write extracted attachments to a directory.

use std::path::{Path, PathBuf};

use crate::error::{NormalizeError, Result};
use crate::model::attachment::Attachment;

/// Write a single attachment into `output_dir` without overwriting anything.
pub fn export_attachment(attachment: &Attachment, output_dir: &Path) -> Result<PathBuf> {
    let path = unique_path(&output_dir.join(&attachment.filename));
    std::fs::write(&path, &attachment.content).map_err(|e| NormalizeError::io(&path, e))?;
    tracing::debug!(
        path = %path.display(),
        size = attachment.content.len(),
        "Attachment written"
    );
    Ok(path)
}

/// Write every attachment into `output_dir`, creating it if needed.
///
/// A failure on one attachment is logged and does not stop the others.
pub fn export_attachments(attachments: &[Attachment], output_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir).map_err(|e| NormalizeError::io(output_dir, e))?;
    let mut paths = Vec::with_capacity(attachments.len());

    for att in attachments {
        match export_attachment(att, output_dir) {
            Ok(path) => paths.push(path),
            Err(e) => {
                tracing::warn!(
                    filename = %att.filename,
                    error = %e,
                    "Failed to export attachment"
                );
            }
        }
    }

    Ok(paths)
}

/// If `path` already exists, append a counter to make it unique.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or(Path::new("."));

    for i in 1..1000 {
        let candidate = if ext.is_empty() {
            parent.join(format!("{stem}_{i}"))
        } else {
            parent.join(format!("{stem}_{i}.{ext}"))
        };
        if !candidate.exists() {
            return candidate;
        }
    }

    parent.join(format!("{stem}_dup.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn att(name: &str, content: &[u8]) -> Attachment {
        Attachment::new(name, || "x.bin".into(), "application/octet-stream", content.to_vec())
    }

    #[test]
    fn test_export_never_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("out");
        let paths = export_attachments(&[att("a.txt", b"one"), att("a.txt", b"two")], &out)
            .expect("export");
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].file_name().and_then(|n| n.to_str()), Some("a.txt"));
        assert_eq!(paths[1].file_name().and_then(|n| n.to_str()), Some("a_1.txt"));
        assert_eq!(std::fs::read(&paths[1]).expect("read"), b"two");
    }

    #[test]
    fn test_unique_path_without_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("README");
        std::fs::write(&first, b"x").expect("write");
        assert_eq!(unique_path(&first), dir.path().join("README_1"));
    }
}
