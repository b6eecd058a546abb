//! Recovered attachment files.

/// An attachment recovered from a message.
///
/// The filename is never empty and never contains a path separator; it is
/// synthesized (`attachment_<n>.<ext>`) when the message does not name the part.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Attachment {
    /// Safe, single-component filename.
    pub filename: String,

    /// MIME content type (e.g. `"image/jpeg"`, `"application/pdf"`).
    pub content_type: String,

    /// Decoded payload.
    #[serde(skip)]
    pub content: Vec<u8>,
}

impl Attachment {
    /// Build an attachment, scrubbing the filename.
    ///
    /// Falls back to `fallback_name` when the scrubbed name is empty.
    pub fn new(
        filename: &str,
        fallback_name: impl FnOnce() -> String,
        content_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        let filename = sanitize_filename(filename).unwrap_or_else(|| {
            sanitize_filename(&fallback_name()).unwrap_or_else(|| "attachment.bin".to_string())
        });
        Self {
            filename,
            content_type: content_type.into(),
            content,
        }
    }

    /// Size of the payload in bytes.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Reduce a producer-supplied filename to a safe single path component.
///
/// Keeps only the text after the last `/` or `\`, replaces control characters
/// and characters reserved on common filesystems with `_`, and trims
/// surrounding whitespace and dots. Returns `None` when nothing usable remains.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let last = raw.rsplit(&['/', '\\'][..]).next().unwrap_or("");
    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.').trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        None
    } else {
        Some(trimmed.chars().take(200).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\report.pdf").as_deref(),
            Some("report.pdf")
        );
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_filename("a:b*c.txt").as_deref(), Some("a_b_c.txt"));
        assert_eq!(sanitize_filename("dir/"), None);
        assert_eq!(sanitize_filename(".."), None);
        assert_eq!(sanitize_filename("   "), None);
    }

    #[test]
    fn test_new_uses_fallback_name() {
        let att = Attachment::new("", || "attachment_1.pdf".to_string(), "application/pdf", vec![1]);
        assert_eq!(att.filename, "attachment_1.pdf");
        assert_eq!(att.size(), 1);
    }

    #[test]
    fn test_new_never_empty() {
        let att = Attachment::new("/", || "/".to_string(), "application/octet-stream", vec![]);
        assert_eq!(att.filename, "attachment.bin");
    }
}
