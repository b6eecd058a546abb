//! Mailbox rendering for address headers.

/// A mailbox assembled from a producer's structured address value.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EmailAddress {
    /// Decoded display name (may be empty).
    pub display_name: String,
    /// The bare email address (`user@domain`, may be empty).
    pub address: String,
}

impl EmailAddress {
    pub fn new(display_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into().trim().to_string(),
            address: address.into().trim().to_string(),
        }
    }

    /// `"Name <address>"`, or whichever half is present.
    pub fn display(&self) -> String {
        match (self.display_name.is_empty(), self.address.is_empty()) {
            (true, _) => self.address.clone(),
            (false, true) => self.display_name.clone(),
            (false, false) => format!("{} <{}>", self.display_name, self.address),
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}
