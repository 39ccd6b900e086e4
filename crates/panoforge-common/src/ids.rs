//! Content identifiers for source images.
//!
//! A source is identified by its path relative to the library root. The
//! [`ContentId`] is a short digest of that path so it can be recomputed
//! identically on every run without a persisted index.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest.
pub const CONTENT_ID_LEN: usize = 8;

/// Stable identifier of a source image, derived from its relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Derive the identifier for a `/`-separated relative path.
    #[must_use]
    pub fn from_relative_path(relative_path: &str) -> Self {
        let digest = Sha256::digest(relative_path.as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(CONTENT_ID_LEN);
        Self(hex)
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_length() {
        let id = ContentId::from_relative_path("Outdoors/beach.jpg");
        assert_eq!(id.as_str().len(), CONTENT_ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_id_deterministic() {
        let a = ContentId::from_relative_path("A/b c.jpg");
        let b = ContentId::from_relative_path("A/b c.jpg");
        assert_eq!(a, b);
    }

    #[test]
    fn test_content_id_known_value() {
        // sha256("abc") = ba7816bf...
        assert_eq!(ContentId::from_relative_path("abc").as_str(), "ba7816bf");
    }

    #[test]
    fn test_content_id_differs_by_path() {
        let a = ContentId::from_relative_path("A/one.jpg");
        let b = ContentId::from_relative_path("A/two.jpg");
        assert_ne!(a, b);
    }

    #[test]
    fn test_content_id_serializes_as_string() {
        let id = ContentId::from_relative_path("abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ba7816bf\"");
    }
}
