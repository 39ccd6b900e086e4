//! Error types for panoforge-jpeg.

use std::io;
use thiserror::Error;

/// Result type for panoforge-jpeg operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for panoforge-jpeg operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The segment structure could not be parsed.
    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    /// The packet does not fit in a single 16-bit length segment.
    #[error("Packet too large: segment length {size} exceeds maximum {max}")]
    PacketTooLarge { size: usize, max: usize },

    /// The XMP packet is missing fields or has unparseable values.
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Re-reading a written file did not confirm the expected packet.
    #[error("Verification failed: {0}")]
    VerificationFailed(String),
}

impl Error {
    /// Create a malformed container error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedContainer(msg.into())
    }

    /// Create an invalid packet error.
    pub fn invalid_packet(msg: impl Into<String>) -> Self {
        Self::InvalidPacket(msg.into())
    }

    /// Create a verification error.
    pub fn verification(msg: impl Into<String>) -> Self {
        Self::VerificationFailed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::malformed("missing SOI");
        assert_eq!(err.to_string(), "Malformed container: missing SOI");

        let err = Error::PacketTooLarge {
            size: 70000,
            max: 65535,
        };
        assert_eq!(
            err.to_string(),
            "Packet too large: segment length 70000 exceeds maximum 65535"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(matches!(Error::from(io_err), Error::Io(_)));
    }
}
