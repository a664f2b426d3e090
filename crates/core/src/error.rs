//! Error types for stowage-core
//!
//! One error enum is shared by the core library and every backend adapter so
//! that the transfer engine can classify failures without knowing which
//! backend produced them.

use thiserror::Error;

/// Result alias used across the stowage crates
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by descriptors, the secret codec, storage clients and
/// the transfer engine
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value (chunk size, config file contents, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A descriptor is missing a required field or has a malformed one
    #[error("Invalid storage descriptor: {0}")]
    InvalidDescriptor(String),

    /// The descriptor names a storage scheme that has no adapter
    #[error("Unsupported storage scheme: {0}")]
    UnsupportedScheme(String),

    /// A client was requested for a descriptor whose secret is still encrypted
    #[error("Storage descriptor must be decrypted before creating a client: {0}")]
    NotDecrypted(String),

    /// Secret key has the wrong length or encoding
    #[error("Invalid secret key: {0}")]
    InvalidKey(String),

    /// Envelope string is structurally malformed
    #[error("Invalid encrypted format: {0}")]
    InvalidEnvelope(String),

    /// Authentication tag did not verify, or the plaintext is unusable
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Fewer (or more) bytes were moved than the source reported at stat time
    #[error("Copy incomplete from {from} to {to}. Expected {expected} bytes but wrote {actual} bytes")]
    IncompleteCopy {
        from: String,
        to: String,
        expected: u64,
        actual: u64,
    },

    /// The transfer was cancelled at a chunk boundary
    #[error("Transfer cancelled after {written} of {total} bytes")]
    Cancelled { written: u64, total: u64 },

    /// The object could still be observed after a delete, or the
    /// verification read failed unexpectedly
    #[error("{location} not deleted: {reason}")]
    DeleteVerification { location: String, reason: String },

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    General(String),
}

impl Error {
    /// True for both malformed envelopes and failed tag verification
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, Error::InvalidEnvelope(_) | Error::Decryption(_))
    }

    /// True when the error means the object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Process exit code for this error (see the CLI's exit code table)
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_)
            | Error::InvalidDescriptor(_)
            | Error::UnsupportedScheme(_)
            | Error::NotDecrypted(_)
            | Error::InvalidPath(_) => 2,
            Error::Network(_) => 3,
            Error::Auth(_)
            | Error::InvalidKey(_)
            | Error::InvalidEnvelope(_)
            | Error::Decryption(_) => 4,
            Error::NotFound(_) => 5,
            Error::IncompleteCopy { .. } | Error::Cancelled { .. } => 6,
            Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => 5,
            Error::Encryption(_)
            | Error::DeleteVerification { .. }
            | Error::UnsupportedFeature(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::General(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_copy_message_reports_both_counts() {
        let err = Error::IncompleteCopy {
            from: "s3://src/a.bin".to_string(),
            to: "file:///tmp/a.bin".to_string(),
            expected: 1024,
            actual: 512,
        };
        let msg = err.to_string();
        assert!(msg.contains("Expected 1024 bytes"));
        assert!(msg.contains("wrote 512 bytes"));
        assert!(msg.contains("s3://src/a.bin"));
    }

    #[test]
    fn test_decryption_failure_classes() {
        assert!(Error::InvalidEnvelope("parts".to_string()).is_decryption_failure());
        assert!(Error::Decryption("tag".to_string()).is_decryption_failure());
        assert!(!Error::InvalidKey("short".to_string()).is_decryption_failure());
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::NotFound("x".to_string()).is_not_found());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(Error::Io(io).is_not_found());
        assert!(!Error::Network("timeout".to_string()).is_not_found());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::Config("bad".into()).exit_code(), 2);
        assert_eq!(Error::Network("reset".into()).exit_code(), 3);
        assert_eq!(Error::Auth("denied".into()).exit_code(), 4);
        assert_eq!(Error::NotFound("a".into()).exit_code(), 5);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(Error::Io(io).exit_code(), 5);
        let incomplete = Error::IncompleteCopy {
            from: "a".into(),
            to: "b".into(),
            expected: 2,
            actual: 1,
        };
        assert_eq!(incomplete.exit_code(), 6);
        let cancelled = Error::Cancelled {
            written: 1,
            total: 2,
        };
        assert_eq!(cancelled.exit_code(), 6);
        assert_eq!(Error::General("x".into()).exit_code(), 1);
        let lingering = Error::DeleteVerification {
            location: "s3://b/k".into(),
            reason: "still present".into(),
        };
        assert_eq!(lingering.exit_code(), 1);
    }

    #[test]
    fn test_every_decryption_failure_is_an_auth_exit() {
        for err in [
            Error::InvalidEnvelope("expected 3 parts".into()),
            Error::Decryption("tag mismatch".into()),
            Error::InvalidKey("16 bytes".into()),
        ] {
            assert_eq!(err.exit_code(), 4, "{err}");
        }
        assert_eq!(Error::NotDecrypted("s3://b/k".into()).exit_code(), 2);
    }
}
