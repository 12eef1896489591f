//! Error types for change-feed subscriptions.

use thiserror::Error;

/// Main error type for feed operations.
///
/// Peer disconnects and deadline expiry are deliberately absent: both are
/// normal ways for a subscription to end and never surface as errors.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Change log is locked by another process")]
    Locked,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Transport error: {0}")]
    Transport(std::io::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FeedError {
    /// Whether this error came from the historical store.
    ///
    /// Storage failures mean a requested catch-up may be incomplete, so they
    /// are always surfaced to the caller.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            FeedError::Io(_)
                | FeedError::Storage(_)
                | FeedError::Corruption(_)
                | FeedError::ChecksumMismatch { .. }
                | FeedError::Locked
                | FeedError::Deserialization(_)
        )
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for FeedError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for FeedError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        FeedError::Deserialization(e.to_string())
    }
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
