//! Error types for the scanning pipeline.

use thiserror::Error;

/// Payload-level decode failures on a matched `(address, topic0)` pair.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid hex in {field}: {reason}")]
    InvalidHex { field: String, reason: String },

    #[error("payload too short: expected {expected} words, got {got}")]
    ShortPayload { expected: usize, got: usize },

    #[error("missing indexed topic {index}")]
    MissingTopic { index: usize },

    #[error("value does not fit the target width after scaling")]
    Overflow,
}

/// Errors that can occur during scanning.
///
/// Transient failures (RPC) are retried inside the scanner and never
/// escape its loop; everything else is an integrity failure that aborts
/// the scanning activity.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("decode failure at {address} topic {topic}: {source}")]
    Decode {
        address: String,
        topic: String,
        source: DecodeError,
    },

    #[error("no checkpoint found; the scan cursor must be seeded before first run")]
    MissingCheckpoint,
}

impl ScanError {
    /// Returns `true` if the error is transient and safe to retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}
