//! Gateway error types

use crate::session::SourceId;

/// Errors surfaced by the gateway
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The capture handle could not be opened
    #[error("source unavailable: {source_id} ({reason})")]
    SourceUnavailable { source_id: SourceId, reason: String },

    /// Consecutive read failures reached the configured limit
    #[error("reconnect attempts exhausted for {source_id} after {attempts} failures")]
    ReconnectExhausted { source_id: SourceId, attempts: u32 },

    /// A frame could not be compressed
    #[error("frame encode failed: {0}")]
    Encode(String),

    /// No session is registered under this identifier
    #[error("stream not found: {0}")]
    NotFound(SourceId),

    /// The request is missing a required identifier or is malformed
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;
