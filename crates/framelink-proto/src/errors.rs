//! Protocol error types.

use thiserror::Error;

/// Result alias for wire format operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Frame exceeds [`crate::MAX_FRAME_SIZE`]
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Size of the offending frame
        size: usize,
        /// Maximum accepted size
        max: usize,
    },

    /// Frame bytes are not a valid CBOR envelope
    #[error("failed to decode envelope: {0}")]
    Decode(String),

    /// Envelope could not be serialized
    #[error("failed to encode envelope: {0}")]
    Encode(String),

    /// Envelope carries an empty message kind
    #[error("envelope type must not be empty")]
    EmptyType,

    /// Payload does not have the shape the caller asked for
    #[error("payload conversion failed: {0}")]
    Payload(String),
}
