//! Error types for the message codec and client transports.

use thiserror::Error;

/// Errors raised by the message codec.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The frame was not a well-formed message record (bad JSON, missing or
    /// unknown fields, wrong types).
    #[error("malformed message: {0}")]
    Decode(#[source] serde_json::Error),

    /// The frame parsed but a field violates a message invariant.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Wire name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The frame was binary and not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    NotUtf8,

    /// Serializing an outbound message failed.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

impl CoreError {
    /// Short classification string for logging/metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::InvalidField { .. } => "invalid_field",
            Self::NotUtf8 => "not_utf8",
            Self::Encode(_) => "encode",
        }
    }
}

/// Convenience alias for codec results.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors writing a frame to a client transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection's writer is gone (peer closed or session torn down).
    #[error("connection closed")]
    Closed,
    /// The write did not complete within the configured bound.
    #[error("write timed out")]
    Timeout,
    /// The socket reported an error while sending.
    #[error("socket error: {0}")]
    Socket(String),
}
