//! The seam between the delivery engine and a client transport.
//!
//! [`FrameSink`] is what the registry stores and the engine writes to. The
//! WebSocket implementation is
//! [`ClientConnection`](crate::websocket::connection::ClientConnection);
//! unit tests use in-memory sinks.

use async_trait::async_trait;
use courier_core::{ConnectionId, TransportError};

/// Why the server closed a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The same user connected again.
    Superseded,
    /// No ping/pong or other activity within the heartbeat timeout.
    HeartbeatTimeout,
    /// A frame write failed or timed out.
    WriteFailed,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// WebSocket close code sent to the peer.
    pub fn code(self) -> u16 {
        match self {
            Self::Superseded => 4000,
            Self::HeartbeatTimeout => 4001,
            Self::WriteFailed => 1011,
            Self::Shutdown => 1001,
        }
    }

    /// Short label for close frames and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Superseded => "superseded",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::WriteFailed => "write_failed",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A writable, closable client transport.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Identifier of this particular connection.
    fn id(&self) -> &ConnectionId;

    /// Write one text frame, returning once it has been handed to the socket.
    async fn write_frame(&self, frame: String) -> Result<(), TransportError>;

    /// Ask the transport to close. Idempotent; the first reason wins.
    fn close(&self, reason: CloseReason);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_codes_are_valid_websocket_codes() {
        for reason in [
            CloseReason::Superseded,
            CloseReason::HeartbeatTimeout,
            CloseReason::WriteFailed,
            CloseReason::Shutdown,
        ] {
            let code = reason.code();
            assert!(
                (1000..=1014).contains(&code) || (4000..=4999).contains(&code),
                "{reason} has code {code}"
            );
        }
    }

    #[test]
    fn display_matches_label() {
        assert_eq!(CloseReason::Superseded.to_string(), "superseded");
        assert_eq!(CloseReason::Shutdown.as_str(), "shutdown");
    }
}
