//! The relay's message value and its JSON wire format.
//!
//! On the wire a message is a JSON object:
//!
//! ```json
//! {"sender":"bob","receiver":"alice","content":"hi","time":"2026-01-01T00:00:00Z"}
//! ```
//!
//! Decoding is strict: unknown fields, missing `sender`/`receiver`/`content`,
//! and empty user ids are rejected. A missing `time` is filled with the
//! receipt time supplied by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, Result};
use crate::ids::UserId;

/// A text message from one user to another. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    sender: UserId,
    receiver: UserId,
    content: String,
    #[serde(rename = "time")]
    timestamp: DateTime<Utc>,
}

/// Inbound wire record.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireMessage {
    sender: String,
    receiver: String,
    content: String,
    #[serde(default)]
    time: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a message stamped with the current time.
    pub fn new(sender: UserId, receiver: UserId, content: impl Into<String>) -> Self {
        Self::with_timestamp(sender, receiver, content, Utc::now())
    }

    /// Create a message with an explicit timestamp.
    pub fn with_timestamp(
        sender: UserId,
        receiver: UserId,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sender,
            receiver,
            content: content.into(),
            timestamp,
        }
    }

    /// Decode an inbound text frame.
    ///
    /// `received_at` is used when the frame carries no `time`.
    pub fn decode(frame: &str, received_at: DateTime<Utc>) -> Result<Self> {
        let wire: WireMessage = serde_json::from_str(frame).map_err(CoreError::Decode)?;
        let sender = UserId::from_string(wire.sender);
        let receiver = UserId::from_string(wire.receiver);
        for (field, id) in [("sender", &sender), ("receiver", &receiver)] {
            if id.is_blank() {
                return Err(CoreError::InvalidField {
                    field,
                    reason: "must not be empty".into(),
                });
            }
        }
        Ok(Self {
            sender,
            receiver,
            content: wire.content,
            timestamp: wire.time.unwrap_or(received_at),
        })
    }

    /// Decode an inbound binary frame, which must hold UTF-8 JSON.
    pub fn decode_bytes(frame: &[u8], received_at: DateTime<Utc>) -> Result<Self> {
        let text = std::str::from_utf8(frame).map_err(|_| CoreError::NotUtf8)?;
        Self::decode(text, received_at)
    }

    /// Encode for an outbound text frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(CoreError::Encode)
    }

    /// Sending user.
    pub fn sender(&self) -> &UserId {
        &self.sender
    }

    /// Receiving user.
    pub fn receiver(&self) -> &UserId {
        &self.receiver
    }

    /// Text payload.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// When the message was created (client-supplied or receipt time).
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
