//! Branded ID newtypes.
//!
//! A [`UserId`] is whatever the client presented at the handshake: an opaque,
//! case-sensitive string. A [`ConnectionId`] is minted by the server for every
//! accepted transport (UUID v7, time-ordered) and distinguishes successive
//! connections of the same user.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id!(
    /// Identifier a client presents at the handshake.
    UserId
);

branded_id!(
    /// Server-assigned identifier of one accepted transport connection.
    ConnectionId
);

impl UserId {
    /// Whether the id is empty. Empty ids are rejected at the handshake and
    /// on decoded messages.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl ConnectionId {
    /// Mint a fresh connection id (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_equality_is_case_sensitive() {
        assert_ne!(UserId::from("alice"), UserId::from("Alice"));
        assert_eq!(UserId::from("alice"), UserId::from("alice".to_string()));
    }

    #[test]
    fn user_id_blank() {
        assert!(UserId::from("").is_blank());
        assert!(!UserId::from(" ").is_blank());
    }

    #[test]
    fn user_id_display_and_deref() {
        let id = UserId::from("bob");
        assert_eq!(id.to_string(), "bob");
        assert_eq!(id.len(), 3);
        assert_eq!(id.as_str(), "bob");
        assert_eq!(id.into_inner(), "bob");
    }

    #[test]
    fn user_id_serde_transparent() {
        let id = UserId::from("carol");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"carol\"");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(a.starts_with("conn_"));
    }
}
