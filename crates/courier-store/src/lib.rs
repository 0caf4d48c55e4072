//! # courier-store
//!
//! Durable, append-only record of every relayed message.
//!
//! - [`MessageStore`]: async trait the relay writes through
//! - [`SqliteMessageStore`]: `rusqlite` + `r2d2` implementation, WAL mode,
//!   blocking work on `spawn_blocking` under a timeout

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod store;

pub use connection::ConnectionConfig;
pub use errors::{Result, StoreError};
pub use store::{MessageStore, SqliteMessageStore, StoreConfig};
