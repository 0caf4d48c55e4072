//! # courier-core
//!
//! Shared vocabulary for the courier relay crates:
//!
//! - **Identifiers**: [`UserId`] and [`ConnectionId`] newtypes
//! - **Messages**: the immutable [`Message`] value and its JSON wire codec
//! - **Errors**: [`CoreError`] and [`TransportError`] via `thiserror`
//! - **Logging**: `tracing` subscriber setup shared by binaries and tests

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod message;

pub use errors::{CoreError, Result, TransportError};
pub use ids::{ConnectionId, UserId};
pub use message::Message;
