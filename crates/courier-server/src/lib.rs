//! # courier-server
//!
//! Real-time message relay over WebSocket.
//!
//! - [`registry`]: user id to live connection, last writer wins
//! - [`queue`]: per-user FIFO of messages for offline recipients
//! - [`delivery`]: deliver-or-queue, flush on connect, per-user locking
//! - [`websocket`]: upgrade, session loop, writer task, heartbeat
//! - HTTP: `/ws`, `/health`, `/metrics`, `/history/{user_id}`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod delivery;
pub mod errors;
pub mod health;
pub mod history;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod transport;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ServerConfig;
pub use delivery::{DeliveryEngine, DeliveryOutcome, FlushOutcome};
pub use errors::ServerError;
pub use queue::{EnqueueOutcome, PendingQueueStore};
pub use registry::ConnectionRegistry;
pub use server::{AppState, CourierServer};
pub use transport::{CloseReason, FrameSink};
