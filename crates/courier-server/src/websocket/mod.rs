//! WebSocket upgrade, per-connection state, heartbeat, and session loop.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod session;
