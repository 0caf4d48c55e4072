//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

use crate::delivery::DeliveryEngine;
use crate::shutdown::ShutdownCoordinator;

/// Relay status as reported by `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok`, or `draining` once shutdown has begun.
    pub status: &'static str,
    /// Whole seconds since startup.
    pub uptime_secs: u64,
    /// Users with a bound connection.
    pub online_users: usize,
    /// Upgraded sockets still running a session (includes ones mid-teardown).
    pub sessions: usize,
    /// Offline users with at least one queued message.
    pub users_waiting: usize,
    /// Queued messages across all users.
    pub pending_messages: usize,
}

/// Snapshot the relay's live counters.
pub fn health_check(
    started: Instant,
    engine: &DeliveryEngine,
    shutdown: &ShutdownCoordinator,
) -> HealthResponse {
    HealthResponse {
        status: if shutdown.is_shutting_down() { "draining" } else { "ok" },
        uptime_secs: started.elapsed().as_secs(),
        online_users: engine.registry().len(),
        sessions: shutdown.active_sessions(),
        users_waiting: engine.queue().users_waiting(),
        pending_messages: engine.queue().total_pending(),
    }
}
