//! Idle watchdog.
//!
//! The writer task sends pings every heartbeat interval; this loop only
//! watches the connection's last inbound activity and gives up once it is
//! older than the timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// How the watchdog ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// Nothing arrived from the client for `timeout`.
    TimedOut,
    /// The session stopped the watchdog.
    Cancelled,
}

/// Sleep until the connection's idle deadline, re-arming whenever activity
/// moved it. Checks happen no more often than `interval`.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    loop {
        let deadline = next_check(connection.last_seen(), Instant::now(), interval, timeout);
        tokio::select! {
            () = time::sleep_until(deadline) => {
                if connection.idle_for() >= timeout {
                    return HeartbeatResult::TimedOut;
                }
            }
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
        }
    }
}

/// The idle deadline, but never sooner than one `interval` from `now`.
fn next_check(last_seen: Instant, now: Instant, interval: Duration, timeout: Duration) -> Instant {
    (last_seen + timeout).max(now + interval.min(timeout))
}
