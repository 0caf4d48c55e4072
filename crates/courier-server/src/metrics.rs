//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Connection attempts (counter, labels: method, status).
pub const CONNECTION_ATTEMPTS_TOTAL: &str = "courier_connection_attempts_total";
/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Inbound frames carrying a message payload (counter).
pub const MESSAGES_RECEIVED_TOTAL: &str = "messages_received_total";
/// Inbound frames that failed to decode (counter, labels: kind).
pub const MESSAGES_DECODE_FAILURES_TOTAL: &str = "messages_decode_failures_total";
/// Messages written to a recipient, live or on flush (counter, labels: path).
pub const MESSAGES_DELIVERED_TOTAL: &str = "messages_delivered_total";
/// Messages placed in a pending queue (counter).
pub const MESSAGES_QUEUED_TOTAL: &str = "messages_queued_total";
/// Messages lost to a full queue or encode failure (counter, labels: reason).
pub const MESSAGES_DROPPED_TOTAL: &str = "messages_dropped_total";
/// Failed frame writes to a bound connection (counter).
pub const DELIVERY_WRITE_FAILURES_TOTAL: &str = "delivery_write_failures_total";
/// Messages waiting across all pending queues (gauge).
pub const PENDING_MESSAGES: &str = "pending_messages";
/// Durable-store appends that failed or timed out (counter).
pub const STORE_APPEND_FAILURES_TOTAL: &str = "store_append_failures_total";
