//! Server configuration.

use std::time::Duration;

use courier_settings::{CourierSettings, OverflowPolicy};

/// Runtime configuration for [`CourierServer`](crate::server::CourierServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Interval between server pings and liveness checks.
    pub heartbeat_interval: Duration,
    /// Close connections silent for longer than this.
    pub heartbeat_timeout: Duration,
    /// Bound on one outbound frame write.
    pub write_timeout: Duration,
    /// Capacity of each connection's outbound channel.
    pub outbound_buffer: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Close the previous connection when a user reconnects.
    pub close_superseded: bool,
    /// Bound on the durable-store write for one inbound message.
    pub append_timeout: Duration,
    /// Per-user pending queue capacity (`None` = unbounded).
    pub queue_capacity: Option<usize>,
    /// What a full queue does with a new message.
    pub queue_overflow: OverflowPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            write_timeout: Duration::from_secs(10),
            outbound_buffer: 256,
            max_message_size: 64 * 1024,
            close_superseded: true,
            append_timeout: Duration::from_secs(2),
            queue_capacity: None,
            queue_overflow: OverflowPolicy::DropOldest,
        }
    }
}

impl From<&CourierSettings> for ServerConfig {
    fn from(settings: &CourierSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            heartbeat_interval: Duration::from_millis(server.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(server.heartbeat_timeout_ms),
            write_timeout: Duration::from_millis(server.write_timeout_ms),
            outbound_buffer: server.outbound_buffer,
            max_message_size: server.max_message_size,
            close_superseded: server.close_superseded,
            append_timeout: Duration::from_millis(settings.store.append_timeout_ms),
            queue_capacity: settings.queue.max_per_user,
            queue_overflow: settings.queue.overflow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_ephemeral() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_queue_is_unbounded() {
        assert_eq!(ServerConfig::default().queue_capacity, None);
    }

    #[test]
    fn from_settings() {
        let mut settings = CourierSettings::default();
        settings.server.port = 9000;
        settings.server.heartbeat_interval_ms = 1_500;
        settings.server.close_superseded = false;
        settings.queue.max_per_user = Some(7);
        settings.queue.overflow = OverflowPolicy::Reject;
        settings.store.append_timeout_ms = 250;

        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.heartbeat_interval, Duration::from_millis(1_500));
        assert!(!cfg.close_superseded);
        assert_eq!(cfg.queue_capacity, Some(7));
        assert_eq!(cfg.queue_overflow, OverflowPolicy::Reject);
        assert_eq!(cfg.append_timeout, Duration::from_millis(250));
    }
}
