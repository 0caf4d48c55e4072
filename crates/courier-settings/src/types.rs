//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the keys it changes.
//!
//! ```json
//! {
//!   "server": { "port": 9000 },
//!   "queue": { "maxPerUser": 1000, "overflow": "drop_oldest" }
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Root settings for the relay.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourierSettings {
    /// Listener and per-connection settings.
    pub server: ServerSettings,
    /// Pending queue bounds.
    pub queue: QueueSettings,
    /// Durable message store.
    pub store: StoreSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Listener and per-connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (0 picks an ephemeral port).
    pub port: u16,
    /// Interval between server pings, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// A connection silent for this long is closed, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Upper bound on a single outbound frame write, in milliseconds.
    pub write_timeout_ms: u64,
    /// Capacity of each connection's outbound channel.
    pub outbound_buffer: usize,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Close the old connection when a user connects again.
    pub close_superseded: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            write_timeout_ms: 10_000,
            outbound_buffer: 256,
            max_message_size: 64 * 1024,
            close_superseded: true,
        }
    }
}

/// What to do when a bounded queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued message and accept the new one.
    #[default]
    DropOldest,
    /// Refuse the new message.
    Reject,
}

/// Pending queue settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueSettings {
    /// Per-user capacity. `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_per_user: Option<usize>,
    /// Applied only when `max_per_user` is set.
    pub overflow: OverflowPolicy,
}

/// Durable message store settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Path to the `SQLite` database file.
    pub db_path: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// `SQLite` busy timeout, in milliseconds.
    pub busy_timeout_ms: u64,
    /// How long a session waits for one append, in milliseconds.
    pub append_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "courier.db".to_string(),
            pool_size: 4,
            busy_timeout_ms: 5_000,
            append_timeout_ms: 2_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level or `EnvFilter` directive.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
