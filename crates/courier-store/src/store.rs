//! The [`MessageStore`] trait and its `SQLite` implementation.
//!
//! Appends are write-through audit records: one row per decoded inbound
//! message, no retries. Callers treat failures as log-only.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use courier_core::{Message, UserId};
use rusqlite::{Connection, params, types::Type};
use tracing::{debug, instrument};

use crate::connection::{self, ConnectionConfig, ConnectionPool};
use crate::errors::{Result, StoreError};
use crate::migrations;

/// Durable sink for relayed messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist one message.
    async fn append(&self, message: &Message) -> Result<()>;

    /// Most recent `limit` messages sent or received by `user`, oldest first.
    async fn recent_for_user(&self, user: &UserId, limit: usize) -> Result<Vec<Message>>;
}

/// Settings for [`SqliteMessageStore`].
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Pool sizing and pragmas.
    pub connection: ConnectionConfig,
    /// Bound on each async operation.
    pub operation_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            operation_timeout: Duration::from_secs(2),
        }
    }
}

/// `SQLite`-backed [`MessageStore`].
#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: ConnectionPool,
    timeout: Duration,
}

impl SqliteMessageStore {
    /// Open (or create) a database file and run migrations.
    pub fn open(path: &str, config: &StoreConfig) -> Result<Self> {
        let pool = connection::new_file(path, &config.connection)?;
        Self::from_pool(pool, config.operation_timeout)
    }

    /// In-memory database.
    pub fn in_memory(config: &StoreConfig) -> Result<Self> {
        let pool = connection::new_in_memory(&config.connection)?;
        Self::from_pool(pool, config.operation_timeout)
    }

    fn from_pool(pool: ConnectionPool, timeout: Duration) -> Result<Self> {
        {
            let mut conn = pool.get()?;
            let applied = migrations::run_migrations(&mut conn)?;
            debug!(applied, "message store ready");
        }
        Ok(Self { pool, timeout })
    }

    /// Total number of stored messages.
    pub async fn count(&self) -> Result<u64> {
        self.run(|conn| {
            conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
                .map_err(StoreError::from)
        })
        .await
    }

    /// Run `f` on a pooled connection off the async runtime, bounded by the
    /// configured timeout. A timed-out operation keeps running on the
    /// blocking pool; its result is discarded.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let task = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        });
        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    #[instrument(skip_all, fields(sender = %message.sender(), receiver = %message.receiver()))]
    async fn append(&self, message: &Message) -> Result<()> {
        let sender = message.sender().to_string();
        let receiver = message.receiver().to_string();
        let content = message.content().to_owned();
        let time = format_time(message.timestamp());
        let stored_at = format_time(Utc::now());

        self.run(move |conn| {
            let _ = conn.execute(
                "INSERT INTO messages (sender, receiver, content, time, stored_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![sender, receiver, content, time, stored_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn recent_for_user(&self, user: &UserId, limit: usize) -> Result<Vec<Message>> {
        let user = user.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT sender, receiver, content, time FROM messages \
                 WHERE receiver = ?1 OR sender = ?1 \
                 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![user, limit], |row| {
                let time: String = row.get(3)?;
                let timestamp = parse_time(&time)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
                Ok(Message::with_timestamp(
                    UserId::from_string(row.get(0)?),
                    UserId::from_string(row.get(1)?),
                    row.get::<_, String>(2)?,
                    timestamp,
                ))
            })?;
            let mut messages = rows.collect::<std::result::Result<Vec<_>, _>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
    }
}

fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
