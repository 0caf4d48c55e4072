//! Error types for the durable message store.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The operation did not finish within its bound.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The blocking worker panicked or was cancelled.
    #[error("store worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
