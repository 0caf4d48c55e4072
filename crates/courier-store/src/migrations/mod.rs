//! Embedded schema, versioned through `PRAGMA user_version`.
//!
//! `SCHEMA[i]` upgrades the database from version `i` to `i + 1`. Each step
//! runs in its own transaction together with the `user_version` bump, so a
//! crash leaves the database at a whole version.

use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

use crate::errors::{Result, StoreError};

const SCHEMA: &[&str] = &[include_str!("v001_messages.sql")];

/// Bring the schema up to date. Returns the number of steps applied.
pub fn run_migrations(conn: &mut Connection) -> Result<u32> {
    let from = current_version(conn)?;
    let to = latest_version();
    if from > to {
        return Err(StoreError::Migration {
            message: format!("database is at v{from}, newer than this build (v{to})"),
        });
    }

    for version in from..to {
        let step = version + 1;
        info!(version = step, "migrating message store");
        apply(conn, step, SCHEMA[version as usize]).map_err(|e| StoreError::Migration {
            message: format!("v{step:03}: {e}"),
        })?;
    }
    Ok(to - from)
}

/// Schema version recorded in the database file (0 when fresh).
pub fn current_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    u32::try_from(SCHEMA.len()).unwrap_or(u32::MAX)
}

fn apply(conn: &mut Connection, version: u32, sql: &str) -> rusqlite::Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch(sql)?;
    tx.pragma_update(None, "user_version", version)?;
    tx.commit()
}
