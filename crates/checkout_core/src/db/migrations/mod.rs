//! Order schema installation.
//!
//! # Responsibility
//! - Install the `orders` / `order_items` schema on fresh databases.
//! - Refuse databases written by a newer schema.
//!
//! # Invariants
//! - The installed schema version is mirrored to `PRAGMA user_version`.
//! - Installation runs in one transaction; a failure leaves version 0.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

const SCHEMA_VERSION: u32 = 1;
const SCHEMA_SQL: &str = include_str!("0001_orders.sql");

/// Returns the schema version this binary installs.
pub fn latest_version() -> u32 {
    SCHEMA_VERSION
}

/// Installs the order schema unless the database already carries it.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let found: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    match found {
        SCHEMA_VERSION => Ok(()),
        0 => {
            let tx = conn.transaction()?;
            tx.execute_batch(SCHEMA_SQL)?;
            tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
            tx.commit()?;
            info!("event=db_migrate module=db status=ok to_version={SCHEMA_VERSION}");
            Ok(())
        }
        newer => Err(DbError::UnsupportedSchemaVersion {
            db_version: newer,
            latest_supported: SCHEMA_VERSION,
        }),
    }
}
