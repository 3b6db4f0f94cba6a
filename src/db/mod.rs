// src/db/mod.rs

//! Database access layer for gradebase
//!
//! Provides open/init helpers, a transaction wrapper, the versioned
//! schema, the entity models, and the record-store adaptor used by the
//! identity and submission engines.

pub mod models;
pub mod schema;
pub mod store;

use crate::error::Result;
use rusqlite::{Connection, Transaction};
use std::path::Path;
use tracing::info;

/// Initialize a new database at the given path, creating parent
/// directories and applying all migrations.
pub fn init<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::migrate(&conn)?;
    info!("Initialized database at {}", path.display());
    Ok(())
}

/// Open an existing database, applying any pending migrations.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Open an in-memory database with the full schema. Used by tests.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Run a closure inside a transaction.
///
/// The transaction commits when the closure returns Ok and rolls back on
/// Err. Every mutating operation in the identity, submission, and
/// feedback engines expects to run under one of these.
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.transaction()?;
    let result = f(&tx)?;
    tx.commit()?;
    Ok(result)
}
