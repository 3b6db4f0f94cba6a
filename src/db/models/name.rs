// src/db/models/name.rs

//! Name model - shared string resources
//!
//! Event names, section names, team names, and club affiliations all
//! reference rows in the names table so that equal labels share one
//! record.

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row};

/// A canonicalized text label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub id: Option<i64>,
    pub name: String,
}

impl Name {
    pub fn new(name: String) -> Self {
        Self { id: None, name }
    }

    /// Insert this name into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute("INSERT INTO names (name) VALUES (?1)", [&self.name])?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a name by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare("SELECT id, name FROM names WHERE id = ?1")?;
        let name = stmt.query_row([id], Self::from_row).optional()?;
        Ok(name)
    }

    /// Find a name by its text
    pub fn find_by_text(conn: &Connection, text: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare("SELECT id, name FROM names WHERE name = ?1")?;
        let name = stmt.query_row([text], Self::from_row).optional()?;
        Ok(name)
    }

    /// Return the ID for a label, inserting it if not yet present
    pub fn intern(conn: &Connection, text: &str) -> Result<i64> {
        if let Some(existing) = Self::find_by_text(conn, text)? {
            return Ok(existing.id.unwrap_or_default());
        }
        let mut name = Name::new(text.to_string());
        name.insert(conn)
    }

    /// Resolve an optional name ID to its text
    pub fn text_for(conn: &Connection, id: Option<i64>) -> Result<Option<String>> {
        match id {
            Some(id) => Ok(Self::find_by_id(conn, id)?.map(|n| n.name)),
            None => Ok(None),
        }
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
        })
    }
}
