// src/db/models/ecf_club.rs

//! Federation master-list club record

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// A club known to the federation by a four-character code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcfClub {
    pub id: Option<i64>,
    pub code: String,
    pub name: String,
    pub active: bool,
    pub county: Option<String>,
}

impl EcfClub {
    pub fn new(code: String, name: String) -> Self {
        Self {
            id: None,
            code,
            name,
            active: true,
            county: None,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO ecf_clubs (code, name, active, county) VALUES (?1, ?2, ?3, ?4)",
            params![&self.code, &self.name, self.active as i64, &self.county],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_code(conn: &Connection, code: &str) -> Result<Option<Self>> {
        let mut stmt =
            conn.prepare("SELECT id, code, name, active, county FROM ecf_clubs WHERE code = ?1")?;
        let club = stmt.query_row([code], Self::from_row).optional()?;
        Ok(club)
    }

    pub fn update(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "UPDATE ecf_clubs SET name = ?1, active = ?2, county = ?3 WHERE code = ?4",
            params![&self.name, self.active as i64, &self.county, &self.code],
        )?;
        Ok(())
    }

    /// Mark every club row inactive ahead of a wholesale master-list load
    pub fn deactivate_all(conn: &Connection) -> Result<()> {
        conn.execute("UPDATE ecf_clubs SET active = 0", [])?;
        Ok(())
    }

    pub fn count(conn: &Connection) -> Result<i64> {
        let count = conn.query_row("SELECT count(*) FROM ecf_clubs", [], |row| row.get(0))?;
        Ok(count)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let active: i64 = row.get(3)?;
        Ok(Self {
            id: Some(row.get(0)?),
            code: row.get(1)?,
            name: row.get(2)?,
            active: active != 0,
            county: row.get(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_round_trip() {
        let conn = db::open_in_memory().unwrap();
        let mut club = EcfClub::new("1ABC".to_string(), "Kings Head".to_string());
        club.county = Some("Hampshire".to_string());
        club.insert(&conn).unwrap();

        let loaded = EcfClub::find_by_code(&conn, "1ABC").unwrap().unwrap();
        assert_eq!(loaded.name, "Kings Head");
        assert_eq!(loaded.county.as_deref(), Some("Hampshire"));
        assert!(loaded.active);
    }
}
