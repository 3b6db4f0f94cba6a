// src/db/models/club_map.rs

//! ClubMap model - links an alias (not necessarily a MAIN record) to a
//! federation club or a proposed club.
//!
//! The confirmed club_code and the proposal workspace are mutually
//! exclusive, as for code maps. A map with a NULL payload everywhere is
//! an explicit "no club" assertion accepted by the submission pre-checks.

use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

/// Alias-to-federation-club link record
#[derive(Debug, Clone)]
pub struct ClubMap {
    pub id: Option<i64>,
    pub alias_id: i64,
    pub player_name: String,
    pub club_code: Option<String>,
    pub club_ecf_code: Option<String>,
    pub club_ecf_name: Option<String>,
}

impl ClubMap {
    pub fn new(alias_id: i64, player_name: String) -> Self {
        Self {
            id: None,
            alias_id,
            player_name,
            club_code: None,
            club_ecf_code: None,
            club_ecf_name: None,
        }
    }

    fn check_invariants(&self) -> Result<()> {
        if self.club_code.is_some()
            && (self.club_ecf_code.is_some() || self.club_ecf_name.is_some())
        {
            return Err(Error::ValidationError(format!(
                "player {} has a confirmed club code; the proposal workspace must be empty",
                self.player_name
            )));
        }
        Ok(())
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        self.check_invariants()?;
        conn.execute(
            "INSERT INTO club_maps
             (alias_id, player_name, club_code, club_ecf_code, club_ecf_name)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.alias_id,
                &self.player_name,
                &self.club_code,
                &self.club_ecf_code,
                &self.club_ecf_name,
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn update(&self, conn: &Connection) -> Result<()> {
        self.check_invariants()?;
        conn.execute(
            "UPDATE club_maps SET player_name = ?1, club_code = ?2,
             club_ecf_code = ?3, club_ecf_name = ?4 WHERE alias_id = ?5",
            params![
                &self.player_name,
                &self.club_code,
                &self.club_ecf_code,
                &self.club_ecf_name,
                self.alias_id,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_alias(conn: &Connection, alias_id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, alias_id, player_name, club_code, club_ecf_code, club_ecf_name
             FROM club_maps WHERE alias_id = ?1",
        )?;
        let map = stmt.query_row([alias_id], Self::from_row).optional()?;
        Ok(map)
    }

    /// Proposed clubs with no confirmed code yet
    pub fn pending_proposals(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, alias_id, player_name, club_code, club_ecf_code, club_ecf_name
             FROM club_maps WHERE club_code IS NULL AND club_ecf_code IS NOT NULL
             ORDER BY alias_id",
        )?;
        let maps = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(maps)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            alias_id: row.get(1)?,
            player_name: row.get(2)?,
            club_code: row.get(3)?,
            club_ecf_code: row.get(4)?,
            club_ecf_name: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::models::{Alias, Event};

    #[test]
    fn test_mutual_exclusion() {
        let conn = db::open_in_memory().unwrap();
        let event_id = Event::intern(&conn, "Open", "2024-01-01", "2024-01-07").unwrap();
        let alias_id = Alias::intern(&conn, "Smith A", event_id, None, None, None).unwrap();
        let mut map = ClubMap::new(alias_id, "Smith A".to_string());
        map.club_code = Some("1ABC".to_string());
        map.club_ecf_name = Some("Kings Head".to_string());
        assert!(map.insert(&conn).is_err());

        map.club_ecf_name = None;
        map.insert(&conn).unwrap();
        let loaded = ClubMap::find_by_alias(&conn, alias_id).unwrap().unwrap();
        assert_eq!(loaded.club_code.as_deref(), Some("1ABC"));
    }
}
