// src/db/models/code_map.rs

//! CodeMap model - links a person (MAIN alias) to a federation player
//! code, plus the workspace for a proposed new code and name.
//!
//! At most one map exists per person. A confirmed player_code and the
//! proposal workspace are mutually exclusive: once the federation code is
//! known the ecf_code/ecf_name slots must be empty.

use crate::db::models::{Alias, EcfPlayer, Identity};
use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

/// Person-to-federation-code link record
#[derive(Debug, Clone)]
pub struct CodeMap {
    pub id: Option<i64>,
    /// PK of the MAIN alias of the person
    pub alias_id: i64,
    /// Denormalized snapshot of the player's name for display
    pub player_name: String,
    /// Confirmed federation code, once known
    pub player_code: Option<String>,
    /// Proposed code being edited ahead of submission
    pub ecf_code: Option<String>,
    /// Proposed federation-format name being edited ahead of submission
    pub ecf_name: Option<String>,
}

impl CodeMap {
    pub fn new(alias_id: i64, player_name: String) -> Self {
        Self {
            id: None,
            alias_id,
            player_name,
            player_code: None,
            ecf_code: None,
            ecf_name: None,
        }
    }

    fn check_invariants(&self, conn: &Connection) -> Result<()> {
        let alias = Alias::find_by_id(conn, self.alias_id)?
            .ok_or_else(|| Error::StoreCorrupt(format!("alias {} missing", self.alias_id)))?;
        if !matches!(alias.identity, Identity::Main { .. }) {
            return Err(Error::ValidationError(format!(
                "code map must reference a main alias, {} is not one",
                self.alias_id
            )));
        }
        if self.player_code.is_some() && (self.ecf_code.is_some() || self.ecf_name.is_some()) {
            return Err(Error::ValidationError(format!(
                "player {} has a confirmed code; the proposal workspace must be empty",
                self.player_name
            )));
        }
        if let Some(code) = &self.player_code {
            if let Some(player) = EcfPlayer::find_by_code(conn, code)? {
                if player.merge_into.is_some() {
                    return Err(Error::ValidationError(format!(
                        "grading code {code} was superseded and cannot be linked"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        self.check_invariants(conn)?;
        conn.execute(
            "INSERT INTO code_maps (alias_id, player_name, player_code, ecf_code, ecf_name)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.alias_id,
                &self.player_name,
                &self.player_code,
                &self.ecf_code,
                &self.ecf_name,
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn update(&self, conn: &Connection) -> Result<()> {
        self.check_invariants(conn)?;
        conn.execute(
            "UPDATE code_maps SET player_name = ?1, player_code = ?2, ecf_code = ?3, ecf_name = ?4
             WHERE alias_id = ?5",
            params![
                &self.player_name,
                &self.player_code,
                &self.ecf_code,
                &self.ecf_name,
                self.alias_id,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_alias(conn: &Connection, alias_id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, alias_id, player_name, player_code, ecf_code, ecf_name
             FROM code_maps WHERE alias_id = ?1",
        )?;
        let map = stmt.query_row([alias_id], Self::from_row).optional()?;
        Ok(map)
    }

    /// Maps whose confirmed code is still pending and whose proposal slot
    /// holds a code; candidates for promotion when feedback arrives.
    pub fn pending_proposals(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, alias_id, player_name, player_code, ecf_code, ecf_name
             FROM code_maps WHERE player_code IS NULL AND ecf_code IS NOT NULL
             ORDER BY alias_id",
        )?;
        let maps = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(maps)
    }

    /// Promote the proposed code to the confirmed slot, clearing the
    /// proposal workspace.
    pub fn promote(&mut self, conn: &Connection, code: &str) -> Result<()> {
        self.player_code = Some(code.to_string());
        self.ecf_code = None;
        self.ecf_name = None;
        self.update(conn)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            alias_id: row.get(1)?,
            player_name: row.get(2)?,
            player_code: row.get(3)?,
            ecf_code: row.get(4)?,
            ecf_name: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::models::Event;

    fn setup_main_alias(conn: &Connection) -> i64 {
        let event_id = Event::intern(conn, "Open", "2024-01-01", "2024-01-07").unwrap();
        let id = Alias::intern(conn, "Smith A", event_id, None, Some("1"), None).unwrap();
        Alias::declare_new(conn, id).unwrap();
        id
    }

    #[test]
    fn test_requires_main_alias() {
        let conn = db::open_in_memory().unwrap();
        let event_id = Event::intern(&conn, "Open", "2024-01-01", "2024-01-07").unwrap();
        let unresolved = Alias::intern(&conn, "Smith A", event_id, None, None, None).unwrap();
        let mut map = CodeMap::new(unresolved, "Smith A".to_string());
        assert!(map.insert(&conn).is_err());
    }

    #[test]
    fn test_code_and_proposal_mutually_exclusive() {
        let conn = db::open_in_memory().unwrap();
        let alias_id = setup_main_alias(&conn);
        let mut map = CodeMap::new(alias_id, "Smith A".to_string());
        map.player_code = Some("123456A".to_string());
        map.ecf_name = Some("Smith, A".to_string());
        assert!(map.insert(&conn).is_err());
    }

    #[test]
    fn test_promote_clears_workspace() {
        let conn = db::open_in_memory().unwrap();
        let alias_id = setup_main_alias(&conn);
        let mut map = CodeMap::new(alias_id, "Smith A".to_string());
        map.ecf_code = Some("123456A".to_string());
        map.ecf_name = Some("Smith, A".to_string());
        map.insert(&conn).unwrap();

        map.promote(&conn, "123456A").unwrap();
        let loaded = CodeMap::find_by_alias(&conn, alias_id).unwrap().unwrap();
        assert_eq!(loaded.player_code.as_deref(), Some("123456A"));
        assert_eq!(loaded.ecf_code, None);
        assert_eq!(loaded.ecf_name, None);
    }
}
