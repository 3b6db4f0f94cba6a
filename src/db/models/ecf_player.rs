// src/db/models/ecf_player.rs

//! Federation master-list player record

use crate::ecf::code;
use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

/// A player known to the federation by an issued grading code
#[derive(Debug, Clone)]
pub struct EcfPlayer {
    pub id: Option<i64>,
    pub code: String,
    pub name: String,
    pub active: bool,
    /// Ordered federation club codes, most recent first
    pub club_codes: Vec<String>,
    /// Set when the federation superseded this code by another
    pub merge_into: Option<String>,
}

impl EcfPlayer {
    pub fn new(code: String, name: String) -> Self {
        Self {
            id: None,
            code,
            name,
            active: true,
            club_codes: Vec::new(),
            merge_into: None,
        }
    }

    /// Insert this player, validating the grading-code check letter
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        if !code::is_valid_code(&self.code) {
            return Err(Error::ValidationError(format!(
                "Grading code {} fails the check-letter test",
                self.code
            )));
        }
        let clubs = serde_json::to_string(&self.club_codes)
            .map_err(|e| Error::StoreCorrupt(format!("club code list encode: {e}")))?;
        conn.execute(
            "INSERT INTO ecf_players (code, name, active, club_codes, merge_into)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &self.code,
                &self.name,
                self.active as i64,
                clubs,
                &self.merge_into,
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a player by grading code
    pub fn find_by_code(conn: &Connection, code: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, code, name, active, club_codes, merge_into
             FROM ecf_players WHERE code = ?1",
        )?;
        let player = stmt.query_row([code], Self::from_row).optional()?;
        Ok(player)
    }

    /// Replace the stored fields of this player's row
    pub fn update(&self, conn: &Connection) -> Result<()> {
        let clubs = serde_json::to_string(&self.club_codes)
            .map_err(|e| Error::StoreCorrupt(format!("club code list encode: {e}")))?;
        conn.execute(
            "UPDATE ecf_players SET name = ?1, active = ?2, club_codes = ?3, merge_into = ?4
             WHERE code = ?5",
            params![
                &self.name,
                self.active as i64,
                clubs,
                &self.merge_into,
                &self.code,
            ],
        )?;
        Ok(())
    }

    /// Mark every player row inactive. Used before a wholesale master-list
    /// load so that entries absent from the new list stay dark.
    pub fn deactivate_all(conn: &Connection) -> Result<()> {
        conn.execute("UPDATE ecf_players SET active = 0", [])?;
        Ok(())
    }

    /// Grading codes that appear as a merge source. A code in active use
    /// must never be listed here.
    pub fn merge_sources(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn
            .prepare("SELECT code FROM ecf_players WHERE merge_into IS NOT NULL ORDER BY code")?;
        let codes = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(codes)
    }

    pub fn count(conn: &Connection) -> Result<i64> {
        let count = conn.query_row("SELECT count(*) FROM ecf_players", [], |row| row.get(0))?;
        Ok(count)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let clubs_raw: String = row.get(4)?;
        let club_codes: Vec<String> = serde_json::from_str(&clubs_raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;
        let active: i64 = row.get(3)?;
        Ok(Self {
            id: Some(row.get(0)?),
            code: row.get(1)?,
            name: row.get(2)?,
            active: active != 0,
            club_codes,
            merge_into: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_insert_rejects_bad_check_letter() {
        let conn = db::open_in_memory().unwrap();
        let mut player = EcfPlayer::new("123456B".to_string(), "Smith, A".to_string());
        assert!(player.insert(&conn).is_err());
    }

    #[test]
    fn test_round_trip() {
        let conn = db::open_in_memory().unwrap();
        let mut player = EcfPlayer::new("123456A".to_string(), "Smith, A".to_string());
        player.club_codes = vec!["1ABC".to_string(), "2DEF".to_string()];
        player.insert(&conn).unwrap();

        let loaded = EcfPlayer::find_by_code(&conn, "123456A").unwrap().unwrap();
        assert!(loaded.active);
        assert_eq!(loaded.club_codes, vec!["1ABC", "2DEF"]);
        assert_eq!(loaded.merge_into, None);
    }

    #[test]
    fn test_deactivate_all() {
        let conn = db::open_in_memory().unwrap();
        EcfPlayer::new("123456A".to_string(), "Smith, A".to_string())
            .insert(&conn)
            .unwrap();
        EcfPlayer::deactivate_all(&conn).unwrap();
        let loaded = EcfPlayer::find_by_code(&conn, "123456A").unwrap().unwrap();
        assert!(!loaded.active);
    }
}
