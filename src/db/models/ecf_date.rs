// src/db/models/ecf_date.rs

//! Provenance stamp for a federation data load

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

/// Which master list a load refreshed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcfObjType {
    Player,
    Club,
}

impl EcfObjType {
    pub fn as_str(&self) -> &str {
        match self {
            EcfObjType::Player => "player",
            EcfObjType::Club => "club",
        }
    }
}

impl FromStr for EcfObjType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "player" => Ok(EcfObjType::Player),
            "club" => Ok(EcfObjType::Club),
            _ => Err(format!("Invalid ECF object type: {s}")),
        }
    }
}

/// One row per applied federation data load
#[derive(Debug, Clone)]
pub struct EcfDate {
    pub id: Option<i64>,
    pub objtype: EcfObjType,
    pub txntype: String,
    /// Publication date stated by the federation
    pub ecf_date: String,
    /// Date the load was applied on this installation
    pub applied_date: String,
}

impl EcfDate {
    pub fn new(objtype: EcfObjType, txntype: String, ecf_date: String, applied_date: String) -> Self {
        Self {
            id: None,
            objtype,
            txntype,
            ecf_date,
            applied_date,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO ecf_dates (objtype, txntype, ecf_date, applied_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                self.objtype.as_str(),
                &self.txntype,
                &self.ecf_date,
                &self.applied_date,
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// The most recent load stamp for a list type
    pub fn latest(conn: &Connection, objtype: EcfObjType) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, objtype, txntype, ecf_date, applied_date FROM ecf_dates
             WHERE objtype = ?1 ORDER BY id DESC LIMIT 1",
        )?;
        let date = stmt
            .query_row([objtype.as_str()], Self::from_row)
            .optional()?;
        Ok(date)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let objtype_str: String = row.get(1)?;
        let objtype = objtype_str.parse::<EcfObjType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;
        Ok(Self {
            id: Some(row.get(0)?),
            objtype,
            txntype: row.get(2)?,
            ecf_date: row.get(3)?,
            applied_date: row.get(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_latest_returns_most_recent() {
        let conn = db::open_in_memory().unwrap();
        EcfDate::new(
            EcfObjType::Player,
            "rating-list".to_string(),
            "2024-01-01".to_string(),
            "2024-01-03".to_string(),
        )
        .insert(&conn)
        .unwrap();
        EcfDate::new(
            EcfObjType::Player,
            "rating-list".to_string(),
            "2024-02-01".to_string(),
            "2024-02-02".to_string(),
        )
        .insert(&conn)
        .unwrap();

        let latest = EcfDate::latest(&conn, EcfObjType::Player).unwrap().unwrap();
        assert_eq!(latest.ecf_date, "2024-02-01");
        assert!(EcfDate::latest(&conn, EcfObjType::Club).unwrap().is_none());
    }
}
