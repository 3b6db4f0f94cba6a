// src/db/models/event.rs

//! Event model - a competition occurrence
//!
//! An event is identified by the (name, startdate, enddate) triple. Its
//! section set grows monotonically as sub-reports arrive. The submission
//! header (federation event code plus running submission index) is a
//! separate record keyed by the event.

use crate::db::models::Name;
use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// A competition occurrence, unique on (name, startdate, enddate)
#[derive(Debug, Clone)]
pub struct Event {
    pub id: Option<i64>,
    pub name_id: i64,
    pub startdate: String,
    pub enddate: String,
}

impl Event {
    pub fn new(name_id: i64, startdate: String, enddate: String) -> Self {
        Self {
            id: None,
            name_id,
            startdate,
            enddate,
        }
    }

    /// Insert this event into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO events (name_id, startdate, enddate) VALUES (?1, ?2, ?3)",
            params![self.name_id, &self.startdate, &self.enddate],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find an event by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn
            .prepare("SELECT id, name_id, startdate, enddate FROM events WHERE id = ?1")?;
        let event = stmt.query_row([id], Self::from_row).optional()?;
        Ok(event)
    }

    /// Find an event by its identifying triple
    pub fn find_by_triple(
        conn: &Connection,
        name: &str,
        startdate: &str,
        enddate: &str,
    ) -> Result<Option<Self>> {
        let Some(name_rec) = Name::find_by_text(conn, name)? else {
            return Ok(None);
        };
        let mut stmt = conn.prepare(
            "SELECT id, name_id, startdate, enddate FROM events
             WHERE name_id = ?1 AND startdate = ?2 AND enddate = ?3",
        )?;
        let event = stmt
            .query_row(params![name_rec.id, startdate, enddate], Self::from_row)
            .optional()?;
        Ok(event)
    }

    /// Return the event for a triple, creating it on first ingest
    pub fn intern(
        conn: &Connection,
        name: &str,
        startdate: &str,
        enddate: &str,
    ) -> Result<i64> {
        if let Some(existing) = Self::find_by_triple(conn, name, startdate, enddate)? {
            return Ok(existing.id.unwrap_or_default());
        }
        let name_id = Name::intern(conn, name)?;
        let mut event = Event::new(name_id, startdate.to_string(), enddate.to_string());
        event.insert(conn)
    }

    /// The event's display name
    pub fn name(&self, conn: &Connection) -> Result<String> {
        Ok(Name::find_by_id(conn, self.name_id)?
            .map(|n| n.name)
            .unwrap_or_default())
    }

    /// Add a section name to this event. Inserting an existing section is
    /// a no-op; the section set only grows.
    pub fn add_section(conn: &Connection, event_id: i64, section: &str) -> Result<i64> {
        let name_id = Name::intern(conn, section)?;
        conn.execute(
            "INSERT OR IGNORE INTO event_sections (event_id, name_id) VALUES (?1, ?2)",
            params![event_id, name_id],
        )?;
        Ok(name_id)
    }

    /// List the section names recorded for an event, in label order
    pub fn sections(conn: &Connection, event_id: i64) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT n.name FROM event_sections s JOIN names n ON n.id = s.name_id
             WHERE s.event_id = ?1 ORDER BY n.name",
        )?;
        let sections = stmt
            .query_map([event_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sections)
    }

    /// List all events with their display names
    pub fn list_all(conn: &Connection) -> Result<Vec<(Self, String)>> {
        let mut stmt = conn.prepare(
            "SELECT e.id, e.name_id, e.startdate, e.enddate, n.name
             FROM events e JOIN names n ON n.id = e.name_id
             ORDER BY n.name, e.startdate",
        )?;
        let events = stmt
            .query_map([], |row| {
                Ok((
                    Event {
                        id: Some(row.get(0)?),
                        name_id: row.get(1)?,
                        startdate: row.get(2)?,
                        enddate: row.get(3)?,
                    },
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name_id: row.get(1)?,
            startdate: row.get(2)?,
            enddate: row.get(3)?,
        })
    }
}

/// Submission header for an event: the federation event code and the
/// running index used to number submission files
#[derive(Debug, Clone)]
pub struct EventDetails {
    pub id: Option<i64>,
    pub event_id: i64,
    pub event_code: String,
    pub submission_index: i64,
    pub results_officer: Option<String>,
    pub results_officer_address: Option<String>,
    pub treasurer: Option<String>,
    pub treasurer_address: Option<String>,
}

impl EventDetails {
    pub fn new(event_id: i64, event_code: String) -> Self {
        Self {
            id: None,
            event_id,
            event_code,
            submission_index: 0,
            results_officer: None,
            results_officer_address: None,
            treasurer: None,
            treasurer_address: None,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO event_details
             (event_id, event_code, submission_index, results_officer,
              results_officer_address, treasurer, treasurer_address)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.event_id,
                &self.event_code,
                self.submission_index,
                &self.results_officer,
                &self.results_officer_address,
                &self.treasurer,
                &self.treasurer_address,
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_event(conn: &Connection, event_id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, event_id, event_code, submission_index, results_officer,
                    results_officer_address, treasurer, treasurer_address
             FROM event_details WHERE event_id = ?1",
        )?;
        let details = stmt.query_row([event_id], Self::from_row).optional()?;
        Ok(details)
    }

    /// Bump the submission index and return the new value. Runs inside the
    /// same transaction that writes the submission file.
    pub fn bump_submission_index(conn: &Connection, event_id: i64) -> Result<i64> {
        conn.execute(
            "UPDATE event_details SET submission_index = submission_index + 1
             WHERE event_id = ?1",
            [event_id],
        )?;
        let index: i64 = conn.query_row(
            "SELECT submission_index FROM event_details WHERE event_id = ?1",
            [event_id],
            |row| row.get(0),
        )?;
        Ok(index)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            event_id: row.get(1)?,
            event_code: row.get(2)?,
            submission_index: row.get(3)?,
            results_officer: row.get(4)?,
            results_officer_address: row.get(5)?,
            treasurer: row.get(6)?,
            treasurer_address: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_event_triple_intern() {
        let conn = db::open_in_memory().unwrap();
        let a = Event::intern(&conn, "Open", "2024-01-01", "2024-01-07").unwrap();
        let b = Event::intern(&conn, "Open", "2024-01-01", "2024-01-07").unwrap();
        assert_eq!(a, b);
        let c = Event::intern(&conn, "Open", "2024-02-01", "2024-02-07").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_sections_grow_monotonically() {
        let conn = db::open_in_memory().unwrap();
        let event_id = Event::intern(&conn, "Open", "2024-01-01", "2024-01-07").unwrap();
        Event::add_section(&conn, event_id, "Main").unwrap();
        Event::add_section(&conn, event_id, "Minor").unwrap();
        Event::add_section(&conn, event_id, "Main").unwrap();
        assert_eq!(Event::sections(&conn, event_id).unwrap(), vec!["Main", "Minor"]);
    }

    #[test]
    fn test_bump_submission_index() {
        let conn = db::open_in_memory().unwrap();
        let event_id = Event::intern(&conn, "Open", "2024-01-01", "2024-01-07").unwrap();
        let mut details = EventDetails::new(event_id, "123456".to_string());
        details.insert(&conn).unwrap();
        assert_eq!(EventDetails::bump_submission_index(&conn, event_id).unwrap(), 1);
        assert_eq!(EventDetails::bump_submission_index(&conn, event_id).unwrap(), 2);
    }
}
