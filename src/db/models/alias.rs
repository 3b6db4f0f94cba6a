// src/db/models/alias.rs

//! Alias model - a player name as reported within one event/section/PIN
//! scope, and the merge tri-state that ties aliases to persons.
//!
//! The identity state is held in two columns mirroring each other:
//!
//! - MAIN: merge = 'false', alias_list = JSON array of the PKs merged in
//! - MERGED: merge = '<main pk>', alias_list = '<main pk>'
//! - UNRESOLVED: merge = NULL, alias_list = NULL
//!
//! A person is the MAIN alias reached by following merge; chains have
//! depth one, merges into merges are never written.

use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};

/// The merge tri-state of an alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Not yet decided whether this is a new person or an existing one
    Unresolved,
    /// Canonical record for a person; holds the PKs merged into it
    Main { aliases: Vec<i64> },
    /// Merged into the MAIN record with the given PK
    Merged { main: i64 },
}

impl Identity {
    /// Column values (merge, alias_list) for this state
    fn pack(&self) -> Result<(Option<String>, Option<String>)> {
        match self {
            Identity::Unresolved => Ok((None, None)),
            Identity::Main { aliases } => {
                let list = serde_json::to_string(aliases)
                    .map_err(|e| Error::StoreCorrupt(format!("alias list encode: {e}")))?;
                Ok((Some("false".to_string()), Some(list)))
            }
            Identity::Merged { main } => {
                Ok((Some(main.to_string()), Some(main.to_string())))
            }
        }
    }

    /// Decode the column pair; any other combination is store corruption
    fn unpack(merge: Option<String>, alias_list: Option<String>) -> Result<Self> {
        match merge.as_deref() {
            None => Ok(Identity::Unresolved),
            Some("false") => {
                let list = alias_list.unwrap_or_else(|| "[]".to_string());
                let aliases: Vec<i64> = serde_json::from_str(&list).map_err(|_| {
                    Error::StoreCorrupt(format!("main alias has alias_list {list:?}"))
                })?;
                Ok(Identity::Main { aliases })
            }
            Some(other) => {
                let main: i64 = other.parse().map_err(|_| {
                    Error::StoreCorrupt(format!("alias merge field holds {other:?}"))
                })?;
                Ok(Identity::Merged { main })
            }
        }
    }
}

/// A player-name-as-reported, the atomic identity unit
#[derive(Debug, Clone)]
pub struct Alias {
    pub id: Option<i64>,
    pub name: String,
    pub event_id: i64,
    pub section_id: Option<i64>,
    pub pin: Option<String>,
    pub affiliation_id: Option<i64>,
    pub identity: Identity,
}

impl Alias {
    pub fn new(name: String, event_id: i64) -> Self {
        Self {
            id: None,
            name,
            event_id,
            section_id: None,
            pin: None,
            affiliation_id: None,
            identity: Identity::Unresolved,
        }
    }

    /// Insert this alias into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        let (merge, alias_list) = self.identity.pack()?;
        conn.execute(
            "INSERT INTO aliases
             (name, event_id, section_id, pin, affiliation_id, merge, alias_list)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &self.name,
                self.event_id,
                self.section_id,
                &self.pin,
                self.affiliation_id,
                merge,
                alias_list,
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find an alias by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, event_id, section_id, pin, affiliation_id, merge, alias_list
             FROM aliases WHERE id = ?1",
        )?;
        let row = stmt
            .query_row([id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            })
            .optional()?;
        match row {
            None => Ok(None),
            Some((id, name, event_id, section_id, pin, affiliation_id, merge, alias_list)) => {
                Ok(Some(Self {
                    id: Some(id),
                    name,
                    event_id,
                    section_id,
                    pin,
                    affiliation_id,
                    identity: Identity::unpack(merge, alias_list)?,
                }))
            }
        }
    }

    /// Find an alias by its identifying tuple (name, event, section, pin)
    pub fn find_identity(
        conn: &Connection,
        name: &str,
        event_id: i64,
        section_id: Option<i64>,
        pin: Option<&str>,
    ) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id FROM aliases
             WHERE name = ?1 AND event_id = ?2
               AND section_id IS ?3 AND pin IS ?4",
        )?;
        let id: Option<i64> = stmt
            .query_row(params![name, event_id, section_id, pin], |row| row.get(0))
            .optional()?;
        match id {
            Some(id) => Self::find_by_id(conn, id),
            None => Ok(None),
        }
    }

    /// Locate the alias for an identity tuple, creating an UNRESOLVED
    /// record on first sighting.
    pub fn intern(
        conn: &Connection,
        name: &str,
        event_id: i64,
        section_id: Option<i64>,
        pin: Option<&str>,
        affiliation_id: Option<i64>,
    ) -> Result<i64> {
        if let Some(existing) = Self::find_identity(conn, name, event_id, section_id, pin)? {
            return Ok(existing.id.unwrap_or_default());
        }
        let mut alias = Alias {
            id: None,
            name: name.to_string(),
            event_id,
            section_id,
            pin: pin.map(str::to_string),
            affiliation_id,
            identity: Identity::Unresolved,
        };
        alias.insert(conn)
    }

    /// Rewrite the identity columns of an alias
    pub fn set_identity(conn: &Connection, id: i64, identity: &Identity) -> Result<()> {
        let (merge, alias_list) = identity.pack()?;
        conn.execute(
            "UPDATE aliases SET merge = ?1, alias_list = ?2 WHERE id = ?3",
            params![merge, alias_list, id],
        )?;
        Ok(())
    }

    /// Resolve an alias to its person: the MAIN alias reached by following
    /// merge. Chains deeper than one step are store corruption.
    pub fn person(conn: &Connection, id: i64) -> Result<Self> {
        let alias = Self::find_by_id(conn, id)?
            .ok_or_else(|| Error::StoreCorrupt(format!("alias {id} does not exist")))?;
        match alias.identity {
            Identity::Unresolved | Identity::Main { .. } => Ok(alias),
            Identity::Merged { main } => {
                let main_alias = Self::find_by_id(conn, main)?.ok_or_else(|| {
                    Error::StoreCorrupt(format!("alias {id} merged into missing {main}"))
                })?;
                match main_alias.identity {
                    Identity::Main { .. } => Ok(main_alias),
                    _ => Err(Error::StoreCorrupt(format!(
                        "alias {id} merged into {main} which is not a main record"
                    ))),
                }
            }
        }
    }

    /// Declare an UNRESOLVED alias to be a new person
    pub fn declare_new(conn: &Connection, id: i64) -> Result<()> {
        Self::set_identity(conn, id, &Identity::Main { aliases: Vec::new() })
    }

    /// Merge one alias into a MAIN record. The pair update is atomic with
    /// respect to the caller's transaction: the main's list gains the PK
    /// and the merged record back-points to the main.
    pub fn merge_into(conn: &Connection, alias_id: i64, main_id: i64) -> Result<()> {
        let main = Self::find_by_id(conn, main_id)?
            .ok_or_else(|| Error::StoreCorrupt(format!("main alias {main_id} missing")))?;
        let mut aliases = match main.identity {
            Identity::Main { aliases } => aliases,
            Identity::Unresolved => Vec::new(),
            Identity::Merged { main } => {
                return Err(Error::StoreCorrupt(format!(
                    "cannot merge {alias_id} into {main_id}: already merged into {main}"
                )));
            }
        };
        if !aliases.contains(&alias_id) {
            aliases.push(alias_id);
            aliases.sort_unstable();
        }
        Self::set_identity(conn, main_id, &Identity::Main { aliases })?;
        Self::set_identity(conn, alias_id, &Identity::Merged { main: main_id })?;
        Ok(())
    }

    /// Break a merge, returning the alias to a MAIN record of its own.
    ///
    /// Refused while a federation code is linked to the alias; the code
    /// map is keyed by person and would be orphaned.
    pub fn break_merge(conn: &Connection, alias_id: i64) -> Result<()> {
        let alias = Self::find_by_id(conn, alias_id)?
            .ok_or_else(|| Error::StoreCorrupt(format!("alias {alias_id} missing")))?;
        let Identity::Merged { main } = alias.identity else {
            return Err(Error::ValidationError(format!(
                "alias {alias_id} is not merged into another record"
            )));
        };
        let linked: Option<i64> = conn
            .query_row(
                "SELECT id FROM code_maps WHERE alias_id = ?1",
                [alias_id],
                |row| row.get(0),
            )
            .optional()?;
        if linked.is_some() {
            return Err(Error::ValidationError(format!(
                "alias {alias_id} is linked to a federation code and cannot be split"
            )));
        }
        let main_rec = Self::find_by_id(conn, main)?
            .ok_or_else(|| Error::StoreCorrupt(format!("main alias {main} missing")))?;
        if let Identity::Main { mut aliases } = main_rec.identity {
            aliases.retain(|pk| *pk != alias_id);
            Self::set_identity(conn, main, &Identity::Main { aliases })?;
        }
        Self::set_identity(conn, alias_id, &Identity::Main { aliases: Vec::new() })
    }

    /// List every alias in the store, in PK order
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare("SELECT id FROM aliases ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut aliases = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(alias) = Self::find_by_id(conn, id)? {
                aliases.push(alias);
            }
        }
        Ok(aliases)
    }
}
