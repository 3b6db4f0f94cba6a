// src/identity/update.rs

//! Identity-graph updater
//!
//! Applies an import's merge groups and identification decisions to the
//! local alias records. Every operation here runs under a transaction
//! opened by the caller; nothing commits on its own. All operations are
//! idempotent: replaying the same report leaves the store unchanged.

use crate::db::models::{Alias, Event, Identity, Name};
use crate::error::{Error, Result};
use crate::exchange::report::{ImportReport, PlayerKey};
use rusqlite::Connection;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Locate the local alias for a wire identity tuple.
///
/// Team players are stored without a section scope while their wire key
/// carries the club in the section slot, so a miss on the section-keyed
/// lookup retries with no section.
fn locate_alias(conn: &Connection, key: &PlayerKey) -> Result<Option<Alias>> {
    let (name, event, startdate, enddate, section, pin) = (
        &key.0, &key.1, &key.2, &key.3, &key.4, key.5.as_deref(),
    );
    let Some(event) = Event::find_by_triple(conn, event, startdate, enddate)? else {
        return Ok(None);
    };
    let event_id = event.id.unwrap_or_default();
    if let Some(section) = section {
        if let Some(label) = Name::find_by_text(conn, section)? {
            if let Some(alias) = Alias::find_identity(conn, name, event_id, label.id, pin)? {
                return Ok(Some(alias));
            }
        }
    }
    Alias::find_identity(conn, name, event_id, None, pin)
}

/// Locate or create the local alias for a wire identity tuple
fn intern_alias(conn: &Connection, key: &PlayerKey) -> Result<i64> {
    if let Some(alias) = locate_alias(conn, key)? {
        return alias
            .id
            .ok_or_else(|| Error::StoreCorrupt("alias record without a PK".to_string()));
    }
    let event_id = Event::intern(conn, &key.1, &key.2, &key.3)?;
    let section_id = match &key.4 {
        Some(section) => Some(Event::add_section(conn, event_id, section)?),
        None => None,
    };
    Alias::intern(conn, &key.0, event_id, section_id, key.5.as_deref(), None)
}

/// The wire identity tuple of a stored alias
fn key_for_alias(conn: &Connection, alias: &Alias) -> Result<PlayerKey> {
    let event = Event::find_by_id(conn, alias.event_id)?.ok_or_else(|| {
        Error::StoreCorrupt(format!("alias references missing event {}", alias.event_id))
    })?;
    Ok((
        alias.name.clone(),
        event.name(conn)?,
        event.startdate.clone(),
        event.enddate.clone(),
        Name::text_for(conn, alias.section_id)?,
        alias.pin.clone(),
    ))
}

fn pk(alias: &Alias) -> Result<i64> {
    alias
        .id
        .ok_or_else(|| Error::StoreCorrupt("alias record without a PK".to_string()))
}

/// Merge one person wholesale into another. Members of the source
/// person re-point to the target first so merge chains stay depth one.
fn merge_person_into(conn: &Connection, from_main: i64, into_main: i64) -> Result<()> {
    if from_main == into_main {
        return Ok(());
    }
    let from = Alias::find_by_id(conn, from_main)?
        .ok_or_else(|| Error::StoreCorrupt(format!("alias {from_main} missing")))?;
    if let Identity::Main { aliases } = &from.identity {
        for member in aliases {
            Alias::merge_into(conn, *member, into_main)?;
        }
    }
    Alias::merge_into(conn, from_main, into_main)
}

/// Apply the import's export-side merge groups: each group's first
/// alias becomes (or stays) a person and the rest merge into it.
pub fn identify_players(conn: &Connection, report: &ImportReport) -> Result<usize> {
    let mut changed = 0;
    for (main_key, group) in &report.localplayer {
        let main_id = intern_alias(conn, main_key)?;
        let person = Alias::person(conn, main_id)?;
        let target = pk(&person)?;
        if person.identity == Identity::Unresolved {
            Alias::declare_new(conn, target)?;
            changed += 1;
        }
        for member in group {
            if member == main_key {
                continue;
            }
            let member_id = intern_alias(conn, member)?;
            if member_id == target {
                continue;
            }
            let alias = Alias::find_by_id(conn, member_id)?
                .ok_or_else(|| Error::StoreCorrupt(format!("alias {member_id} missing")))?;
            match alias.identity {
                Identity::Unresolved => {
                    Alias::merge_into(conn, member_id, target)?;
                    changed += 1;
                }
                // Already resolved; conflicting resolutions are left for
                // merge_players and the consistency checks
                Identity::Main { .. } | Identity::Merged { .. } => {}
            }
        }
    }
    debug!("identify_players changed {changed} records");
    Ok(changed)
}

/// Perform the merges implied by matches between the export-side and
/// import-side identity graphs, then apply the sender's identification
/// decisions.
pub fn merge_players(conn: &Connection, report: &ImportReport) -> Result<usize> {
    let mut changed = 0;

    for (gp, main_key) in &report.gameplayermerge {
        // Pairs the sender decided explicitly are handled below
        if report.new_to_known.contains_key(gp) {
            continue;
        }
        let Some(group) = report.localplayer.get(main_key) else {
            continue;
        };
        let mut resolved: Option<i64> = None;
        for member in group {
            if let Some(alias) = locate_alias(conn, member)? {
                let person = Alias::person(conn, pk(&alias)?)?;
                if matches!(person.identity, Identity::Main { .. }) {
                    resolved = Some(pk(&person)?);
                    break;
                }
            }
        }
        let Some(dbp) = resolved else {
            continue;
        };
        let Some(gp_alias) = locate_alias(conn, gp)? else {
            continue;
        };
        let dbgp = Alias::person(conn, pk(&gp_alias)?)?;
        let dbgp_id = pk(&dbgp)?;
        if dbgp_id == dbp {
            continue;
        }
        match dbgp.identity {
            Identity::Unresolved => Alias::merge_into(conn, dbgp_id, dbp)?,
            Identity::Main { .. } => merge_person_into(conn, dbgp_id, dbp)?,
            // person() never yields a merged record
            Identity::Merged { .. } => {
                return Err(Error::StoreCorrupt(format!(
                    "person resolution returned merged alias {dbgp_id}"
                )));
            }
        }
        changed += 1;
    }

    for (known, news) in &report.known_to_new {
        let Some(known_alias) = locate_alias(conn, known)? else {
            warn!("Identification names unknown player {:?}", known.0);
            continue;
        };
        let person = Alias::person(conn, pk(&known_alias)?)?;
        let target = pk(&person)?;
        if person.identity == Identity::Unresolved {
            Alias::declare_new(conn, target)?;
            changed += 1;
        }
        for new in news {
            if new == known {
                continue;
            }
            let new_id = intern_alias(conn, new)?;
            let new_person = Alias::person(conn, new_id)?;
            let new_person_id = pk(&new_person)?;
            if new_person_id == target {
                continue;
            }
            match new_person.identity {
                Identity::Unresolved => Alias::merge_into(conn, new_person_id, target)?,
                Identity::Main { .. } => merge_person_into(conn, new_person_id, target)?,
                Identity::Merged { .. } => {
                    return Err(Error::StoreCorrupt(format!(
                        "person resolution returned merged alias {new_person_id}"
                    )));
                }
            }
            changed += 1;
        }
    }
    debug!("merge_players changed {changed} records");
    Ok(changed)
}

/// Return the persons whose identity tuple matches neither an alias
/// already seen in this pass nor an import-side alias of the same
/// gameplayer. A non-empty set means the import disagrees with the
/// local graph.
pub fn is_player_identification_inconsistent(
    conn: &Connection,
    report: &ImportReport,
) -> Result<BTreeSet<PlayerKey>> {
    let mut seen: BTreeSet<PlayerKey> = BTreeSet::new();
    let mut failures: BTreeSet<PlayerKey> = BTreeSet::new();
    for gp in &report.gameplayer {
        let Some(main_key) = report.gameplayermerge.get(gp) else {
            continue;
        };
        let Some(group) = report.localplayer.get(main_key) else {
            continue;
        };
        for member in group {
            let Some(alias) = locate_alias(conn, member)? else {
                continue;
            };
            let person = Alias::person(conn, pk(&alias)?)?;
            let tuple = key_for_alias(conn, &person)?;
            if !seen.contains(&tuple) && !group.contains(&tuple) {
                failures.insert(tuple.clone());
            }
            seen.insert(tuple);
        }
    }
    Ok(failures)
}

/// Return the identification pairs whose two sides already resolve to
/// different local persons. Used to reject replies that contradict the
/// current graph.
pub fn is_new_player_inconsistent(
    conn: &Connection,
    report: &ImportReport,
) -> Result<BTreeSet<(PlayerKey, PlayerKey)>> {
    let mut failures = BTreeSet::new();
    for (new, known) in &report.new_to_known {
        let Some(new_alias) = locate_alias(conn, new)? else {
            continue;
        };
        let Some(known_alias) = locate_alias(conn, known)? else {
            continue;
        };
        let new_person = pk(&Alias::person(conn, pk(&new_alias)?)?)?;
        let known_person = pk(&Alias::person(conn, pk(&known_alias)?)?)?;
        if new_person != known_person {
            let new_resolved = Alias::find_by_id(conn, pk(&new_alias)?)?
                .map(|a| a.identity != Identity::Unresolved)
                .unwrap_or(false);
            let known_resolved = Alias::find_by_id(conn, pk(&known_alias)?)?
                .map(|a| a.identity != Identity::Unresolved)
                .unwrap_or(false);
            if new_resolved && known_resolved {
                failures.insert((new.clone(), known.clone()));
            }
        }
    }
    Ok(failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::exchange::parser::parse_import_text;

    const GAME: &str = "\
event=Open
startdate=2024-01-01
enddate=2024-01-07
round=1
homename=Smith A
homepin=1
awayname=Jones B
awaypin=2
result=1-0
homeplayerwhite=yes
";

    fn local_groups() -> String {
        format!(
            "{GAME}\
name=Smith A
event=Open
startdate=2024-01-01
enddate=2024-01-07
pin=1
name=Smith, A
event=Open
startdate=2024-01-01
enddate=2024-01-07
pin=9
exportedeventplayer=
name=Jones B
event=Open
startdate=2024-01-01
enddate=2024-01-07
pin=2
exportedeventplayer=
"
        )
    }

    fn state(conn: &Connection) -> Vec<(String, Identity)> {
        Alias::list_all(conn)
            .unwrap()
            .into_iter()
            .map(|a| (a.name, a.identity))
            .collect()
    }

    #[test]
    fn test_identify_players_builds_groups() {
        let conn = db::open_in_memory().unwrap();
        let report = parse_import_text(&local_groups());
        assert!(report.is_ok(), "{:?}", report.errors);
        let changed = identify_players(&conn, &report).unwrap();
        assert!(changed > 0);

        let event = Event::find_by_triple(&conn, "Open", "2024-01-01", "2024-01-07")
            .unwrap()
            .unwrap();
        let main = Alias::find_identity(&conn, "Smith A", event.id.unwrap(), None, Some("1"))
            .unwrap()
            .unwrap();
        let other = Alias::find_identity(&conn, "Smith, A", event.id.unwrap(), None, Some("9"))
            .unwrap()
            .unwrap();
        assert!(matches!(main.identity, Identity::Main { .. }));
        assert_eq!(other.identity, Identity::Merged { main: main.id.unwrap() });
    }

    #[test]
    fn test_identify_players_is_idempotent() {
        let conn = db::open_in_memory().unwrap();
        let report = parse_import_text(&local_groups());
        identify_players(&conn, &report).unwrap();
        let first = state(&conn);
        let changed = identify_players(&conn, &report).unwrap();
        assert_eq!(changed, 0);
        assert_eq!(state(&conn), first);
    }

    #[test]
    fn test_merge_players_applies_decisions() {
        let conn = db::open_in_memory().unwrap();
        // The local store already knows Smith under an older alias
        let event_id = Event::intern(&conn, "Open", "2023-01-01", "2023-01-07").unwrap();
        let old = Alias::intern(&conn, "Smith, A", event_id, None, Some("4"), None).unwrap();
        Alias::declare_new(&conn, old).unwrap();

        let text = format!(
            "{GAME}\
identified=
newidentity=Smith A
event=Open
startdate=2024-01-01
enddate=2024-01-07
pin=1
knownidentity=Smith, A
event=Open
startdate=2023-01-01
enddate=2023-01-07
pin=4
"
        );
        let report = parse_import_text(&text);
        assert!(report.is_ok(), "{:?}", report.errors);
        let changed = merge_players(&conn, &report).unwrap();
        assert!(changed > 0);

        let new_event = Event::find_by_triple(&conn, "Open", "2024-01-01", "2024-01-07")
            .unwrap()
            .unwrap();
        let new_alias =
            Alias::find_identity(&conn, "Smith A", new_event.id.unwrap(), None, Some("1"))
                .unwrap()
                .unwrap();
        assert_eq!(new_alias.identity, Identity::Merged { main: old });

        // Replay changes nothing
        let first = state(&conn);
        assert_eq!(merge_players(&conn, &report).unwrap(), 0);
        assert_eq!(state(&conn), first);
    }

    #[test]
    fn test_new_player_inconsistency_detected() {
        let conn = db::open_in_memory().unwrap();
        // Both sides of the decision already resolve to different persons
        let old_event = Event::intern(&conn, "Open", "2023-01-01", "2023-01-07").unwrap();
        let known = Alias::intern(&conn, "Smith, A", old_event, None, Some("4"), None).unwrap();
        Alias::declare_new(&conn, known).unwrap();
        let new_event = Event::intern(&conn, "Open", "2024-01-01", "2024-01-07").unwrap();
        let new = Alias::intern(&conn, "Smith A", new_event, None, Some("1"), None).unwrap();
        Alias::declare_new(&conn, new).unwrap();

        let text = format!(
            "{GAME}\
identified=
newidentity=Smith A
event=Open
startdate=2024-01-01
enddate=2024-01-07
pin=1
knownidentity=Smith, A
event=Open
startdate=2023-01-01
enddate=2023-01-07
pin=4
"
        );
        let report = parse_import_text(&text);
        let failures = is_new_player_inconsistent(&conn, &report).unwrap();
        assert_eq!(failures.len(), 1);
    }
}
