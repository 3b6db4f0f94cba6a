// src/exchange/export.rs

//! Export streams
//!
//! Renders the canonical key=value streams consumed by peer
//! installations: an event's games with their export-side merge groups,
//! and the full identity graph of this database for inclusion in an
//! identification reply.

use super::report::AliasesFlag;
use crate::db::models::{Alias, Event, Game, Identity, Name};
use crate::error::{Error, Result};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

fn push_line(out: &mut String, key: &str, value: &str) {
    // Infallible for String
    let _ = writeln!(out, "{key}={value}");
}

fn push_opt(out: &mut String, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        push_line(out, key, value);
    }
}

/// Emit one identity block. `name_key` is `name`, `player`,
/// `newidentity`, or `knownidentity` depending on the enclosing group.
fn push_alias_block(
    out: &mut String,
    conn: &Connection,
    name_key: &str,
    alias: &Alias,
) -> Result<()> {
    let event = Event::find_by_id(conn, alias.event_id)?.ok_or_else(|| {
        Error::StoreCorrupt(format!("alias references missing event {}", alias.event_id))
    })?;
    push_line(out, name_key, &alias.name);
    push_line(out, "event", &event.name(conn)?);
    push_line(out, "startdate", &event.startdate);
    push_line(out, "enddate", &event.enddate);
    push_opt(out, "section", &Name::text_for(conn, alias.section_id)?);
    match &alias.pin {
        Some(pin) => push_line(out, "pin", pin),
        None => push_line(out, "pinfalse", ""),
    }
    Ok(())
}

fn game_side(
    out: &mut String,
    conn: &Connection,
    side: &str,
    alias_id: Option<i64>,
) -> Result<()> {
    match alias_id {
        Some(id) => {
            let alias = Alias::find_by_id(conn, id)?.ok_or_else(|| {
                Error::StoreCorrupt(format!("game references missing alias {id}"))
            })?;
            push_line(out, &format!("{side}name"), &alias.name);
            match &alias.pin {
                Some(pin) => push_line(out, &format!("{side}pin"), pin),
                None => push_line(out, &format!("{side}pinfalse"), ""),
            }
            push_opt(
                out,
                &format!("{side}affiliation"),
                &Name::text_for(conn, alias.affiliation_id)?,
            );
        }
        None => {
            push_line(out, &format!("{side}name"), "");
            push_line(out, &format!("{side}pinfalse"), "");
        }
    }
    Ok(())
}

/// Export one event: every game, then the export-side merge groups of
/// the aliases those games reference.
pub fn export_event(conn: &Connection, event_id: i64) -> Result<String> {
    let event = Event::find_by_id(conn, event_id)?
        .ok_or_else(|| Error::ValidationError(format!("event {event_id} does not exist")))?;
    let event_name = event.name(conn)?;
    let mut out = String::new();

    let games = Game::list_by_event(conn, event_id)?;
    let mut referenced: BTreeSet<i64> = BTreeSet::new();
    for game in &games {
        push_line(&mut out, "event", &event_name);
        push_line(&mut out, "startdate", &event.startdate);
        push_line(&mut out, "enddate", &event.enddate);
        push_opt(
            &mut out,
            "eventsection",
            &Name::text_for(conn, game.section_id)?,
        );
        push_opt(&mut out, "date", &game.date);
        push_opt(&mut out, "round", &game.round);
        push_opt(&mut out, "board", &game.board);
        push_opt(&mut out, "hometeam", &Name::text_for(conn, game.hometeam_id)?);
        push_opt(&mut out, "awayteam", &Name::text_for(conn, game.awayteam_id)?);
        game_side(&mut out, conn, "home", Some(game.home_alias_id))?;
        game_side(&mut out, conn, "away", game.away_alias_id)?;
        push_line(&mut out, "result", game.result.score());
        let white = match game.homeplayerwhite {
            Some(true) => "yes",
            Some(false) => "no",
            None => "",
        };
        push_line(&mut out, "homeplayerwhite", white);

        referenced.insert(game.home_alias_id);
        if let Some(away) = game.away_alias_id {
            referenced.insert(away);
        }
    }

    // Merge groups: the person's alias first, then the referenced
    // aliases merged into it
    let mut groups: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
    for alias_id in referenced {
        let person = Alias::person(conn, alias_id)?;
        let main = person
            .id
            .ok_or_else(|| Error::StoreCorrupt("person record without a PK".to_string()))?;
        let group = groups.entry(main).or_default();
        group.insert(main);
        group.insert(alias_id);
    }
    for (main, members) in groups {
        let main_alias = Alias::find_by_id(conn, main)?
            .ok_or_else(|| Error::StoreCorrupt(format!("alias {main} missing")))?;
        push_alias_block(&mut out, conn, "name", &main_alias)?;
        for member in members {
            if member == main {
                continue;
            }
            let alias = Alias::find_by_id(conn, member)?
                .ok_or_else(|| Error::StoreCorrupt(format!("alias {member} missing")))?;
            push_alias_block(&mut out, conn, "name", &alias)?;
        }
        push_line(&mut out, "exportedeventplayer", "");
    }
    Ok(out)
}

/// Export the whole identity graph as `player=` groups. Each group ends
/// with an `aliases=` flag: None for an unresolved record, False for a
/// person with no merged aliases, True for a person with merges.
pub fn export_players_on_database(conn: &Connection) -> Result<String> {
    let mut out = String::new();
    for alias in Alias::list_all(conn)? {
        let flag = match &alias.identity {
            Identity::Merged { .. } => continue,
            Identity::Unresolved => AliasesFlag::None,
            Identity::Main { aliases } if aliases.is_empty() => AliasesFlag::False,
            Identity::Main { .. } => AliasesFlag::True,
        };
        push_alias_block(&mut out, conn, "player", &alias)?;
        if let Identity::Main { aliases } = &alias.identity {
            for member in aliases {
                let merged = Alias::find_by_id(conn, *member)?
                    .ok_or_else(|| Error::StoreCorrupt(format!("alias {member} missing")))?;
                push_alias_block(&mut out, conn, "player", &merged)?;
            }
        }
        push_line(&mut out, "aliases", flag.as_str());
    }
    Ok(out)
}
