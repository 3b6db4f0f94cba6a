// src/exchange/ingest.rs

//! Import storage
//!
//! Writes a parsed import's events, sections, aliases, and games into
//! the record store. Runs inside a caller-opened transaction; identity
//! resolution happens afterwards in the identity updater.

use super::report::ImportReport;
use crate::db::models::{Alias, Event, Game, GameResult, Name};
use crate::error::{Error, Result};
use rusqlite::Connection;
use std::collections::HashMap;
use tracing::debug;

/// Counts reported back to the caller after storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub events: usize,
    pub games: usize,
    pub aliases: usize,
}

fn side_alias(
    conn: &Connection,
    game: &HashMap<String, String>,
    side: &str,
    event_id: i64,
    section_id: Option<i64>,
    team_context: bool,
) -> Result<Option<i64>> {
    let Some(name) = game.get(&format!("{side}name")) else {
        return Ok(None);
    };
    if name.is_empty() {
        return Ok(None);
    }
    let affiliation_id = match game.get(&format!("{side}affiliation")) {
        Some(club) => Some(Name::intern(conn, club)?),
        None => None,
    };
    // In a team match the player's identity scope is the club, not the
    // event section
    let alias_section = if team_context { None } else { section_id };
    let pin = game.get(&format!("{side}pin")).map(String::as_str);
    let id = Alias::intern(conn, name, event_id, alias_section, pin, affiliation_id)?;
    Ok(Some(id))
}

/// Store every game of a parsed report, interning events, sections,
/// teams, and aliases along the way.
pub fn store_report(conn: &Connection, report: &ImportReport) -> Result<IngestStats> {
    if !report.is_ok() {
        return Err(Error::ValidationError(
            "import report has parse errors and cannot be stored".to_string(),
        ));
    }
    let mut stats = IngestStats::default();
    let mut seen_events = std::collections::HashSet::new();
    let mut seen_aliases = std::collections::HashSet::new();

    for game in &report.games {
        let event_id = Event::intern(
            conn,
            &game["event"],
            &game["startdate"],
            &game["enddate"],
        )?;
        if seen_events.insert(event_id) {
            stats.events += 1;
        }
        let section_id = match game.get("eventsection") {
            Some(section) => Some(Event::add_section(conn, event_id, section)?),
            None => None,
        };
        let hometeam_id = match game.get("hometeam") {
            Some(team) => Some(Name::intern(conn, team)?),
            None => None,
        };
        let awayteam_id = match game.get("awayteam") {
            Some(team) => Some(Name::intern(conn, team)?),
            None => None,
        };
        let team_context = hometeam_id.is_some() && awayteam_id.is_some();

        let home = side_alias(conn, game, "home", event_id, section_id, team_context)?
            .ok_or_else(|| {
                Error::ValidationError("game record has no home player".to_string())
            })?;
        let away = side_alias(conn, game, "away", event_id, section_id, team_context)?;
        for alias_id in [Some(home), away].into_iter().flatten() {
            if seen_aliases.insert(alias_id) {
                stats.aliases += 1;
            }
        }

        let result = GameResult::from_score(&game["result"]).ok_or_else(|| {
            Error::ValidationError(format!("game result {} not storable", game["result"]))
        })?;
        let mut record = Game::new(event_id, home, away, result);
        record.section_id = section_id;
        record.round = game.get("round").cloned();
        record.board = game.get("board").cloned();
        record.date = game.get("date").cloned();
        record.homeplayerwhite = match game.get("homeplayerwhite").map(String::as_str) {
            Some("yes") => Some(true),
            Some("no") => Some(false),
            _ => None,
        };
        record.hometeam_id = hometeam_id;
        record.awayteam_id = awayteam_id;
        record.insert(conn)?;
        stats.games += 1;
    }
    debug!(
        "Stored import: {} events, {} games, {} aliases",
        stats.events, stats.games, stats.aliases
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::exchange::parser::parse_import_text;

    const STREAM: &str = "\
event=Open
startdate=2024-01-01
enddate=2024-01-07
eventsection=Main
round=1
homename=Smith A
homepin=1
awayname=Jones B
awaypin=2
result=1-0
homeplayerwhite=yes
event=Open
startdate=2024-01-01
enddate=2024-01-07
eventsection=Main
round=2
homename=Smith A
homepin=1
awayname=
awaypinfalse=
result=bye-1
homeplayerwhite=
";

    #[test]
    fn test_store_report() {
        let conn = db::open_in_memory().unwrap();
        let report = parse_import_text(STREAM);
        assert!(report.is_ok(), "{:?}", report.errors);
        let stats = store_report(&conn, &report).unwrap();
        assert_eq!(stats.events, 1);
        assert_eq!(stats.games, 2);
        assert_eq!(stats.aliases, 2);

        let event = Event::find_by_triple(&conn, "Open", "2024-01-01", "2024-01-07")
            .unwrap()
            .unwrap();
        let games = Game::list_by_event(&conn, event.id.unwrap()).unwrap();
        assert_eq!(games.len(), 2);
        // The bye row has no away side
        assert!(games[1].away_alias_id.is_none());
        assert_eq!(games[1].result, GameResult::ByeWin);
    }
}
