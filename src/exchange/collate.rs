// src/exchange/collate.rs

//! Import collation
//!
//! Groups a parsed import's games for review before the report is
//! applied. Games collate by event, then by section key. Team matches
//! keep their fixture identity (home team, away team, date) inside the
//! section so two fixtures between the same clubs on different days do
//! not run together. Every player identity maps to the games it plays.

use super::report::{EventKey, ImportReport, PlayerKey};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Section identity inside one event: the reported section name and,
/// for team matches, the fixture the boards belong to.
pub type SectionKey = (Option<String>, Option<(String, String, String)>);

/// One event's games grouped by section key; values index into the
/// originating report's games list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventCollation {
    pub sections: BTreeMap<SectionKey, Vec<usize>>,
    /// Player identity to the games it appears in
    pub players: BTreeMap<PlayerKey, BTreeSet<usize>>,
}

/// The full collation of an import report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collation {
    pub events: BTreeMap<EventKey, EventCollation>,
}

impl Collation {
    pub fn game_count(&self) -> usize {
        self.events
            .values()
            .flat_map(|e| e.sections.values())
            .map(|games| games.len())
            .sum()
    }
}

fn section_key(game: &HashMap<String, String>) -> SectionKey {
    let section = game.get("eventsection").cloned();
    let fixture = match (game.get("hometeam"), game.get("awayteam")) {
        (Some(home), Some(away)) => Some((
            home.clone(),
            away.clone(),
            game.get("date").cloned().unwrap_or_default(),
        )),
        _ => None,
    };
    (section, fixture)
}

fn player_key(game: &HashMap<String, String>, side: &str) -> Option<PlayerKey> {
    let name = game.get(&format!("{side}name"))?;
    if name.is_empty() {
        return None;
    }
    let team_context = game.contains_key("hometeam") && game.contains_key("awayteam");
    let club_or_section = if team_context {
        game.get(&format!("{side}affiliation")).cloned()
    } else {
        game.get("eventsection").cloned()
    };
    Some((
        name.clone(),
        game.get("event")?.clone(),
        game.get("startdate")?.clone(),
        game.get("enddate")?.clone(),
        club_or_section,
        game.get(&format!("{side}pin")).cloned(),
    ))
}

/// Collate a parsed import. The report must have parsed cleanly; games
/// missing their event fields were already rejected by the parser.
pub fn collate(report: &ImportReport) -> Collation {
    let mut collation = Collation::default();
    for (index, game) in report.games.iter().enumerate() {
        let (Some(event), Some(startdate), Some(enddate)) = (
            game.get("event"),
            game.get("startdate"),
            game.get("enddate"),
        ) else {
            continue;
        };
        let event_key: EventKey = (event.clone(), startdate.clone(), enddate.clone());
        let entry = collation.events.entry(event_key).or_default();
        entry
            .sections
            .entry(section_key(game))
            .or_default()
            .push(index);
        for side in ["home", "away"] {
            if let Some(key) = player_key(game, side) {
                entry.players.entry(key).or_default().insert(index);
            }
        }
    }
    collation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::parser::parse_import_text;

    const TEAM_GAMES: &str = "\
event=City League
startdate=2024-01-01
enddate=2024-05-01
eventsection=Division 1
date=2024-01-10
board=1
hometeam=Kings Head
awayteam=Rooks
homename=Smith A
homepin=1
homeaffiliation=Kings Head
awayname=Jones B
awaypin=2
awayaffiliation=Rooks
result=1-0
homeplayerwhite=yes
event=City League
startdate=2024-01-01
enddate=2024-05-01
eventsection=Division 1
date=2024-02-10
board=1
hometeam=Kings Head
awayteam=Rooks
homename=Smith A
homepin=1
homeaffiliation=Kings Head
awayname=Jones B
awaypin=2
awayaffiliation=Rooks
result=draw
homeplayerwhite=no
";

    #[test]
    fn test_fixtures_collate_separately() {
        let report = parse_import_text(TEAM_GAMES);
        assert!(report.is_ok(), "{:?}", report.errors);
        let collation = collate(&report);
        assert_eq!(collation.events.len(), 1);
        let event = collation.events.values().next().unwrap();
        // Same section, two fixtures on different dates
        assert_eq!(event.sections.len(), 2);
        assert_eq!(collation.game_count(), 2);
    }

    #[test]
    fn test_team_player_keyed_by_club() {
        let report = parse_import_text(TEAM_GAMES);
        let collation = collate(&report);
        let event = collation.events.values().next().unwrap();
        let smith = event
            .players
            .keys()
            .find(|k| k.0 == "Smith A")
            .unwrap();
        assert_eq!(smith.4.as_deref(), Some("Kings Head"));
        assert_eq!(event.players[smith].len(), 2);
    }
}
