// src/db/models/game.rs

//! Game model - a single scored pairing
//!
//! Games carry the classification used by the submission builder: a game
//! with both team names is a MATCH game, a team-less game with a round in
//! 1..=99 is a SECTION game, anything else is an OTHER game.

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

/// Result of a game, from the home player's side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameResult {
    HomeWin,
    Draw,
    AwayWin,
    HomeDefault,
    AwayDefault,
    Void,
    ByeWin,
    ByeDraw,
}

impl GameResult {
    pub fn as_str(&self) -> &str {
        match self {
            GameResult::HomeWin => "home-win",
            GameResult::Draw => "draw",
            GameResult::AwayWin => "away-win",
            GameResult::HomeDefault => "home-default",
            GameResult::AwayDefault => "away-default",
            GameResult::Void => "void",
            GameResult::ByeWin => "bye-win",
            GameResult::ByeDraw => "bye-draw",
        }
    }

    /// The wire-format score token used by result reports
    pub fn score(&self) -> &str {
        match self {
            GameResult::HomeWin => "1-0",
            GameResult::Draw => "draw",
            GameResult::AwayWin => "0-1",
            GameResult::HomeDefault => "1-def",
            GameResult::AwayDefault => "def-1",
            GameResult::Void => "void",
            GameResult::ByeWin => "bye-1",
            GameResult::ByeDraw => "bye-0.5",
        }
    }

    /// Parse the wire-format score token used by result reports
    pub fn from_score(score: &str) -> Option<Self> {
        match score {
            "1-0" => Some(GameResult::HomeWin),
            "draw" | "0.5-0.5" => Some(GameResult::Draw),
            "0-1" => Some(GameResult::AwayWin),
            "1-def" => Some(GameResult::HomeDefault),
            "def-1" => Some(GameResult::AwayDefault),
            "void" => Some(GameResult::Void),
            "bye-1" => Some(GameResult::ByeWin),
            "bye-0.5" => Some(GameResult::ByeDraw),
            _ => None,
        }
    }
}

impl FromStr for GameResult {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "home-win" => Ok(GameResult::HomeWin),
            "draw" => Ok(GameResult::Draw),
            "away-win" => Ok(GameResult::AwayWin),
            "home-default" => Ok(GameResult::HomeDefault),
            "away-default" => Ok(GameResult::AwayDefault),
            "void" => Ok(GameResult::Void),
            "bye-win" => Ok(GameResult::ByeWin),
            "bye-draw" => Ok(GameResult::ByeDraw),
            _ => Err(format!("Invalid game result: {s}")),
        }
    }
}

/// Classification used when partitioning games for submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameClass {
    /// Both hometeam and awayteam present
    Match,
    /// Round present with 1 <= round <= 99, no teams
    Section,
    Other,
}

/// A single scored pairing
#[derive(Debug, Clone)]
pub struct Game {
    pub id: Option<i64>,
    pub event_id: i64,
    pub section_id: Option<i64>,
    pub round: Option<String>,
    pub board: Option<String>,
    pub date: Option<String>,
    pub home_alias_id: i64,
    /// None for bye results
    pub away_alias_id: Option<i64>,
    pub result: GameResult,
    /// None when the colour was not reported
    pub homeplayerwhite: Option<bool>,
    pub hometeam_id: Option<i64>,
    pub awayteam_id: Option<i64>,
}

impl Game {
    pub fn new(
        event_id: i64,
        home_alias_id: i64,
        away_alias_id: Option<i64>,
        result: GameResult,
    ) -> Self {
        Self {
            id: None,
            event_id,
            section_id: None,
            round: None,
            board: None,
            date: None,
            home_alias_id,
            away_alias_id,
            result,
            homeplayerwhite: None,
            hometeam_id: None,
            awayteam_id: None,
        }
    }

    /// Classify this game for submission grouping
    pub fn classify(&self) -> GameClass {
        if self.hometeam_id.is_some() && self.awayteam_id.is_some() {
            return GameClass::Match;
        }
        if let Some(round) = &self.round {
            if let Ok(n) = round.parse::<u32>() {
                if (1..=99).contains(&n) {
                    return GameClass::Section;
                }
            }
        }
        GameClass::Other
    }

    /// Insert this game into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO games
             (event_id, section_id, round, board, date, home_alias_id,
              away_alias_id, result, homeplayerwhite, hometeam_id, awayteam_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                self.event_id,
                self.section_id,
                &self.round,
                &self.board,
                &self.date,
                self.home_alias_id,
                self.away_alias_id,
                self.result.as_str(),
                self.homeplayerwhite.map(|b| b as i64),
                self.hometeam_id,
                self.awayteam_id,
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a game by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", Self::SELECT))?;
        let game = stmt.query_row([id], Self::from_row).optional()?;
        Ok(game)
    }

    /// List the games recorded for an event, in PK order
    pub fn list_by_event(conn: &Connection, event_id: i64) -> Result<Vec<Self>> {
        let mut stmt =
            conn.prepare(&format!("{} WHERE event_id = ?1 ORDER BY id", Self::SELECT))?;
        let games = stmt
            .query_map([event_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(games)
    }

    /// Count games referencing an alias. Aliases are never deleted while
    /// this is non-zero.
    pub fn count_for_alias(conn: &Connection, alias_id: i64) -> Result<i64> {
        let count = conn.query_row(
            "SELECT count(*) FROM games WHERE home_alias_id = ?1 OR away_alias_id = ?1",
            [alias_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    const SELECT: &'static str = "SELECT id, event_id, section_id, round, board, date,
        home_alias_id, away_alias_id, result, homeplayerwhite, hometeam_id, awayteam_id
        FROM games";

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let result_str: String = row.get(8)?;
        let result = result_str.parse::<GameResult>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                8,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;
        let white: Option<i64> = row.get(9)?;
        Ok(Self {
            id: Some(row.get(0)?),
            event_id: row.get(1)?,
            section_id: row.get(2)?,
            round: row.get(3)?,
            board: row.get(4)?,
            date: row.get(5)?,
            home_alias_id: row.get(6)?,
            away_alias_id: row.get(7)?,
            result,
            homeplayerwhite: white.map(|v| v != 0),
            hometeam_id: row.get(10)?,
            awayteam_id: row.get(11)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::models::{Alias, Event, Name};

    fn setup() -> (Connection, i64, i64, i64) {
        let conn = db::open_in_memory().unwrap();
        let event_id = Event::intern(&conn, "Open", "2024-01-01", "2024-01-07").unwrap();
        let home = Alias::intern(&conn, "Smith A", event_id, None, Some("1"), None).unwrap();
        let away = Alias::intern(&conn, "Jones B", event_id, None, Some("2"), None).unwrap();
        (conn, event_id, home, away)
    }

    #[test]
    fn test_insert_and_load_round_trip() {
        let (conn, event_id, home, away) = setup();
        let mut game = Game::new(event_id, home, Some(away), GameResult::HomeWin);
        game.round = Some("1".to_string());
        game.homeplayerwhite = Some(true);
        game.date = Some("2024-01-01".to_string());
        let id = game.insert(&conn).unwrap();

        let loaded = Game::find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(loaded.result, GameResult::HomeWin);
        assert_eq!(loaded.homeplayerwhite, Some(true));
        assert_eq!(loaded.round.as_deref(), Some("1"));
    }

    #[test]
    fn test_classification() {
        let (conn, event_id, home, away) = setup();
        let mut game = Game::new(event_id, home, Some(away), GameResult::Draw);
        assert_eq!(game.classify(), GameClass::Other);

        game.round = Some("3".to_string());
        assert_eq!(game.classify(), GameClass::Section);

        game.round = Some("100".to_string());
        assert_eq!(game.classify(), GameClass::Other);

        game.round = Some("3".to_string());
        game.hometeam_id = Some(Name::intern(&conn, "Kings A").unwrap());
        game.awayteam_id = Some(Name::intern(&conn, "Rooks B").unwrap());
        assert_eq!(game.classify(), GameClass::Match);
    }

    #[test]
    fn test_count_for_alias() {
        let (conn, event_id, home, away) = setup();
        Game::new(event_id, home, Some(away), GameResult::HomeWin)
            .insert(&conn)
            .unwrap();
        assert_eq!(Game::count_for_alias(&conn, home).unwrap(), 1);
        assert_eq!(Game::count_for_alias(&conn, away).unwrap(), 1);
    }
}
