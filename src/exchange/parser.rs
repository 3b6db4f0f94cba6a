// src/exchange/parser.rs

//! Import-stream parser
//!
//! Reads the canonical key=value stream exported by a peer installation
//! and builds an ImportReport. The parser is a state machine keyed on
//! the most recent context field: games first, then export-side player
//! groups, then the remote identity graph, then any identification
//! decisions. Duplicates, ordering violations, and unknown keywords
//! abort parsing with the offending line.

use super::report::{AliasesFlag, EventKey, ImportReport, ParseIssue, PlayerKey};
use crate::db::models::GameResult;
use crate::normalize::{KeyedLine, keyed_lines};
use std::collections::{BTreeSet, HashMap};

/// Fields accepted inside a game record
const GAME_KEYS: &[&str] = &[
    "event",
    "startdate",
    "enddate",
    "eventsection",
    "section",
    "date",
    "round",
    "board",
    "hometeam",
    "awayteam",
    "homename",
    "homepin",
    "homepinfalse",
    "homeaffiliation",
    "homereportedcodes",
    "awayname",
    "awaypin",
    "awaypinfalse",
    "awayaffiliation",
    "awayreportedcodes",
    "result",
    "homeplayerwhite",
];

/// Fields accepted inside an identity block
const ALIAS_KEYS: &[&str] = &["event", "startdate", "enddate", "section", "pin", "pinfalse"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Games,
    LocalPlayers,
    RemotePlayers,
    Identification,
}

/// Accumulates one identity block
#[derive(Debug, Clone, Default)]
struct AliasBuilder {
    name: String,
    fields: HashMap<String, String>,
    /// Some(None) when pinfalse was reported
    pin: Option<Option<String>>,
}

impl AliasBuilder {
    fn open(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Record one field, refusing duplicates
    fn apply(&mut self, line: &KeyedLine) -> Result<(), String> {
        match line.key.as_str() {
            "pin" => {
                if self.pin.is_some() {
                    return Err("Keyword pin duplicated in player block".to_string());
                }
                self.pin = Some(Some(line.value.clone()));
            }
            "pinfalse" => {
                if self.pin.is_some() {
                    return Err("Keyword pinfalse duplicated in player block".to_string());
                }
                self.pin = Some(None);
            }
            key => {
                if self.fields.contains_key(key) {
                    return Err(format!("Keyword {key} duplicated in player block"));
                }
                self.fields.insert(key.to_string(), line.value.clone());
            }
        }
        Ok(())
    }

    fn finish(self, line: &KeyedLine) -> Result<PlayerKey, ParseIssue> {
        let get = |key: &str| self.fields.get(key).cloned();
        let (Some(event), Some(startdate), Some(enddate)) =
            (get("event"), get("startdate"), get("enddate"))
        else {
            return Err(ParseIssue {
                description: format!("Player {} is missing event fields", self.name),
                line: line.line,
                text: line.raw.clone(),
            });
        };
        let Some(pin) = self.pin else {
            return Err(ParseIssue {
                description: format!("Player {} has neither pin nor pinfalse", self.name),
                line: line.line,
                text: line.raw.clone(),
            });
        };
        Ok((self.name, event, startdate, enddate, get("section"), pin))
    }
}

/// Parse an import stream from text
pub fn parse_import_text(text: &str) -> ImportReport {
    parse_import_lines(&keyed_lines(text))
}

/// Parse an import stream from keyed lines
pub fn parse_import_lines(lines: &[KeyedLine]) -> ImportReport {
    let mut p = Parser::default();
    for line in lines {
        if !p.report.errors.is_empty() {
            break;
        }
        p.step(line);
    }
    if p.report.errors.is_empty() {
        p.finish(lines.last());
    }
    p.report
}

#[derive(Debug)]
struct Parser {
    report: ImportReport,
    state: State,
    game: HashMap<String, String>,
    alias: Option<AliasBuilder>,
    stack: Vec<PlayerKey>,
    pending_new: Option<PlayerKey>,
    known: Option<AliasBuilder>,
}

impl Default for Parser {
    fn default() -> Self {
        Self {
            report: ImportReport::default(),
            state: State::Games,
            game: HashMap::new(),
            alias: None,
            stack: Vec::new(),
            pending_new: None,
            known: None,
        }
    }
}

impl Parser {
    fn error(&mut self, description: impl Into<String>, line: &KeyedLine) {
        self.report.errors.push(ParseIssue {
            description: description.into(),
            line: line.line,
            text: line.raw.clone(),
        });
    }

    fn step(&mut self, line: &KeyedLine) {
        if line.key.is_empty() {
            self.error("Line is not a keyword=value record", line);
            return;
        }
        match self.state {
            State::Games => self.step_games(line),
            State::LocalPlayers => self.step_local(line),
            State::RemotePlayers => self.step_remote(line),
            State::Identification => self.step_identification(line),
        }
    }

    fn step_games(&mut self, line: &KeyedLine) {
        match line.key.as_str() {
            "name" => {
                if !self.game.is_empty() {
                    self.error("Game record is incomplete at start of player block", line);
                    return;
                }
                self.state = State::LocalPlayers;
                self.alias = Some(AliasBuilder::open(&line.value));
            }
            "player" => {
                if !self.game.is_empty() {
                    self.error("Game record is incomplete at start of player block", line);
                    return;
                }
                self.state = State::RemotePlayers;
                self.alias = Some(AliasBuilder::open(&line.value));
            }
            "identified" => {
                self.state = State::Identification;
            }
            key if GAME_KEYS.contains(&key) => {
                if self.game.contains_key(key) {
                    self.error(format!("Keyword {key} duplicated in game record"), line);
                    return;
                }
                self.game.insert(key.to_string(), line.value.clone());
                if key == "homeplayerwhite" {
                    self.close_game(line);
                }
            }
            key => self.error(format!("Keyword {key} not expected in games block"), line),
        }
    }

    fn close_game(&mut self, line: &KeyedLine) {
        let game = std::mem::take(&mut self.game);
        for required in ["event", "startdate", "enddate", "homename", "awayname", "result"] {
            if !game.contains_key(required) {
                self.error(format!("Game record is missing keyword {required}"), line);
                return;
            }
        }
        let result = &game["result"];
        if GameResult::from_score(result).is_none() {
            self.error(format!("Result {result} is not an accepted value"), line);
            return;
        }
        for side in ["home", "away"] {
            let pin_key = format!("{side}pin");
            let pinfalse_key = format!("{side}pinfalse");
            if game.contains_key(&pin_key) == game.contains_key(&pinfalse_key) {
                self.error(
                    format!("Game record needs exactly one of {pin_key} and {pinfalse_key}"),
                    line,
                );
                return;
            }
        }

        let event_key: EventKey = (
            game["event"].clone(),
            game["startdate"].clone(),
            game["enddate"].clone(),
        );
        let sections = self.report.localevents.entry(event_key).or_default();
        if let Some(section) = game.get("eventsection") {
            sections.insert(section.clone());
        }

        let team_context = game.contains_key("hometeam") && game.contains_key("awayteam");
        for side in ["home", "away"] {
            let name = game[&format!("{side}name")].clone();
            // Byes carry no opposing player
            if name.is_empty() {
                continue;
            }
            let pin = game.get(&format!("{side}pin")).cloned();
            let club_or_section = if team_context {
                game.get(&format!("{side}affiliation")).cloned()
            } else {
                game.get("eventsection").cloned()
            };
            self.report.gameplayer.insert((
                name,
                game["event"].clone(),
                game["startdate"].clone(),
                game["enddate"].clone(),
                club_or_section,
                pin,
            ));
        }
        self.report.games.push(game);
    }

    fn close_alias(&mut self, line: &KeyedLine) -> bool {
        let Some(builder) = self.alias.take() else {
            self.error("Player fields found with no open player block", line);
            return false;
        };
        match builder.finish(line) {
            Ok(key) => {
                let (_, ref event, ref startdate, ref enddate, ref section, _) = key;
                let events = if self.state == State::RemotePlayers {
                    &mut self.report.remoteevents
                } else {
                    &mut self.report.localevents
                };
                let sections = events
                    .entry((event.clone(), startdate.clone(), enddate.clone()))
                    .or_default();
                if let Some(section) = section {
                    sections.insert(section.clone());
                }
                self.stack.push(key);
                true
            }
            Err(issue) => {
                self.report.errors.push(issue);
                false
            }
        }
    }

    fn alias_field(&mut self, line: &KeyedLine) {
        let Some(builder) = self.alias.as_mut() else {
            self.error(
                format!("Keyword {} found with no open player block", line.key),
                line,
            );
            return;
        };
        if let Err(description) = builder.apply(line) {
            self.error(description, line);
        }
    }

    fn step_local(&mut self, line: &KeyedLine) {
        match line.key.as_str() {
            "name" => {
                if self.alias.is_some() && !self.close_alias(line) {
                    return;
                }
                self.alias = Some(AliasBuilder::open(&line.value));
            }
            "exportedeventplayer" | "exportedplayer" => {
                if self.alias.is_some() && !self.close_alias(line) {
                    return;
                }
                if self.stack.is_empty() {
                    self.error("Keyword exportedeventplayer with no player block", line);
                    return;
                }
                let group: Vec<PlayerKey> = std::mem::take(&mut self.stack);
                let main = group[0].clone();
                if self.report.localplayer.contains_key(&main) {
                    self.error("Player group duplicated in export", line);
                    return;
                }
                for member in &group {
                    if self
                        .report
                        .gameplayermerge
                        .insert(member.clone(), main.clone())
                        .is_some()
                    {
                        self.error("Player listed in two export groups", line);
                        return;
                    }
                }
                self.report
                    .localplayer
                    .insert(main, group.into_iter().collect::<BTreeSet<_>>());
            }
            "player" => {
                if self.alias.is_some() {
                    self.error("Local player group not terminated", line);
                    return;
                }
                if !self.stack.is_empty() {
                    self.error("Local player group not terminated", line);
                    return;
                }
                self.state = State::RemotePlayers;
                self.alias = Some(AliasBuilder::open(&line.value));
            }
            "identified" => {
                if self.alias.is_some() || !self.stack.is_empty() {
                    self.error("Local player group not terminated", line);
                    return;
                }
                self.state = State::Identification;
            }
            key if ALIAS_KEYS.contains(&key) => self.alias_field(line),
            key => self.error(
                format!("Keyword {key} not expected in local player block"),
                line,
            ),
        }
    }

    fn step_remote(&mut self, line: &KeyedLine) {
        match line.key.as_str() {
            "player" => {
                if self.alias.is_some() && !self.close_alias(line) {
                    return;
                }
                self.alias = Some(AliasBuilder::open(&line.value));
            }
            "aliases" => {
                if self.alias.is_some() && !self.close_alias(line) {
                    return;
                }
                let Some(flag) = AliasesFlag::parse(&line.value) else {
                    self.error(
                        format!("Aliases flag {} is not a recognized value", line.value),
                        line,
                    );
                    return;
                };
                if self.stack.is_empty() {
                    self.error("Keyword aliases with no player block", line);
                    return;
                }
                let group: Vec<PlayerKey> = std::mem::take(&mut self.stack);
                let main = group[0].clone();
                if self
                    .report
                    .remoteplayer
                    .insert(main, (flag, group.into_iter().collect()))
                    .is_some()
                {
                    self.error("Remote player group duplicated", line);
                }
            }
            "identified" => {
                if self.alias.is_some() || !self.stack.is_empty() {
                    self.error("Remote player group not terminated", line);
                    return;
                }
                self.state = State::Identification;
            }
            key if ALIAS_KEYS.contains(&key) => self.alias_field(line),
            key => self.error(
                format!("Keyword {key} not expected in remote player block"),
                line,
            ),
        }
    }

    fn step_identification(&mut self, line: &KeyedLine) {
        match line.key.as_str() {
            "newidentity" => {
                // A completed known block closes the previous pair
                if self.known.is_some() && !self.close_known(line) {
                    return;
                }
                if self.pending_new.is_some() || self.alias.is_some() {
                    self.error("Previous newidentity still pending", line);
                    return;
                }
                self.alias = Some(AliasBuilder::open(&line.value));
            }
            "knownidentity" => {
                let Some(builder) = self.alias.take() else {
                    self.error("Keyword knownidentity with no pending newidentity", line);
                    return;
                };
                match builder.finish(line) {
                    Ok(key) => self.pending_new = Some(key),
                    Err(issue) => {
                        self.report.errors.push(issue);
                        return;
                    }
                }
                self.known = Some(AliasBuilder::open(&line.value));
            }
            key if ALIAS_KEYS.contains(&key) => {
                // Known block fields accumulate on the known builder,
                // under the same duplicate rules as every other block
                let outcome = self.known.as_mut().map(|builder| builder.apply(line));
                match outcome {
                    Some(Ok(())) => {}
                    Some(Err(description)) => self.error(description, line),
                    None => self.alias_field(line),
                }
            }
            key => self.error(
                format!("Keyword {key} not expected in identification block"),
                line,
            ),
        }
    }

    fn close_known(&mut self, line: &KeyedLine) -> bool {
        let Some(builder) = self.known.take() else {
            return true;
        };
        let Some(new_key) = self.pending_new.take() else {
            self.error("Known identity with no pending newidentity", line);
            return false;
        };
        match builder.finish(line) {
            Ok(known_key) => {
                self.report
                    .new_to_known
                    .insert(new_key.clone(), known_key.clone());
                self.report
                    .known_to_new
                    .entry(known_key)
                    .or_default()
                    .insert(new_key);
                true
            }
            Err(issue) => {
                self.report.errors.push(issue);
                false
            }
        }
    }

    fn finish(&mut self, last: Option<&KeyedLine>) {
        let eof = KeyedLine {
            key: String::new(),
            value: String::new(),
            line: last.map(|l| l.line + 1).unwrap_or(0),
            raw: String::from("<end of input>"),
        };
        if self.known.is_some() {
            self.close_known(&eof);
        }
        if self.pending_new.is_some() || self.alias.is_some() {
            self.report.errors.push(ParseIssue {
                description: "Input ended with a pending player block".to_string(),
                line: eof.line,
                text: eof.raw,
            });
            return;
        }
        if !self.game.is_empty() {
            self.report.errors.push(ParseIssue {
                description: "Input ended with an incomplete game record".to_string(),
                line: eof.line,
                text: eof.raw,
            });
            return;
        }
        if !self.stack.is_empty() {
            self.report.errors.push(ParseIssue {
                description: "Input ended with an unterminated player group".to_string(),
                line: eof.line,
                text: eof.raw,
            });
        }
    }
}
