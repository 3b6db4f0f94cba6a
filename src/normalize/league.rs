// src/normalize/league.rs

//! League-database dump normalization
//!
//! A league dump is a flat key=value file. Player records are keyed by
//! PCODE, games by PCODE1/PCODE2. The dump is normalized in two passes:
//! the first harvests the set of PINs any game references, the second
//! copies records, discarding PCODE player records no PCODE1/PCODE2
//! game refers to.
//!
//! The key schedule below defines the dump format this installation
//! accepts; it is the authority for the tests.

use super::{CanonicalRecord, Normalizer, RuleTables, SourceReport, Validity, keyed_lines};
use crate::error::Result;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Rule tables for league-database dumps
pub fn league_rules() -> RuleTables {
    let mut t = RuleTables::default();
    t.context = ["EVENT", "PCODE", "SECTION", "PCODE1"].into_iter().collect();
    t.validmap = [
        ("EDATE", Validity::After("EVENT")),
        ("EFINALDATE", Validity::After("EVENT")),
        ("PNAME", Validity::After("PCODE")),
        ("CLUB", Validity::After("PCODE")),
        ("GCODE", Validity::After("PCODE")),
        ("PCODE1", Validity::AfterAny(&["SECTION", "PCODE1"])),
        ("PCODE2", Validity::After("PCODE1")),
        ("RESULT", Validity::After("PCODE1")),
        ("DATE", Validity::After("PCODE1")),
        ("ROUND", Validity::After("PCODE1")),
        ("BOARD", Validity::After("PCODE1")),
        ("HOMETEAM", Validity::After("PCODE1")),
        ("AWAYTEAM", Validity::After("PCODE1")),
        ("WHITE1", Validity::After("PCODE1")),
    ]
    .into_iter()
    .collect();
    t.keymap = [
        ("EVENT", "event"),
        ("EDATE", "startdate"),
        ("EFINALDATE", "enddate"),
        ("SECTION", "eventsection"),
        ("PCODE", "pin"),
        ("PNAME", "name"),
        ("CLUB", "affiliation"),
        ("PCODE1", "homepin"),
        ("PCODE2", "awaypin"),
        ("RESULT", "result"),
        ("DATE", "date"),
        ("ROUND", "round"),
        ("BOARD", "board"),
        ("HOMETEAM", "hometeam"),
        ("AWAYTEAM", "awayteam"),
        ("WHITE1", "homeplayerwhite"),
    ]
    .into_iter()
    .collect();
    t.pinmap = ["PCODE"].into_iter().collect();
    t.pinreadmap = ["PCODE1", "PCODE2"].into_iter().collect();
    t.gradingcodemap = [("GCODE", "reportedcodes")].into_iter().collect();
    t.discardmap = ["COMMENT"].into_iter().collect();
    t
}

/// Normalize one league dump held in memory. `source` is the base name
/// of the originating file and becomes the PIN namespace prefix.
///
/// The dump is run through the engine twice. The first run keeps every
/// record and harvests the mapped PIN set the games reference; the
/// second run rebuilds the same PIN map (the engine is deterministic
/// over identical input) and drops player records whose PIN is not in
/// the harvested set.
pub fn normalize_league_text(source: &str, text: &str) -> SourceReport {
    let tables = league_rules();
    let normalizer = Normalizer::new(&tables);
    let lines = keyed_lines(text);

    let first = normalizer.run(source, &lines, |_, _| true);
    if !first.is_ok() {
        return first;
    }
    let live: HashSet<String> = first
        .records
        .iter()
        .flat_map(|r| r.iter())
        .filter(|(k, _)| k == "homepin" || k == "awaypin")
        .map(|(_, v)| v.clone())
        .collect();

    normalizer.run(source, &lines, |context, record| {
        if context != "PCODE" {
            return true;
        }
        record_pin(record)
            .map(|pin| live.contains(pin))
            .unwrap_or(false)
    })
}

fn record_pin(record: &CanonicalRecord) -> Option<&str> {
    record
        .iter()
        .find(|(k, _)| k == "pin")
        .map(|(_, v)| v.as_str())
}

/// Normalize every league dump file in a container: a single file or
/// every regular file in a folder, sorted by name.
pub fn normalize_league_path(path: &Path) -> Result<Vec<SourceReport>> {
    let mut files = Vec::new();
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if entry.path().is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
    } else {
        files.push(path.to_path_buf());
    }

    let mut reports = Vec::new();
    for file in files {
        let source = file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("source")
            .to_string();
        let text = std::fs::read_to_string(&file)?;
        let report = normalize_league_text(&source, &text);
        info!(
            "Normalized {}: {} records, {} errors",
            source,
            report.records.len(),
            report.errors.len()
        );
        reports.push(report);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\
EVENT=City League
EDATE=2024-01-01
EFINALDATE=2024-05-01
PCODE=123456A
PNAME=Smith A
CLUB=Kings Head
PCODE=7
PNAME=Jones B
CLUB=Rooks
PCODE=8
PNAME=Never Plays
SECTION=Division 1
PCODE1=123456A
PCODE2=7
RESULT=1-0
DATE=2024-01-10
ROUND=1
";

    #[test]
    fn test_grading_code_pin_is_namespaced() {
        let report = normalize_league_text("lg1", DUMP);
        assert!(report.is_ok(), "{:?}", report.errors);
        let player = &report.records[1];
        assert!(player.contains(&("pin".to_string(), "lg1-0".to_string())));
        let game = report
            .records
            .iter()
            .find(|r| r.iter().any(|(k, _)| k == "homepin"))
            .unwrap();
        assert!(game.contains(&("homepin".to_string(), "lg1-0".to_string())));
        assert!(game.contains(&("awaypin".to_string(), "7".to_string())));
    }

    #[test]
    fn test_unreferenced_player_dropped() {
        let report = normalize_league_text("lg1", DUMP);
        let names: Vec<&str> = report
            .records
            .iter()
            .flat_map(|r| r.iter())
            .filter(|(k, _)| k == "name")
            .map(|(_, v)| v.as_str())
            .collect();
        assert!(names.contains(&"Smith A"));
        assert!(names.contains(&"Jones B"));
        assert!(!names.contains(&"Never Plays"));
    }

    #[test]
    fn test_same_code_two_sources_not_joined() {
        let a = normalize_league_text("lg1", DUMP);
        let b = normalize_league_text("lg2", DUMP);
        let pin = |r: &SourceReport| {
            r.records[1]
                .iter()
                .find(|(k, _)| k == "pin")
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(pin(&a), "lg1-0");
        assert_eq!(pin(&b), "lg2-0");
    }
}
