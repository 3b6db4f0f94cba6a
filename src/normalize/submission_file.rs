// src/normalize/submission_file.rs

//! Federation-submission file normalization
//!
//! Submission files are `#`-delimited records with key=value payloads
//! and an optional inline-table mechanism: a TABLE_START record, one
//! COLUMN=name record per column, the cell values as bare records in
//! row order, then TABLE_END. Tables are accepted on input and unrolled
//! so each row becomes one key=value record per column; they are never
//! emitted.

use super::{CanonicalRecord, KeyedLine, Normalizer, RuleTables, SourceReport, Validity};
use std::collections::HashMap;

/// The PIN sentinel substituted for the literal "0" in PIN fields; the
/// federation reserves PIN 0 for bye and void scoring.
pub const ZERO_NOT_0: &str = "zero_not_0";

/// Unroll a `#`-delimited submission file into keyed lines.
///
/// Returns Err with (description, record index, record text) on a
/// malformed inline table.
pub fn preprocess(text: &str) -> Result<Vec<KeyedLine>, (String, usize, String)> {
    let mut out = Vec::new();
    let mut columns: Option<Vec<String>> = None;
    let mut cells: Vec<String> = Vec::new();

    for (index, token) in text.split('#').enumerate() {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (key, value) = match token.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (token, ""),
        };

        match key {
            "TABLE_START" => {
                if columns.is_some() {
                    return Err((
                        "TABLE_START inside an open table".to_string(),
                        index,
                        token.to_string(),
                    ));
                }
                columns = Some(Vec::new());
                cells.clear();
            }
            "COLUMN" => match &mut columns {
                Some(cols) if cells.is_empty() => cols.push(value.to_string()),
                _ => {
                    return Err((
                        "COLUMN outside a table header".to_string(),
                        index,
                        token.to_string(),
                    ));
                }
            },
            "TABLE_END" => {
                let cols = columns.take().ok_or_else(|| {
                    (
                        "TABLE_END without TABLE_START".to_string(),
                        index,
                        token.to_string(),
                    )
                })?;
                if cols.is_empty() || cells.len() % cols.len() != 0 {
                    return Err((
                        format!(
                            "Table has {} cells which does not fill rows of {} columns",
                            cells.len(),
                            cols.len()
                        ),
                        index,
                        token.to_string(),
                    ));
                }
                for row in cells.chunks(cols.len()) {
                    for (col, cell) in cols.iter().zip(row) {
                        out.push(KeyedLine {
                            key: col.clone(),
                            value: cell.clone(),
                            line: index,
                            raw: format!("{col}={cell}"),
                        });
                    }
                }
                cells.clear();
            }
            _ if columns.is_some() => {
                // Inside a table every record is a cell value
                cells.push(token.to_string());
            }
            _ => {
                out.push(KeyedLine {
                    key: key.to_string(),
                    value: value.to_string(),
                    line: index,
                    raw: token.to_string(),
                });
            }
        }
    }

    if columns.is_some() {
        return Err((
            "Input ended inside an open table".to_string(),
            0,
            String::new(),
        ));
    }
    Ok(out)
}

/// Rule tables for federation-submission sources
pub fn submission_rules() -> RuleTables {
    let mut t = RuleTables::default();
    t.context = [
        "EVENT_DETAILS",
        "PLAYER_LIST",
        "PIN",
        "MATCH_RESULTS",
        "SECTION_RESULTS",
        "OTHER_RESULTS",
        "PIN1",
        "FINISH",
    ]
    .into_iter()
    .collect();
    t.validmap = [
        ("EVENT_NAME", Validity::After("EVENT_DETAILS")),
        ("EVENT_DATE", Validity::After("EVENT_DETAILS")),
        ("FINAL_RESULT_DATE", Validity::After("EVENT_DETAILS")),
        ("EVENT_CODE", Validity::After("EVENT_DETAILS")),
        ("PIN", Validity::AfterAny(&["PLAYER_LIST", "PIN"])),
        ("ECF_CODE", Validity::After("PIN")),
        ("NAME", Validity::After("PIN")),
        ("CLUB", Validity::After("PIN")),
        ("CLUB_CODE", Validity::After("PIN")),
        ("CLUB_COUNTY", Validity::After("PIN")),
        (
            "PIN1",
            Validity::AfterAny(&[
                "MATCH_RESULTS",
                "SECTION_RESULTS",
                "OTHER_RESULTS",
                "PIN1",
            ]),
        ),
        ("PIN2", Validity::After("PIN1")),
        ("SCORE", Validity::After("PIN1")),
        ("ROUND", Validity::After("PIN1")),
        ("GAME_DATE", Validity::After("PIN1")),
        ("BOARD", Validity::After("PIN1")),
        ("COLOUR", Validity::After("PIN1")),
    ]
    .into_iter()
    .collect();
    t.keymap = [
        ("EVENT_NAME", "event"),
        ("EVENT_DATE", "startdate"),
        ("FINAL_RESULT_DATE", "enddate"),
        ("MATCH_RESULTS", "eventsection"),
        ("SECTION_RESULTS", "eventsection"),
        ("OTHER_RESULTS", "eventsection"),
        ("PIN", "pin"),
        ("NAME", "name"),
        ("CLUB", "affiliation"),
        ("PIN1", "homepin"),
        ("PIN2", "awaypin"),
        ("SCORE", "result"),
        ("ROUND", "round"),
        ("GAME_DATE", "date"),
        ("BOARD", "board"),
        ("COLOUR", "homeplayerwhite"),
    ]
    .into_iter()
    .collect();
    t.pinmap = ["PIN"].into_iter().collect();
    t.pinreadmap = ["PIN1", "PIN2"].into_iter().collect();
    t.gradingcodemap = [("ECF_CODE", "reportedcodes")].into_iter().collect();
    t.discardmap = ["EVENT_CODE", "CLUB_CODE", "CLUB_COUNTY", "WHITE_ON", "FINISH"]
        .into_iter()
        .collect();
    t
}

/// Normalize one submission file held in memory.
pub fn normalize_submission_text(source: &str, text: &str) -> SourceReport {
    let lines = match preprocess(text) {
        Ok(lines) => lines,
        Err((description, line, text)) => {
            return SourceReport {
                source: source.to_string(),
                records: Vec::new(),
                errors: vec![super::NormalizeIssue {
                    description,
                    line,
                    text,
                }],
            };
        }
    };
    let tables = submission_rules();
    let mut report = Normalizer::new(&tables).run(source, &lines, |_, _| true);
    for record in &mut report.records {
        translate_record(record);
    }
    report
}

/// Score and colour tokens used by the federation format
fn translate_record(record: &mut CanonicalRecord) {
    let score_map: HashMap<&str, &str> =
        [("10", "1-0"), ("55", "draw"), ("01", "0-1")].into_iter().collect();

    let bye = record
        .iter()
        .any(|(k, v)| k == "awaypin" && v == "0");

    for (key, value) in record.iter_mut() {
        match key.as_str() {
            "result" => {
                if let Some(mapped) = score_map.get(value.as_str()) {
                    *value = if bye {
                        match *mapped {
                            "1-0" => "bye-1".to_string(),
                            "draw" => "bye-0.5".to_string(),
                            other => other.to_string(),
                        }
                    } else {
                        (*mapped).to_string()
                    };
                }
            }
            "homeplayerwhite" => {
                *value = match value.as_str() {
                    "WHITE" => "yes".to_string(),
                    "BLACK" => "no".to_string(),
                    other => other.to_string(),
                };
            }
            "pin" | "homepin" | "awaypin" => {
                if value == ZERO_NOT_0 {
                    *value = "0".to_string();
                }
            }
            _ => {}
        }
    }
    if bye {
        record.retain(|(k, v)| !(k == "awaypin" && v == "0"));
    }
}
