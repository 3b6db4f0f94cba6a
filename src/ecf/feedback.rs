// src/ecf/feedback.rs

//! Feedback-reply applier
//!
//! The federation answers a committed upload with a page holding two
//! player tables: the feedback rows describing what happened to each
//! submitted player, and the submission-PIN rows naming them. Rows are
//! matched line by line between the two tables. Classification is by
//! regex over the feedback row text; application is transactional and
//! refused outright when the reply says the codes were not submitted.

use crate::db::models::{ClubMap, CodeMap, EcfClub, EcfPlayer};
use crate::error::{Error, Result};
use regex::Regex;
use rusqlite::Connection;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// What the federation did with one submitted player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAction {
    /// The submission PIN was matched to an existing code
    Matched { code: String },
    /// A fresh code was allocated
    NewCode { code: String },
    /// The old code was merged into the new one
    Merge { new: String, old: String },
    /// Nothing to apply for this row
    NoChange,
}

/// One feedback row joined with its submission-PIN row
#[derive(Debug, Clone)]
pub struct FeedbackRow {
    pub pin: Option<i64>,
    pub text: String,
    pub action: RowAction,
}

/// Parsed view of a feedback reply
#[derive(Debug, Clone)]
pub struct FeedbackReport {
    pub rows: Vec<FeedbackRow>,
    /// False when any row carried "Issue: ECFCode not submitted"; no
    /// code updates may be applied from such a reply.
    pub allow_apply_codes: bool,
}

/// Counts reported after applying a feedback reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub players_created: usize,
    pub clubs_created: usize,
    pub promoted: usize,
    pub merged: usize,
}

const CODE: &str = r"(\d{6}[A-HJKL])";

/// Row-classification patterns, compiled once
struct RowPatterns {
    exact: Regex,
    matched: Regex,
    new_code: Regex,
    merge: Regex,
}

fn patterns() -> &'static RowPatterns {
    static PATTERNS: OnceLock<RowPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| RowPatterns {
        exact: Regex::new(&format!(r"Exact match\s+{CODE}")).expect("static regex"),
        matched: Regex::new(&format!(r"Matched to\s*:\s*{CODE}")).expect("static regex"),
        new_code: Regex::new(&format!(r"New\s*:\s*{CODE}")).expect("static regex"),
        merge: Regex::new(&format!(r"{CODE}\s+was\s+{CODE}")).expect("static regex"),
    })
}

fn blocker() -> &'static Regex {
    static BLOCKER: OnceLock<Regex> = OnceLock::new();
    BLOCKER.get_or_init(|| {
        Regex::new(r"Issue:\s*ECFCode not submitted").expect("static regex")
    })
}

fn table_re() -> &'static Regex {
    static TABLE: OnceLock<Regex> = OnceLock::new();
    TABLE.get_or_init(|| Regex::new(r"(?is)<table.*?</table>").expect("static regex"))
}

fn row_re() -> &'static Regex {
    static ROW: OnceLock<Regex> = OnceLock::new();
    ROW.get_or_init(|| Regex::new(r"(?is)<tr.*?</tr>").expect("static regex"))
}

fn tag_re() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"))
}

fn strip_tags(html: &str) -> String {
    tag_re().replace_all(html, " ").trim().to_string()
}

fn table_rows(table: &str) -> Vec<String> {
    row_re()
        .find_iter(table)
        .map(|m| strip_tags(m.as_str()))
        .filter(|row| !row.is_empty())
        .collect()
}

fn classify(text: &str) -> RowAction {
    let p = patterns();
    if let Some(c) = p.exact.captures(text).or_else(|| p.matched.captures(text)) {
        return RowAction::Matched {
            code: c[1].to_string(),
        };
    }
    if let Some(c) = p.new_code.captures(text) {
        return RowAction::NewCode {
            code: c[1].to_string(),
        };
    }
    if let Some(c) = p.merge.captures(text) {
        return RowAction::Merge {
            new: c[1].to_string(),
            old: c[2].to_string(),
        };
    }
    RowAction::NoChange
}

fn leading_number(text: &str) -> Option<i64> {
    static NUM: OnceLock<Regex> = OnceLock::new();
    let re = NUM.get_or_init(|| Regex::new(r"(\d+)").expect("static regex"));
    re.captures(text).and_then(|c| c[1].parse().ok())
}

/// Parse a feedback reply. Fails when the two player tables cannot be
/// located, which means the upload itself failed.
pub fn parse_feedback(body: &str) -> Result<FeedbackReport> {
    let tables: Vec<&str> = table_re().find_iter(body).map(|m| m.as_str()).collect();
    if tables.len() < 2 {
        return Err(Error::ValidationError(
            "feedback reply does not contain the two player tables; upload failed".to_string(),
        ));
    }
    let feedback_rows = table_rows(tables[0]);
    let pin_rows = table_rows(tables[1]);

    let mut allow_apply_codes = true;
    let mut rows = Vec::new();
    for (index, text) in feedback_rows.iter().enumerate() {
        if blocker().is_match(text) {
            allow_apply_codes = false;
        }
        let pin = pin_rows.get(index).and_then(|row| leading_number(row));
        rows.push(FeedbackRow {
            pin,
            text: text.clone(),
            action: classify(text),
        });
    }
    debug!(
        "Parsed feedback: {} rows, codes {}",
        rows.len(),
        if allow_apply_codes { "applicable" } else { "blocked" }
    );
    Ok(FeedbackReport {
        rows,
        allow_apply_codes,
    })
}

/// Insert a master-list row for a code the reply names, taking the
/// player's name from the pending proposal. New rows arrive inactive;
/// the next master-list load confirms them.
fn ensure_player(
    conn: &Connection,
    code: &str,
    name: &str,
    stats: &mut ApplyStats,
) -> Result<()> {
    if EcfPlayer::find_by_code(conn, code)?.is_none() {
        let mut player = EcfPlayer::new(code.to_string(), name.to_string());
        player.active = false;
        player.insert(conn)?;
        stats.players_created += 1;
    }
    Ok(())
}

/// Apply a parsed feedback reply. Must run inside a caller-opened
/// transaction; any error leaves the store untouched.
pub fn apply_feedback(conn: &Connection, report: &FeedbackReport) -> Result<ApplyStats> {
    if !report.allow_apply_codes {
        return Err(Error::ValidationError(
            "feedback reply says the codes were not submitted; nothing applied".to_string(),
        ));
    }
    let mut stats = ApplyStats::default();

    // Phase one: master-list rows for every code the reply names, and
    // for the clubs proposed in the submission
    for row in &report.rows {
        let code = match &row.action {
            RowAction::Matched { code } | RowAction::NewCode { code } => code,
            RowAction::Merge { .. } | RowAction::NoChange => continue,
        };
        let name = row
            .pin
            .map(|pin| CodeMap::find_by_alias(conn, pin))
            .transpose()?
            .flatten()
            .map(|map| map.ecf_name.unwrap_or(map.player_name))
            .unwrap_or_default();
        ensure_player(conn, code, &name, &mut stats)?;
    }
    for proposal in ClubMap::pending_proposals(conn)? {
        if let Some(code) = &proposal.club_ecf_code {
            if EcfClub::find_by_code(conn, code)?.is_none() {
                let mut club = EcfClub::new(
                    code.clone(),
                    proposal.club_ecf_name.clone().unwrap_or_default(),
                );
                club.active = false;
                club.insert(conn)?;
                stats.clubs_created += 1;
            }
        }
    }

    // Phase two: proposals whose code now exists on the master list
    for mut map in CodeMap::pending_proposals(conn)? {
        let Some(code) = map.ecf_code.clone() else {
            continue;
        };
        if EcfPlayer::find_by_code(conn, &code)?.is_some() {
            map.promote(conn, &code)?;
            stats.promoted += 1;
        }
    }

    // Phase three: per-PIN matches and allocations
    for row in &report.rows {
        let code = match &row.action {
            RowAction::Matched { code } | RowAction::NewCode { code } => code.clone(),
            _ => continue,
        };
        let Some(pin) = row.pin else {
            warn!("Feedback row with code {code} has no submission PIN");
            continue;
        };
        let Some(mut map) = CodeMap::find_by_alias(conn, pin)? else {
            warn!("Feedback names PIN {pin} with no code map");
            continue;
        };
        if map.player_code.as_deref() == Some(code.as_str()) {
            continue;
        }
        map.promote(conn, &code)?;
        stats.promoted += 1;
    }

    // Phase four: federation-side code merges
    for row in &report.rows {
        let RowAction::Merge { new, old } = &row.action else {
            continue;
        };
        let Some(mut player) = EcfPlayer::find_by_code(conn, old)? else {
            warn!("Merge row names unknown code {old}");
            continue;
        };
        if player.merge_into.as_deref() == Some(new.as_str()) && !player.active {
            continue;
        }
        player.merge_into = Some(new.clone());
        player.active = false;
        player.update(conn)?;
        stats.merged += 1;
    }

    info!(
        "Feedback applied: {} players created, {} clubs created, {} promoted, {} merged",
        stats.players_created, stats.clubs_created, stats.promoted, stats.merged
    );
    Ok(stats)
}

/// Scan a "list players" page for the rows matching one membership
/// number. Each row holds a row identifier, a grading code, and
/// optionally the membership number. More than one match is an error.
pub fn code_for_membership_number(
    body: &str,
    number: &str,
) -> Result<Option<(String, String, String)>> {
    static ROW_FIELDS: OnceLock<Regex> = OnceLock::new();
    let re = ROW_FIELDS.get_or_init(|| {
        Regex::new(&format!(r"(?m)^\s*(\S+)\s+{CODE}\s+(\S+)\s*$")).expect("static regex")
    });

    let mut found: Option<(String, String, String)> = None;
    for row in table_rows(body)
        .into_iter()
        .chain(body.lines().map(str::to_string))
    {
        let Some(captures) = re.captures(&row) else {
            continue;
        };
        if &captures[3] != number {
            continue;
        }
        let hit = (
            captures[1].to_string(),
            captures[2].to_string(),
            captures[3].to_string(),
        );
        match &found {
            None => found = Some(hit),
            Some(existing) if *existing == hit => {}
            Some(_) => return Err(Error::TooManyCodes(number.to_string())),
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::models::{Alias, Event};

    fn reply(feedback_cells: &[&str], pins: &[i64]) -> String {
        let rows1: String = feedback_cells
            .iter()
            .map(|c| format!("<tr><td>{c}</td></tr>"))
            .collect();
        let rows2: String = pins
            .iter()
            .map(|p| format!("<tr><td>{p}</td><td>player</td></tr>"))
            .collect();
        format!("<html><table>{rows1}</table><table>{rows2}</table></html>")
    }

    fn seed_person(conn: &Connection, name: &str, ecf_name: &str) -> i64 {
        let event_id = Event::intern(conn, "Open", "2024-01-01", "2024-01-07").unwrap();
        let id = Alias::intern(conn, name, event_id, None, None, None).unwrap();
        Alias::declare_new(conn, id).unwrap();
        let mut map = CodeMap::new(id, name.to_string());
        map.ecf_name = Some(ecf_name.to_string());
        map.insert(conn).unwrap();
        id
    }

    #[test]
    fn test_missing_tables_is_failed_upload() {
        assert!(parse_feedback("<html>nothing here</html>").is_err());
    }

    #[test]
    fn test_blocker_prevents_apply() {
        let conn = db::open_in_memory().unwrap();
        let body = reply(&["Issue: ECFCode not submitted", "New : 123456A"], &[1, 2]);
        let report = parse_feedback(&body).unwrap();
        assert!(!report.allow_apply_codes);
        assert!(apply_feedback(&conn, &report).is_err());
    }

    #[test]
    fn test_matched_row_promotes_and_creates_player() {
        let conn = db::open_in_memory().unwrap();
        let pin = seed_person(&conn, "Smith A", "Smith, A");
        let body = reply(&["Matched to : 123456A"], &[pin]);
        let report = parse_feedback(&body).unwrap();
        let stats = apply_feedback(&conn, &report).unwrap();
        assert_eq!(stats.players_created, 1);

        let map = CodeMap::find_by_alias(&conn, pin).unwrap().unwrap();
        assert_eq!(map.player_code.as_deref(), Some("123456A"));
        assert_eq!(map.ecf_code, None);
        assert_eq!(map.ecf_name, None);

        let player = EcfPlayer::find_by_code(&conn, "123456A").unwrap().unwrap();
        assert_eq!(player.name, "Smith, A");
        assert!(!player.active);
    }

    #[test]
    fn test_merge_row_supersedes_old_code() {
        let conn = db::open_in_memory().unwrap();
        EcfPlayer::new("123456A".to_string(), "Smith, A".to_string())
            .insert(&conn)
            .unwrap();
        EcfPlayer::new("111111F".to_string(), "Smith, A".to_string())
            .insert(&conn)
            .unwrap();
        let body = reply(&["123456A was 111111F"], &[1]);
        let report = parse_feedback(&body).unwrap();
        // Matched/new codes need a pin; the merge row alone applies
        let stats = apply_feedback(&conn, &report).unwrap();
        assert_eq!(stats.merged, 1);

        let old = EcfPlayer::find_by_code(&conn, "111111F").unwrap().unwrap();
        assert_eq!(old.merge_into.as_deref(), Some("123456A"));
        assert!(!old.active);
        // Replay is a no-op
        assert_eq!(apply_feedback(&conn, &report).unwrap().merged, 0);
    }

    #[test]
    fn test_membership_lookup_rejects_two_matches() {
        let body = "\
row1 123456A ME001
row2 111111F ME002
";
        let hit = code_for_membership_number(body, "ME002").unwrap().unwrap();
        assert_eq!(hit.1, "111111F");
        assert!(code_for_membership_number(body, "ME999").unwrap().is_none());

        let dup = "\
row1 123456A ME001
row2 111111F ME001
";
        assert!(matches!(
            code_for_membership_number(dup, "ME001"),
            Err(Error::TooManyCodes(_))
        ));
    }
}
