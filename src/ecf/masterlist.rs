// src/ecf/masterlist.rs

//! Federation master-list maintenance
//!
//! A master-list load is wholesale: every stored row is first marked
//! inactive, the downloaded rows are upserted active, and a provenance
//! stamp records the federation's publication date alongside the date
//! the load was applied here. Rows absent from the new list stay dark
//! but are kept; code maps may still reference them.

use super::client::{ClubsDownload, PlayersDownload};
use crate::db::models::{EcfClub, EcfDate, EcfObjType, EcfPlayer};
use crate::error::Result;
use crate::task::{CancelToken, LogSink};
use chrono::Local;
use rusqlite::Connection;
use tracing::warn;

/// Counts reported after a master-list load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Replace the club master list from a download. Runs inside the
/// caller's transaction.
pub fn apply_clubs(
    conn: &Connection,
    download: &ClubsDownload,
    token: &CancelToken,
    log: &dyn LogSink,
) -> Result<LoadStats> {
    let mut stats = LoadStats::default();
    EcfClub::deactivate_all(conn)?;
    for row in &download.clubs {
        token.check()?;
        match EcfClub::find_by_code(conn, &row.club_code)? {
            Some(mut club) => {
                club.name = row.club_name.clone();
                club.active = true;
                club.county = row.assoc_name.clone();
                club.update(conn)?;
                stats.updated += 1;
            }
            None => {
                let mut club = EcfClub::new(row.club_code.clone(), row.club_name.clone());
                club.county = row.assoc_name.clone();
                club.insert(conn)?;
                stats.inserted += 1;
            }
        }
    }
    stamp(conn, EcfObjType::Club, "active-clubs", None)?;
    log.log(&format!(
        "Club list applied: {} new, {} updated",
        stats.inserted, stats.updated
    ));
    Ok(stats)
}

/// Replace the player master list from a download. Rows whose grading
/// code fails the check-letter test are skipped with a warning rather
/// than aborting the load.
pub fn apply_players(
    conn: &Connection,
    download: &PlayersDownload,
    token: &CancelToken,
    log: &dyn LogSink,
) -> Result<LoadStats> {
    download.check_columns()?;
    let mut stats = LoadStats::default();
    EcfPlayer::deactivate_all(conn)?;
    for row in &download.players {
        token.check()?;
        let Some(code) = PlayersDownload::cell(row, "ECF_code") else {
            stats.skipped += 1;
            continue;
        };
        let name = PlayersDownload::cell(row, "full_name").unwrap_or_default();
        let club_codes: Vec<String> = PlayersDownload::cell(row, "club_code")
            .map(|c| vec![c.to_string()])
            .unwrap_or_default();
        match EcfPlayer::find_by_code(conn, code)? {
            Some(mut player) => {
                player.name = name.to_string();
                player.active = true;
                player.club_codes = club_codes;
                player.update(conn)?;
                stats.updated += 1;
            }
            None => {
                let mut player = EcfPlayer::new(code.to_string(), name.to_string());
                player.club_codes = club_codes;
                match player.insert(conn) {
                    Ok(_) => stats.inserted += 1,
                    Err(e) => {
                        warn!("Skipping player row {code}: {e}");
                        stats.skipped += 1;
                    }
                }
            }
        }
    }
    stamp(
        conn,
        EcfObjType::Player,
        "rating-list",
        Some(download.rating_effective_date.as_str()),
    )?;
    log.log(&format!(
        "Player list applied: {} new, {} updated, {} skipped",
        stats.inserted, stats.updated, stats.skipped
    ));
    Ok(stats)
}

fn stamp(
    conn: &Connection,
    objtype: EcfObjType,
    txntype: &str,
    ecf_date: Option<&str>,
) -> Result<()> {
    let today = Local::now().date_naive().to_string();
    EcfDate::new(
        objtype,
        txntype.to_string(),
        ecf_date.unwrap_or(&today).to_string(),
        today,
    )
    .insert(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::ecf::client::{parse_clubs, parse_players, PLAYERS_RATINGS_COLUMNS};
    use crate::task::MemoryLog;

    fn clubs_download(rows: &[(&str, &str)]) -> ClubsDownload {
        let clubs: Vec<_> = rows
            .iter()
            .map(|(code, name)| serde_json::json!({"club_code": code, "club_name": name}))
            .collect();
        let body = serde_json::json!({"clubs": clubs, "success": true}).to_string();
        parse_clubs(&body).unwrap()
    }

    fn players_download(rows: &[(&str, &str, Option<&str>)]) -> PlayersDownload {
        let players: Vec<Vec<serde_json::Value>> = rows
            .iter()
            .map(|(code, name, club)| {
                let mut row = vec![serde_json::Value::Null; 28];
                row[0] = serde_json::json!(code);
                row[3] = serde_json::json!(name);
                if let Some(club) = club {
                    row[26] = serde_json::json!(club);
                }
                row
            })
            .collect();
        let body = serde_json::json!({
            "rating_effective_date": "2024-08-01",
            "column_names": PLAYERS_RATINGS_COLUMNS.to_vec(),
            "players": players,
            "success": true,
        })
        .to_string();
        parse_players(&body).unwrap()
    }

    #[test]
    fn test_absent_rows_go_dark() {
        let conn = db::open_in_memory().unwrap();
        let token = CancelToken::new();
        let log = MemoryLog::new();
        apply_clubs(
            &conn,
            &clubs_download(&[("1ABC", "Kings Head"), ("2DEF", "Rooks")]),
            &token,
            &log,
        )
        .unwrap();
        apply_clubs(&conn, &clubs_download(&[("1ABC", "Kings Head")]), &token, &log).unwrap();

        assert!(EcfClub::find_by_code(&conn, "1ABC").unwrap().unwrap().active);
        assert!(!EcfClub::find_by_code(&conn, "2DEF").unwrap().unwrap().active);
    }

    #[test]
    fn test_player_load_stamps_provenance() {
        let conn = db::open_in_memory().unwrap();
        let token = CancelToken::new();
        let log = MemoryLog::new();
        let stats = apply_players(
            &conn,
            &players_download(&[
                ("123456A", "Smith, A", Some("1ABC")),
                ("999999X", "Bad Code", None),
            ]),
            &token,
            &log,
        )
        .unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.skipped, 1);

        let stamp = EcfDate::latest(&conn, EcfObjType::Player).unwrap().unwrap();
        assert_eq!(stamp.ecf_date, "2024-08-01");
        let player = EcfPlayer::find_by_code(&conn, "123456A").unwrap().unwrap();
        assert_eq!(player.club_codes, vec!["1ABC"]);
    }
}
