// tests/submission.rs

//! Federation submission workflow: pre-checks, file build, and
//! feedback application.

mod common;

use gradebase::db;
use gradebase::db::models::{
    Alias, ClubMap, CodeMap, EcfClub, EcfPlayer, Event, EventDetails, Game, GameResult,
};
use gradebase::ecf::{feedback, submission};
use gradebase::normalize::submission_file::normalize_submission_text;
use rusqlite::Connection;

struct Seed {
    event_id: i64,
    smith: i64,
    jones: i64,
}

/// Two resolved players: Smith with a confirmed code and club, Jones
/// with a proposed code and an explicit no-club assertion. One decisive
/// game plus a bye for Jones.
fn seed(conn: &Connection) -> Seed {
    let event_id = Event::intern(conn, "City Open", "2024-01-01", "2024-01-07").unwrap();
    EventDetails::new(event_id, "123456".to_string())
        .insert(conn)
        .unwrap();

    let smith = Alias::intern(conn, "Smith A", event_id, None, Some("1"), None).unwrap();
    Alias::declare_new(conn, smith).unwrap();
    let jones = Alias::intern(conn, "Jones B", event_id, None, Some("2"), None).unwrap();
    Alias::declare_new(conn, jones).unwrap();

    EcfPlayer::new("222222L".to_string(), "Smith, A".to_string())
        .insert(conn)
        .unwrap();
    let mut club = EcfClub::new("1ABC".to_string(), "Kings Head".to_string());
    club.county = Some("Yorkshire".to_string());
    club.insert(conn).unwrap();

    let mut smith_code = CodeMap::new(smith, "Smith A".to_string());
    smith_code.player_code = Some("222222L".to_string());
    smith_code.insert(conn).unwrap();
    let mut smith_club = ClubMap::new(smith, "Smith A".to_string());
    smith_club.club_code = Some("1ABC".to_string());
    smith_club.insert(conn).unwrap();

    let mut jones_code = CodeMap::new(jones, "Jones B".to_string());
    jones_code.ecf_code = Some("111111F".to_string());
    jones_code.ecf_name = Some("Jones, B".to_string());
    jones_code.insert(conn).unwrap();
    ClubMap::new(jones, "Jones B".to_string())
        .insert(conn)
        .unwrap();

    let mut game = Game::new(event_id, smith, Some(jones), GameResult::HomeWin);
    game.round = Some("1".to_string());
    game.homeplayerwhite = Some(true);
    game.insert(conn).unwrap();
    let mut bye = Game::new(event_id, jones, None, GameResult::ByeDraw);
    bye.round = Some("2".to_string());
    bye.insert(conn).unwrap();

    Seed {
        event_id,
        smith,
        jones,
    }
}

#[test]
fn test_submission_file_builds_and_parses() {
    let (temp_dir, db_path) = common::setup_test_db();
    let mut conn = db::open(&db_path).unwrap();
    let seed = seed(&conn);

    let path = submission::write_submission(&mut conn, &[seed.event_id], temp_dir.path()).unwrap();
    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some("12345601.txt")
    );

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("#EVENT_CODE=123456"));
    assert!(text.contains("#ECF_CODE=222222L"));
    assert!(text.contains("#NAME=Jones, B"));
    assert!(text.contains("#CLUB_CODE=1ABC"));
    assert!(text.contains("#CLUB_COUNTY=Yorkshire"));
    assert!(text.contains("#SCORE=10"));
    // The bye scores a draw against PIN 0
    assert!(text.contains("#SCORE=55"));
    assert!(text.contains("#PIN2=0"));
    assert!(text.trim_end().ends_with("#FINISH"));

    // The file survives the submission-format normalizer
    let report = normalize_submission_text("12345601", &text);
    assert!(report.is_ok(), "{:?}", report.errors);

    // A second build bumps the per-event index
    let path = submission::write_submission(&mut conn, &[seed.event_id], temp_dir.path()).unwrap();
    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some("12345602.txt")
    );
}

#[test]
fn test_precheck_rejects_unmapped_player() {
    let (temp_dir, db_path) = common::setup_test_db();
    let mut conn = db::open(&db_path).unwrap();

    let event_id = Event::intern(&conn, "City Open", "2024-01-01", "2024-01-07").unwrap();
    EventDetails::new(event_id, "123456".to_string())
        .insert(&conn)
        .unwrap();
    let smith = Alias::intern(&conn, "Smith A", event_id, None, Some("1"), None).unwrap();
    Alias::declare_new(&conn, smith).unwrap();
    Game::new(event_id, smith, None, GameResult::ByeWin)
        .insert(&conn)
        .unwrap();

    let err = submission::write_submission(&mut conn, &[event_id], temp_dir.path()).unwrap_err();
    assert!(err.to_string().contains("Smith A"));
    // The failed build bumped nothing
    let details = EventDetails::find_by_event(&conn, event_id).unwrap().unwrap();
    assert_eq!(details.submission_index, 0);
}

#[test]
fn test_feedback_promotes_proposed_code() {
    let (_temp_dir, db_path) = common::setup_test_db();
    let mut conn = db::open(&db_path).unwrap();
    let seed = seed(&conn);

    let reply = format!(
        "<html><table>\
<tr><td>Exact match 222222L</td></tr>\
<tr><td>New : 111111F</td></tr>\
</table><table>\
<tr><td>{}</td><td>Smith, A</td></tr>\
<tr><td>{}</td><td>Jones, B</td></tr>\
</table></html>",
        seed.smith, seed.jones
    );
    let report = feedback::parse_feedback(&reply).unwrap();
    assert!(report.allow_apply_codes);

    let stats = db::transaction(&mut conn, |tx| feedback::apply_feedback(tx, &report)).unwrap();
    assert_eq!(stats.players_created, 1);
    assert_eq!(stats.promoted, 1);

    let map = CodeMap::find_by_alias(&conn, seed.jones).unwrap().unwrap();
    assert_eq!(map.player_code.as_deref(), Some("111111F"));
    assert_eq!(map.ecf_code, None);
    let player = EcfPlayer::find_by_code(&conn, "111111F").unwrap().unwrap();
    assert_eq!(player.name, "Jones, B");
    assert!(!player.active);
}
