// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use gradebase::db;
use tempfile::TempDir;

/// Create an empty test database.
///
/// Returns (TempDir, db_path) - keep the TempDir alive to prevent cleanup.
pub fn setup_test_db() -> (TempDir, String) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_str()
        .unwrap()
        .to_string();

    db::init(&db_path).unwrap();

    (temp_dir, db_path)
}

/// An export stream with two games and one merge group joining the two
/// spellings of the same player.
pub fn sample_export() -> String {
    "\
event=City Open
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
event=City Open
startdate=2024-01-01
enddate=2024-01-07
eventsection=Main
round=2
homename=Brown C
homepin=3
awayname=Smith, A
awaypinfalse=
result=draw
homeplayerwhite=no
name=Smith A
event=City Open
startdate=2024-01-01
enddate=2024-01-07
section=Main
pin=1
name=Smith, A
event=City Open
startdate=2024-01-01
enddate=2024-01-07
section=Main
pinfalse=
exportedeventplayer=
"
    .to_string()
}
