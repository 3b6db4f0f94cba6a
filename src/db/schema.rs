// src/db/schema.rs

//! Database schema definitions and migrations for gradebase
//!
//! This module defines the SQLite schema for all core tables and provides
//! a migration system to evolve the schema over time.

use crate::error::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    info!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        info!("Schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!(
        "Schema migration complete. Now at version {}",
        SCHEMA_VERSION
    );
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => panic!("Unknown migration version: {}", version),
    }
}

/// Initial schema - Version 1
///
/// Creates all core tables for gradebase:
/// - names: shared string resources for event, section, and team labels
/// - events: competition occurrences keyed by (name, startdate, enddate)
/// - aliases: player-name-as-reported, the atomic identity unit
/// - games: scored pairings
/// - ecf_players / ecf_clubs / ecf_dates: federation master-list mirror
/// - code_maps / club_maps: links between local identities and federation codes
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        -- Names: canonicalized text labels shared by events, sections, teams
        CREATE TABLE names (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE INDEX idx_names_name ON names(name);

        -- Events: unique on the (name, startdate, enddate) triple
        CREATE TABLE events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name_id INTEGER NOT NULL,
            startdate TEXT NOT NULL,
            enddate TEXT NOT NULL,
            UNIQUE(name_id, startdate, enddate),
            FOREIGN KEY (name_id) REFERENCES names(id)
        );

        CREATE INDEX idx_events_name_id ON events(name_id);

        -- Sections belonging to an event; grows monotonically
        CREATE TABLE event_sections (
            event_id INTEGER NOT NULL,
            name_id INTEGER NOT NULL,
            PRIMARY KEY (event_id, name_id),
            FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE,
            FOREIGN KEY (name_id) REFERENCES names(id)
        );

        -- Submission header for an event: federation event code and the
        -- running index used to number submission files
        CREATE TABLE event_details (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id INTEGER NOT NULL UNIQUE,
            event_code TEXT NOT NULL,
            submission_index INTEGER NOT NULL DEFAULT 0,
            results_officer TEXT,
            results_officer_address TEXT,
            treasurer TEXT,
            treasurer_address TEXT,
            FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE
        );

        -- Aliases: a player name as reported within one event/section/PIN
        -- scope. merge/alias_list encode the identity tri-state:
        --   merge NULL              -> unresolved
        --   merge 'false'           -> main record, alias_list = JSON PK array
        --   merge '<pk>'            -> merged into <pk>, alias_list = '<pk>'
        CREATE TABLE aliases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            event_id INTEGER NOT NULL,
            section_id INTEGER,
            pin TEXT,
            affiliation_id INTEGER,
            merge TEXT,
            alias_list TEXT,
            FOREIGN KEY (event_id) REFERENCES events(id),
            FOREIGN KEY (section_id) REFERENCES names(id),
            FOREIGN KEY (affiliation_id) REFERENCES names(id)
        );

        CREATE INDEX idx_aliases_identity ON aliases(name, event_id, section_id, pin);
        CREATE INDEX idx_aliases_event_id ON aliases(event_id);
        CREATE INDEX idx_aliases_merge ON aliases(merge);

        -- Games: one scored pairing
        CREATE TABLE games (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id INTEGER NOT NULL,
            section_id INTEGER,
            round TEXT,
            board TEXT,
            date TEXT,
            home_alias_id INTEGER NOT NULL,
            -- NULL for bye results; the federation reserves PIN 0 for these
            away_alias_id INTEGER,
            result TEXT NOT NULL CHECK(result IN (
                'home-win', 'draw', 'away-win', 'home-default',
                'away-default', 'void', 'bye-win', 'bye-draw')),
            homeplayerwhite INTEGER,
            hometeam_id INTEGER,
            awayteam_id INTEGER,
            FOREIGN KEY (event_id) REFERENCES events(id),
            FOREIGN KEY (section_id) REFERENCES names(id),
            FOREIGN KEY (home_alias_id) REFERENCES aliases(id),
            FOREIGN KEY (away_alias_id) REFERENCES aliases(id),
            FOREIGN KEY (hometeam_id) REFERENCES names(id),
            FOREIGN KEY (awayteam_id) REFERENCES names(id)
        );

        CREATE INDEX idx_games_event_id ON games(event_id);
        CREATE INDEX idx_games_home_alias ON games(home_alias_id);
        CREATE INDEX idx_games_away_alias ON games(away_alias_id);

        -- Federation master list: players
        CREATE TABLE ecf_players (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            club_codes TEXT NOT NULL DEFAULT '[]',
            merge_into TEXT
        );

        CREATE INDEX idx_ecf_players_name ON ecf_players(name);

        -- Federation master list: clubs
        CREATE TABLE ecf_clubs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            county TEXT
        );

        -- Provenance stamp for each federation data load
        CREATE TABLE ecf_dates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            objtype TEXT NOT NULL CHECK(objtype IN ('player', 'club')),
            txntype TEXT NOT NULL,
            ecf_date TEXT NOT NULL,
            applied_date TEXT NOT NULL
        );

        -- Person -> federation player code, plus the proposed-code workspace
        CREATE TABLE code_maps (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            alias_id INTEGER NOT NULL UNIQUE,
            player_name TEXT NOT NULL,
            player_code TEXT,
            ecf_code TEXT,
            ecf_name TEXT,
            FOREIGN KEY (alias_id) REFERENCES aliases(id)
        );

        CREATE INDEX idx_code_maps_player_code ON code_maps(player_code);

        -- Alias -> federation club code, plus the proposed-club workspace
        CREATE TABLE club_maps (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            alias_id INTEGER NOT NULL UNIQUE,
            player_name TEXT NOT NULL,
            club_code TEXT,
            club_ecf_code TEXT,
            club_ecf_name TEXT,
            FOREIGN KEY (alias_id) REFERENCES aliases(id)
        );
        ",
    )?;

    debug!("Schema version 1 created successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_memory() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrate_fresh_database() {
        let conn = open_memory();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migrate_idempotent() {
        let conn = open_memory();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_core_tables_exist() {
        let conn = open_memory();
        migrate(&conn).unwrap();
        for table in [
            "names",
            "events",
            "event_sections",
            "event_details",
            "aliases",
            "games",
            "ecf_players",
            "ecf_clubs",
            "ecf_dates",
            "code_maps",
            "club_maps",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}
