// src/commands.rs
//! Command handlers for the gradebase CLI

use anyhow::Result;
use gradebase::config::Config;
use gradebase::db;
use gradebase::ecf::client::{EcfClient, SubmitOptions};
use gradebase::ecf::{self, feedback, masterlist};
use gradebase::exchange::{self, collate};
use gradebase::identity;
use gradebase::normalize::{self, SourceReport};
use gradebase::task::{run_task, CancelToken, TracingLog};
use indicatif::ProgressBar;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Spinner shown while a federation download is in flight
fn download_spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Check an override URL before handing it to the client
fn checked_url<'a>(url: Option<&'a str>, default: &'a str) -> Result<&'a str> {
    let url = url.unwrap_or(default);
    url::Url::parse(url).map_err(|e| anyhow::anyhow!("{url}: {e}"))?;
    Ok(url)
}

/// Write text to a path, or to stdout when no path was given
fn write_or_print(output: Option<&str>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            println!("Wrote {}", path);
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn bail_on_source_errors(reports: &[SourceReport]) -> Result<()> {
    for report in reports {
        for issue in &report.errors {
            eprintln!(
                "{}: line {}: {}: {}",
                report.source,
                issue.line + 1,
                issue.description,
                issue.text
            );
        }
    }
    if reports.iter().all(|r| r.is_ok()) {
        Ok(())
    } else {
        Err(anyhow::anyhow!("normalization failed"))
    }
}

pub fn init(db_path: &str) -> Result<()> {
    db::init(db_path)?;
    println!("Database initialized at: {}", db_path);
    Ok(())
}

pub fn normalize(files: &[String], format: &str, output: Option<&str>) -> Result<()> {
    if files.is_empty() {
        return Err(anyhow::anyhow!("no source files given"));
    }
    let mut reports = Vec::new();
    for file in files {
        let path = Path::new(file);
        match format {
            "league" => reports.extend(normalize::league::normalize_league_path(path)?),
            "submission" => {
                let source = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("submission")
                    .to_string();
                let text = std::fs::read_to_string(path)?;
                reports.push(normalize::submission_file::normalize_submission_text(
                    &source, &text,
                ));
            }
            other => return Err(anyhow::anyhow!("unknown source format: {}", other)),
        }
    }
    bail_on_source_errors(&reports)?;
    write_or_print(output, &normalize::render_stream(&reports))
}

pub fn import(file: &str, db_path: &str, dry_run: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)?;
    let report = exchange::parse_import_text(&text);
    if !report.is_ok() {
        for issue in &report.errors {
            eprintln!(
                "line {}: {}: {}",
                issue.line + 1,
                issue.description,
                issue.text
            );
        }
        return Err(anyhow::anyhow!("import file rejected"));
    }

    let collation = collate(&report);
    println!(
        "{}: {} games across {} events, {} identities",
        file,
        collation.game_count(),
        collation.events.len(),
        report.gameplayer.len()
    );
    if dry_run {
        return Ok(());
    }

    let mut conn = db::open(db_path)?;
    let log = TracingLog;
    let token = CancelToken::new();
    let outcome = run_task(&mut conn, &log, &token, "import", |tx, _, _| {
        if report.has_identification() {
            let bad_pairs = identity::is_new_player_inconsistent(tx, &report)?;
            if !bad_pairs.is_empty() {
                return Err(gradebase::Error::ReplyInconsistent(format!(
                    "{} identification pairs contradict the local graph",
                    bad_pairs.len()
                )));
            }
        }
        let stats = exchange::store_report(tx, &report)?;
        let identified = identity::identify_players(tx, &report)?;
        let conflicts = identity::is_player_identification_inconsistent(tx, &report)?;
        if !conflicts.is_empty() {
            return Err(gradebase::Error::ReplyInconsistent(format!(
                "{} players resolve against the local graph",
                conflicts.len()
            )));
        }
        let merged = identity::merge_players(tx, &report)?;
        info!(
            "Stored {} events, {} games, {} aliases",
            stats.events, stats.games, stats.aliases
        );
        Ok((stats, identified, merged))
    })?;
    if let Some((stats, identified, merged)) = outcome {
        println!(
            "Imported {} games ({} new aliases, {} identified, {} merged)",
            stats.games, stats.aliases, identified, merged
        );
    }
    Ok(())
}

pub fn export_event(event_id: i64, db_path: &str, output: Option<&str>) -> Result<()> {
    let conn = db::open(db_path)?;
    let text = exchange::export_event(&conn, event_id)?;
    write_or_print(output, &text)
}

pub fn export_players(db_path: &str, output: Option<&str>) -> Result<()> {
    let conn = db::open(db_path)?;
    let text = exchange::export_players_on_database(&conn)?;
    write_or_print(output, &text)
}

pub fn submission(event_ids: &[i64], db_path: &str, output_dir: &str) -> Result<()> {
    let mut conn = db::open(db_path)?;
    let path = ecf::write_submission(&mut conn, event_ids, Path::new(output_dir))?;
    println!("Wrote {}", path.display());
    Ok(())
}

pub fn submit(
    file: &str,
    username: &str,
    password: &str,
    email_graders: bool,
    report_only: bool,
    output: Option<&str>,
) -> Result<()> {
    let config = Config::load()?;
    let bytes = std::fs::read(file)?;
    let file_name = Path::new(file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("submission.txt");
    let client = EcfClient::new()?;
    let reply = client.submit(
        &config.urls.submit,
        username,
        password,
        file_name,
        bytes,
        SubmitOptions {
            email_graders,
            report_only,
            auto_create_players: false,
        },
    )?;

    match feedback::parse_feedback(&reply) {
        Ok(parsed) => println!(
            "Upload accepted: {} feedback rows{}",
            parsed.rows.len(),
            if parsed.allow_apply_codes {
                ""
            } else {
                " (codes not applicable)"
            }
        ),
        Err(e) => eprintln!("Upload not confirmed: {e}"),
    }
    match output {
        Some(path) => {
            std::fs::write(path, &reply)?;
            println!("Saved reply to {}", path);
        }
        None => println!("{reply}"),
    }
    Ok(())
}

pub fn apply_feedback(file: &str, db_path: &str) -> Result<()> {
    let reply = std::fs::read_to_string(file)?;
    let report = feedback::parse_feedback(&reply)?;
    let mut conn = db::open(db_path)?;
    let stats = db::transaction(&mut conn, |tx| feedback::apply_feedback(tx, &report))?;
    println!(
        "Feedback applied: {} players created, {} clubs created, {} codes promoted, {} merged",
        stats.players_created, stats.clubs_created, stats.promoted, stats.merged
    );
    Ok(())
}

pub fn masterlist_clubs(db_path: &str, url: Option<&str>) -> Result<()> {
    let config = Config::load()?;
    let url = checked_url(url, &config.urls.active_clubs)?;
    let client = EcfClient::new()?;
    let spinner = download_spinner("Downloading club list");
    let download = client.download_clubs(url);
    spinner.finish_and_clear();
    let download = download?;

    let mut conn = db::open(db_path)?;
    let log = TracingLog;
    let token = CancelToken::new();
    let outcome = run_task(&mut conn, &log, &token, "club list", |tx, token, log| {
        masterlist::apply_clubs(tx, &download, token, log)
    })?;
    if let Some(stats) = outcome {
        println!(
            "Club list applied: {} new, {} updated",
            stats.inserted, stats.updated
        );
    }
    Ok(())
}

pub fn masterlist_players(db_path: &str, url: Option<&str>) -> Result<()> {
    let config = Config::load()?;
    let url = checked_url(url, &config.urls.players_ratings)?;
    let client = EcfClient::new()?;
    let spinner = download_spinner("Downloading player ratings");
    let download = client.download_players(url);
    spinner.finish_and_clear();
    let download = download?;

    let mut conn = db::open(db_path)?;
    let log = TracingLog;
    let token = CancelToken::new();
    let outcome = run_task(&mut conn, &log, &token, "player list", |tx, token, log| {
        masterlist::apply_players(tx, &download, token, log)
    })?;
    if let Some(stats) = outcome {
        println!(
            "Player list applied: {} new, {} updated, {} skipped",
            stats.inserted, stats.updated, stats.skipped
        );
    }
    Ok(())
}

pub fn lookup_player(code: &str) -> Result<()> {
    if !ecf::is_valid_code(code) {
        return Err(anyhow::anyhow!("{} is not a valid grading code", code));
    }
    let config = Config::load()?;
    let client = EcfClient::new()?;
    let player = client.lookup_player(&config.urls.player_lookup, code)?;
    println!("{}  {}", player.ecf_code, player.full_name);
    if let (Some(code), Some(name)) = (&player.club_code, &player.club_name) {
        println!("Club: {} ({})", name, code);
    }
    Ok(())
}

pub fn lookup_club(code: &str) -> Result<()> {
    let config = Config::load()?;
    let client = EcfClient::new()?;
    let club = client.lookup_club(&config.urls.club_lookup, code)?;
    println!("{}  {}", club.club_code, club.club_name);
    if let Some(county) = &club.assoc_name {
        println!("Association: {}", county);
    }
    Ok(())
}
