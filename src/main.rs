// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands, LookupCommands, MasterlistCommands};

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { db_path }) => commands::init(&db_path),
        Some(Commands::Normalize {
            files,
            format,
            output,
        }) => commands::normalize(&files, &format, output.as_deref()),
        Some(Commands::Import {
            file,
            db_path,
            dry_run,
        }) => commands::import(&file, &db_path, dry_run),
        Some(Commands::ExportEvent {
            event_id,
            db_path,
            output,
        }) => commands::export_event(event_id, &db_path, output.as_deref()),
        Some(Commands::ExportPlayers { db_path, output }) => {
            commands::export_players(&db_path, output.as_deref())
        }
        Some(Commands::Submission {
            event_ids,
            db_path,
            output_dir,
        }) => commands::submission(&event_ids, &db_path, &output_dir),
        Some(Commands::Submit {
            file,
            username,
            password,
            email_graders,
            report_only,
            output,
        }) => commands::submit(
            &file,
            &username,
            &password,
            email_graders,
            report_only,
            output.as_deref(),
        ),
        Some(Commands::Feedback { file, db_path }) => commands::apply_feedback(&file, &db_path),
        Some(Commands::Masterlist { list }) => match list {
            MasterlistCommands::Clubs { db_path, url } => {
                commands::masterlist_clubs(&db_path, url.as_deref())
            }
            MasterlistCommands::Players { db_path, url } => {
                commands::masterlist_players(&db_path, url.as_deref())
            }
        },
        Some(Commands::Lookup { record }) => match record {
            LookupCommands::Player { code } => commands::lookup_player(&code),
            LookupCommands::Club { code } => commands::lookup_club(&code),
        },
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "gradebase", &mut std::io::stdout());
            Ok(())
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}
