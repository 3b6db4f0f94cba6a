// src/cli.rs
//! CLI definitions for the gradebase results manager
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "gradebase")]
#[command(author = "Gradebase Contributors")]
#[command(version)]
#[command(about = "Chess results manager: identity reconciliation and federation submissions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new results database
    Init {
        /// Path to the database file
        #[arg(short, long, default_value = "gradebase.db")]
        db_path: String,
    },

    /// Rewrite source files into the canonical import stream
    Normalize {
        /// Source files to normalize
        files: Vec<String>,

        /// Source format: league or submission
        #[arg(short, long, default_value = "league")]
        format: String,

        /// Write the canonical stream here instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Import an exported event file, identifying and merging players
    Import {
        /// Path to the import file
        file: String,

        /// Path to the database file
        #[arg(short, long, default_value = "gradebase.db")]
        db_path: String,

        /// Parse and report only; store nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Export one event with its games and merge groups
    ExportEvent {
        /// Event rowid to export
        event_id: i64,

        /// Path to the database file
        #[arg(short, long, default_value = "gradebase.db")]
        db_path: String,

        /// Write the export here instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Export the whole identity graph for a peer installation
    ExportPlayers {
        /// Path to the database file
        #[arg(short, long, default_value = "gradebase.db")]
        db_path: String,

        /// Write the export here instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Build a federation submission file for one or more events
    Submission {
        /// Event rowids to submit together
        event_ids: Vec<i64>,

        /// Path to the database file
        #[arg(short, long, default_value = "gradebase.db")]
        db_path: String,

        /// Directory to write the submission file into
        #[arg(short, long, default_value = ".")]
        output_dir: String,
    },

    /// Upload a submission file to the federation
    Submit {
        /// Path to the submission file
        file: String,

        /// Federation account name
        #[arg(short, long)]
        username: String,

        /// Federation account password
        #[arg(short, long)]
        password: String,

        /// Ask the federation to mail the graders
        #[arg(long)]
        email_graders: bool,

        /// Validate on the server without committing
        #[arg(long)]
        report_only: bool,

        /// Save the feedback reply here for later application
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Apply a saved feedback reply to the database
    Feedback {
        /// Path to the saved reply
        file: String,

        /// Path to the database file
        #[arg(short, long, default_value = "gradebase.db")]
        db_path: String,
    },

    /// Refresh federation master lists
    Masterlist {
        #[command(subcommand)]
        list: MasterlistCommands,
    },

    /// Look up one record on the federation rating site
    Lookup {
        #[command(subcommand)]
        record: LookupCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum MasterlistCommands {
    /// Download and apply the active-clubs list
    Clubs {
        /// Path to the database file
        #[arg(short, long, default_value = "gradebase.db")]
        db_path: String,

        /// Override the download URL
        #[arg(long)]
        url: Option<String>,
    },

    /// Download and apply the players-ratings list
    Players {
        /// Path to the database file
        #[arg(short, long, default_value = "gradebase.db")]
        db_path: String,

        /// Override the download URL
        #[arg(long)]
        url: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum LookupCommands {
    /// Look up a player by grading code
    Player {
        /// Seven-character grading code
        code: String,
    },

    /// Look up a club by club code
    Club {
        /// Federation club code
        code: String,
    },
}
