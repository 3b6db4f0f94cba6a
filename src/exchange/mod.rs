// src/exchange/mod.rs

//! Cross-database exchange
//!
//! Peer installations trade events and identity decisions as a
//! line-oriented key=value stream: games, export-side merge groups, the
//! receiver's view of the sender's identity graph, and optional
//! identification decisions. This module parses, collates, stores, and
//! re-emits that stream.

pub mod collate;
pub mod export;
pub mod ingest;
pub mod parser;
pub mod report;

pub use collate::{Collation, collate};
pub use export::{export_event, export_players_on_database};
pub use ingest::{IngestStats, store_report};
pub use parser::{parse_import_lines, parse_import_text};
pub use report::{
    AliasesFlag, EventKey, ImportReport, ParseIssue, PlayerKey,
    is_reply_consistent_with_request,
};
