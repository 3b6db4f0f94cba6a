// src/exchange/report.rs

//! Import report - the parsed view of a peer installation's export
//!
//! Player identities travel as six-tuples: (name, event, startdate,
//! enddate, section-or-club, pin). The report holds the games, the set
//! of identities the games reference, the export-side merge groups, the
//! identity graph the peer already holds for this installation, and any
//! identification decisions the sender supplied.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Identity tuple for one alias as seen on the wire
pub type PlayerKey = (
    String,         // name
    String,         // event name
    String,         // startdate
    String,         // enddate
    Option<String>, // section or club
    Option<String>, // pin; None when pinfalse was reported
);

/// Event identity triple
pub type EventKey = (String, String, String);

/// A structural problem found while parsing an import stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    pub description: String,
    pub line: usize,
    pub text: String,
}

/// Three-valued aliases flag carried by remote identity groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AliasesFlag {
    True,
    False,
    None,
}

impl AliasesFlag {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "True" | "true" => Some(AliasesFlag::True),
            "False" | "false" => Some(AliasesFlag::False),
            "None" | "none" => Some(AliasesFlag::None),
            _ => Option::None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AliasesFlag::True => "True",
            AliasesFlag::False => "False",
            AliasesFlag::None => "None",
        }
    }
}

/// Parsed view of one import stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    /// Game attribute dicts in stream order
    pub games: Vec<HashMap<String, String>>,
    /// Identity tuples referenced by any game
    pub gameplayer: BTreeSet<PlayerKey>,
    /// Export-side merge groups: main -> aliases (main included)
    pub localplayer: BTreeMap<PlayerKey, BTreeSet<PlayerKey>>,
    /// alias -> main for every alias in localplayer
    pub gameplayermerge: BTreeMap<PlayerKey, PlayerKey>,
    /// Identity graph the peer sees in the importing database
    pub remoteplayer: BTreeMap<PlayerKey, (AliasesFlag, BTreeSet<PlayerKey>)>,
    /// Identification decisions: new -> known
    pub new_to_known: BTreeMap<PlayerKey, PlayerKey>,
    /// Identification decisions: known -> set of new
    pub known_to_new: BTreeMap<PlayerKey, BTreeSet<PlayerKey>>,
    /// Event triples named by the exported games and local aliases
    pub localevents: BTreeMap<EventKey, BTreeSet<String>>,
    /// Event triples named by the remote identity graph
    pub remoteevents: BTreeMap<EventKey, BTreeSet<String>>,
    /// Non-empty means parsing was abandoned at the first error
    pub errors: Vec<ParseIssue>,
}

impl ImportReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether the report carries identification decisions
    pub fn has_identification(&self) -> bool {
        !self.new_to_known.is_empty() && !self.known_to_new.is_empty()
    }
}

/// Decide whether `reply` is a valid identification reply to `request`.
///
/// The reply must describe exactly the games and identity graph of the
/// request, and must add identification decisions the request did not
/// have. A report is never a valid reply to itself: the request must
/// have no decisions and the reply must have some.
pub fn is_reply_consistent_with_request(reply: &ImportReport, request: &ImportReport) -> bool {
    if reply.games.len() != request.games.len()
        || reply.gameplayer.len() != request.gameplayer.len()
        || reply.localplayer.len() != request.localplayer.len()
        || reply.gameplayermerge.len() != request.gameplayermerge.len()
        || reply.remoteplayer.len() != request.remoteplayer.len()
    {
        return false;
    }
    if reply.gameplayer != request.gameplayer {
        return false;
    }
    if reply.games != request.games {
        return false;
    }
    if reply.gameplayermerge != request.gameplayermerge {
        return false;
    }
    if reply.remoteplayer != request.remoteplayer {
        return false;
    }
    if reply.new_to_known.is_empty() || reply.known_to_new.is_empty() {
        return false;
    }
    if !request.new_to_known.is_empty() || !request.known_to_new.is_empty() {
        return false;
    }
    true
}
