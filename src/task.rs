// src/task.rs

//! Background-task plumbing
//!
//! Long operations (master-list load, import, export, feedback apply)
//! run on one worker at a time with the record store to themselves.
//! The task holds a cancel token it polls between records and an
//! append-only log sink for progress text. On cancellation or store
//! corruption the open transaction rolls back; the store returns to
//! its pre-task state.

use crate::db;
use crate::error::{Error, Result};
use rusqlite::{Connection, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Shared cancellation flag polled between records
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Error out of a task body when cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Append-only progress log
pub trait LogSink: Send {
    fn log(&self, message: &str);
}

/// Log sink that keeps messages in memory; used by tests and by
/// displays that render the log after the task completes.
#[derive(Debug, Default)]
pub struct MemoryLog {
    messages: Mutex<Vec<String>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl LogSink for MemoryLog {
    fn log(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}

/// Log sink that forwards to tracing; the default for CLI runs
#[derive(Debug, Default)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn log(&self, message: &str) {
        info!("{message}");
    }
}

/// Run a task body inside one store transaction.
///
/// Returns Ok(Some(value)) when the body completed and committed,
/// Ok(None) when it was cancelled (the transaction was rolled back),
/// and Err for everything else, also rolled back.
pub fn run_task<T, F>(
    conn: &mut Connection,
    log: &dyn LogSink,
    token: &CancelToken,
    name: &str,
    body: F,
) -> Result<Option<T>>
where
    F: FnOnce(&Transaction, &CancelToken, &dyn LogSink) -> Result<T>,
{
    log.log(&format!("{name}: started"));
    match db::transaction(conn, |tx| body(tx, token, log)) {
        Ok(value) => {
            log.log(&format!("{name}: done"));
            Ok(Some(value))
        }
        Err(Error::Cancelled) => {
            log.log(&format!("{name}: cancelled, changes rolled back"));
            Ok(None)
        }
        Err(Error::StoreCorrupt(detail)) => {
            warn!("{name}: store corruption: {detail}");
            log.log(&format!("{name}: store corruption, changes rolled back"));
            Err(Error::StoreCorrupt(detail))
        }
        Err(e) => {
            log.log(&format!("{name}: failed, changes rolled back"));
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Name;

    #[test]
    fn test_cancel_rolls_back() {
        let mut conn = db::open_in_memory().unwrap();
        let log = MemoryLog::new();
        let token = CancelToken::new();
        token.cancel();

        let outcome = run_task(&mut conn, &log, &token, "test", |tx, token, _| {
            Name::intern(tx, "Should Not Survive")?;
            token.check()?;
            Ok(())
        })
        .unwrap();
        assert!(outcome.is_none());
        assert!(Name::find_by_text(&conn, "Should Not Survive")
            .unwrap()
            .is_none());
        assert!(log
            .messages()
            .iter()
            .any(|m| m.contains("cancelled")));
    }

    #[test]
    fn test_commit_on_success() {
        let mut conn = db::open_in_memory().unwrap();
        let log = MemoryLog::new();
        let token = CancelToken::new();
        let outcome = run_task(&mut conn, &log, &token, "test", |tx, _, _| {
            Name::intern(tx, "Survives")
        })
        .unwrap();
        assert!(outcome.is_some());
        assert!(Name::find_by_text(&conn, "Survives").unwrap().is_some());
    }
}
