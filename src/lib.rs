// src/lib.rs

//! gradebase - chess results manager
//!
//! Keeps a per-installation record store of events, games, and player
//! aliases; resolves aliases into persons through an identity graph;
//! exchanges events and identification decisions with peer
//! installations; and builds results submissions for the national
//! federation, applying the federation's feedback when it arrives.

pub mod config;
pub mod db;
pub mod ecf;
pub mod error;
pub mod exchange;
pub mod identity;
pub mod normalize;
pub mod task;

pub use error::{Error, Result};
