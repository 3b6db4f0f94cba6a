// src/db/models/mod.rs

//! Entity models for the gradebase database
//!
//! Thin data containers with insert/find/update methods taking a
//! Connection. Business logic lives in the identity, exchange, and ecf
//! modules.

mod alias;
mod club_map;
mod code_map;
mod ecf_club;
mod ecf_date;
mod ecf_player;
mod event;
mod game;
mod name;

pub use alias::{Alias, Identity};
pub use club_map::ClubMap;
pub use code_map::CodeMap;
pub use ecf_club::EcfClub;
pub use ecf_date::{EcfDate, EcfObjType};
pub use ecf_player::EcfPlayer;
pub use event::{Event, EventDetails};
pub use game::{Game, GameClass, GameResult};
pub use name::Name;
