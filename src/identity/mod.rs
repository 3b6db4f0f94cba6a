// src/identity/mod.rs

//! Identity-graph maintenance

pub mod update;

pub use update::{
    identify_players, is_new_player_inconsistent, is_player_identification_inconsistent,
    merge_players,
};
