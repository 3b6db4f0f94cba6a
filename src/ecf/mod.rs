// src/ecf/mod.rs

//! Federation-facing subsystem
//!
//! Grading-code arithmetic, the rating-site HTTP client, master-list
//! maintenance, the results-submission builder, and the feedback-reply
//! applier.

pub mod client;
pub mod code;
pub mod feedback;
pub mod masterlist;
pub mod submission;

pub use client::{EcfClient, SubmitOptions};
pub use code::{check_letter, is_valid_code, looks_like_code};
pub use feedback::{apply_feedback, parse_feedback, FeedbackReport};
pub use masterlist::{apply_clubs, apply_players, LoadStats};
pub use submission::{build_submission, write_submission, SubmissionFile};
