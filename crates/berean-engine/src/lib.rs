//! Authoritative quiz session logic for Berean.
//!
//! Everything in this crate is pure, synchronous, single-room state:
//!
//! - [`ParticipantRoster`] — who is in the room, join order, host pointer
//! - [`QuestionBank`] — the external content collaborator ([`FixedBank`]
//!   for demos and tests)
//! - [`AnswerCollector`] — one open question window, one accepted answer
//!   per participant
//! - [`ScoringPolicy`] / [`ScoreBoard`] — points, applied exactly once
//! - [`leaderboard::rank`] — deterministic total-order standings
//! - [`SessionMachine`] — the phase machine tying it all together,
//!   returning [`Effect`]s for the room actor to execute
//!
//! The room actor in `berean-room` owns a machine, serialises every
//! operation through its command channel, and executes the returned
//! effects. That split keeps the tricky parts — transition guards,
//! duplicate-trigger no-ops, tie-breaks — testable without a runtime.

#![allow(async_fn_in_trait)]

mod collector;
mod config;
mod error;
pub mod leaderboard;
mod machine;
mod question;
mod roster;
mod scoring;

pub use collector::{Answer, AnswerCollector, AnswerStatus};
pub use config::RoomConfig;
pub use error::{BankError, SessionError};
pub use machine::{Effect, Phase, SessionMachine};
pub use question::{FixedBank, Question, QuestionBank, QuizSelection};
pub use roster::{Participant, ParticipantRoster};
pub use scoring::{QuestionOutcome, ScoreBoard, ScoreEntry, ScoringPolicy};
