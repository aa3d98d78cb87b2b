//! # Berean
//!
//! An authoritative multiplayer quiz server: rooms of players and
//! spectators run through timed questions, answers are accepted exactly
//! once per player per question, and a versioned leaderboard with
//! deterministic tie-breaks is published after every reveal.
//!
//! The server owns all state; clients are projections fed by the event
//! stream. Supply the question content by implementing
//! [`berean_engine::QuestionBank`] (or use
//! [`berean_engine::FixedBank`] for a static set).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use berean::BereanServer;
//! use berean_engine::FixedBank;
//!
//! # async fn run(questions: Vec<berean_engine::Question>) -> Result<(), berean::BereanError> {
//! let bank = Arc::new(FixedBank::new(questions));
//! let server = BereanServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(bank)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;
mod ws;

pub use error::BereanError;
pub use server::{BereanServer, BereanServerBuilder};
pub use ws::{TransportError, WsConnection, WsListener};
