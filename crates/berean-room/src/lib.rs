//! Room lifecycle management for Berean.
//!
//! Each room runs as an isolated Tokio task (actor model) owning a
//! [`berean_engine::SessionMachine`], its timers, and its participants'
//! event channels. The [`RoomRegistry`] maps six-character codes to
//! actor handles and sweeps idle rooms.
//!
//! # Key types
//!
//! - [`RoomRegistry`] — creates rooms, allocates codes, reclaims the idle
//! - [`RoomHandle`] — send commands to a running room actor
//! - [`JoinOk`] / [`RoomInfo`] — snapshots returned across the channel
//! - [`RoomError`] — what room operations can reject with

mod error;
mod registry;
mod room;

pub use error::RoomError;
pub use registry::RoomRegistry;
pub use room::{EventSender, JoinOk, RoomHandle, RoomInfo};
