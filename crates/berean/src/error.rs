//! Unified error type for the Berean server crate.

use berean_protocol::ProtocolError;
use berean_room::RoomError;

use crate::ws::TransportError;

/// Top-level error wrapping the layer-specific ones, so server code and
/// its callers deal with a single type.
#[derive(Debug, thiserror::Error)]
pub enum BereanError {
    /// A transport-level error (bind, accept, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (not found, unavailable, session rejection).
    #[error(transparent)]
    Room(#[from] RoomError),
}
