//! Error types for the room layer.

use berean_engine::SessionError;
use berean_protocol::RoomId;

/// Errors that can occur during room operations.
///
/// Session-level rejections pass through transparently; the two variants
/// added here are the ones only the room layer can know about.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The code doesn't name a live room. Deliberately covers "never
    /// existed", "expired", and "finished" alike — a caller probing
    /// codes learns nothing from the error shape.
    #[error("room not found")]
    RoomNotFound,

    /// The room's command channel is closed or full.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),

    /// A rejection from the session engine.
    #[error(transparent)]
    Session(#[from] SessionError),
}
