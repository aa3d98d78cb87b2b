//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding, or validating wire
/// messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, wrong
    /// types, or a truncated message.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A string that doesn't parse as a room code (wrong length or
    /// characters outside A–Z, 0–9).
    #[error("invalid room code: {0:?}")]
    InvalidRoomCode(String),

    /// The message decoded fine but violates protocol rules — e.g. a
    /// request sent before `Hello`, or an unsupported version.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
