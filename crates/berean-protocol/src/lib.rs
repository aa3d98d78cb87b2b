//! Wire protocol for Berean.
//!
//! This crate defines the "language" that quiz clients and the server
//! speak:
//!
//! - **Types** ([`Envelope`], [`ClientRequest`], [`ServerEvent`], the id
//!   newtypes) — the message structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong during
//!   encoding/decoding.
//!
//! The protocol layer sits between the transport (raw bytes) and the room
//! layer (authoritative session state). It doesn't know about connections
//! or rooms — it only knows how to describe and serialize messages.
//!
//! One deliberate asymmetry: [`QuestionView`] is the only shape of a
//! question that ever crosses the wire while a question is open, and it
//! carries no correct-answer index. The answer is revealed exclusively by
//! `ServerEvent::QuestionClosed`.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientRequest, Envelope, LeaderboardEntry, ParticipantId,
    ParticipantResult, QuestionId, QuestionLog, QuestionView, Role,
    RoomCode, RoomId, RoomOptions, RosterEntry, ServerEvent,
    CODE_ALPHABET, CODE_LEN, PROTOCOL_VERSION,
};
