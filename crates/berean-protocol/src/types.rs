//! Core protocol types for Berean's wire format.
//!
//! Everything here is a structure that gets serialized to bytes, sent over
//! the network, and deserialized on the other side. Requests flow client →
//! server ([`ClientRequest`]); events flow server → client
//! ([`ServerEvent`]). Both directions travel wrapped in an [`Envelope`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// The current protocol version. Clients must send it in `Hello` or be
/// rejected.
pub const PROTOCOL_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a participant (player or spectator).
///
/// Newtype over `u64` so a participant id can't be confused with a room or
/// question id. `#[serde(transparent)]` keeps the JSON representation a
/// plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A unique identifier for a room. Internal to the server; clients address
/// rooms by [`RoomCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// A unique identifier for a question within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub u64);

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomCode
// ---------------------------------------------------------------------------

/// Length of a room code.
pub const CODE_LEN: usize = 6;

/// Alphabet room codes are drawn from: A–Z then 0–9, 36 symbols, which at
/// six characters gives ~2.2 × 10⁹ combinations.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// The six-character code players type to join a room.
///
/// Codes are case-insensitive on input and normalised to uppercase, so
/// `"ab12cd"` and `"AB12CD"` name the same room. Construction validates
/// length and alphabet; a `RoomCode` in hand is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Parses and normalises a room code.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() != CODE_LEN
            || !code.bytes().all(|b| CODE_ALPHABET.contains(&b))
        {
            return Err(ProtocolError::InvalidRoomCode(raw.to_string()));
        }
        Ok(Self(code))
    }

    /// Builds a code from bytes already drawn from [`CODE_ALPHABET`].
    ///
    /// Used by the registry's generator; panics only on a generator bug,
    /// which is why it goes through the same validation as `parse`.
    pub fn from_generated(bytes: [u8; CODE_LEN]) -> Self {
        let s = std::str::from_utf8(&bytes)
            .expect("alphabet is ASCII")
            .to_string();
        debug_assert!(bytes.iter().all(|b| CODE_ALPHABET.contains(b)));
        Self(s)
    }

    /// The normalised code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> String {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

/// Whether a participant competes or only watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Answers questions and appears on the leaderboard.
    Player,
    /// Receives the event stream but cannot answer.
    Spectator,
}

/// One roster row, as shown to clients in lobby events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub participant_id: ParticipantId,
    pub name: String,
    pub role: Role,
    pub ready: bool,
    pub connected: bool,
    pub is_host: bool,
}

// ---------------------------------------------------------------------------
// Room options
// ---------------------------------------------------------------------------

/// Client-supplied room configuration, carried by `CreateRoom`.
///
/// These are requests, not guarantees: the server clamps out-of-range
/// values when it builds the room's actual config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomOptions {
    /// Player cap, 2–10.
    pub max_players: usize,
    /// Number of questions drawn per session.
    pub question_count: usize,
    /// Per-question answer window in seconds.
    pub time_limit_secs: u64,
    /// Theme/topic selection passed through to the question bank.
    pub theme_ids: Vec<u32>,
    /// Language selection passed through to the question bank.
    pub language: String,
    /// Whether spectators may join.
    pub spectator_allowed: bool,
    /// Whether starting requires every player to have readied up.
    pub require_ready: bool,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            max_players: 8,
            question_count: 10,
            time_limit_secs: 30,
            theme_ids: Vec::new(),
            language: "en".to_string(),
            spectator_allowed: true,
            require_ready: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Question projection
// ---------------------------------------------------------------------------

/// The client-facing shape of a question.
///
/// Deliberately excludes the correct option index — while a window is
/// open, no message on the wire contains the answer. It is revealed only
/// by [`ServerEvent::QuestionClosed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub prompt: String,
    pub options: Vec<String>,
}

// ---------------------------------------------------------------------------
// Results and leaderboard rows
// ---------------------------------------------------------------------------

/// One participant's outcome for a single question, published on reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantResult {
    pub participant_id: ParticipantId,
    /// The option they chose; `None` for a timeout.
    pub option: Option<usize>,
    pub correct: bool,
    pub points: u32,
    /// Milliseconds from window open to acceptance (the full limit for a
    /// timeout).
    pub elapsed_ms: u64,
    pub timed_out: bool,
}

/// One ranked leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub participant_id: ParticipantId,
    /// 1-based rank. Ranks are positional: ties are fully broken server
    /// side, so two entries never share a rank.
    pub rank: usize,
    pub score: u32,
}

/// The answer log for one closed question, carried by `SessionCompleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionLog {
    pub question: QuestionId,
    pub index: usize,
    pub correct_option: usize,
    pub results: Vec<ParticipantResult>,
}

// ---------------------------------------------------------------------------
// ClientRequest — client → server
// ---------------------------------------------------------------------------

/// Everything a client can ask of the server.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON
/// (`{ "type": "JoinRoom", "code": "AB12CD", ... }`), which is the easiest
/// format to produce and match on from a browser client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientRequest {
    /// First message on every connection. The server rejects version
    /// mismatches before anything else happens.
    Hello { version: u32 },

    /// Create a new room and become its host.
    CreateRoom { options: RoomOptions },

    /// Join an existing room by code.
    JoinRoom {
        code: RoomCode,
        name: String,
        spectator: bool,
    },

    /// Flip the readiness flag (lobby only; ignored once started).
    SetReady { ready: bool },

    /// Host-only: begin the session (or re-run one from the results
    /// screen).
    StartSession,

    /// Answer the currently open question.
    ///
    /// Carries no client timestamp on purpose: the server clock is
    /// authoritative for the speed bonus, so there is nothing useful a
    /// client could tell us about timing.
    SubmitAnswer { question: QuestionId, option: usize },

    /// Leave the current room.
    LeaveRoom,
}

// ---------------------------------------------------------------------------
// ServerEvent — server → client
// ---------------------------------------------------------------------------

/// Everything the server can tell a client: direct replies to requests and
/// the fan-out event stream of a room, in one enum so a client needs a
/// single decode path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Reply to `Hello`.
    Welcome { server_time: u64 },

    /// Reply to `CreateRoom`.
    RoomCreated { code: RoomCode, room_id: RoomId },

    /// Reply to `JoinRoom`: your id plus the current roster.
    RoomJoined {
        participant_id: ParticipantId,
        code: RoomCode,
        roster: Vec<RosterEntry>,
    },

    // -- Lobby --
    /// Someone joined the room.
    ParticipantJoined { entry: RosterEntry },

    /// Someone left the room for good.
    ParticipantLeft { participant_id: ParticipantId },

    /// A participant's readiness flag changed.
    ReadyChanged {
        participant_id: ParticipantId,
        ready: bool,
    },

    /// The host pointer moved (host left or disconnected).
    HostChanged { host: ParticipantId },

    // -- Session --
    /// The session is starting; first question opens after the countdown.
    SessionStarting { countdown_ms: u64 },

    /// A question window opened. `deadline_ms` is how long the window
    /// stays open from the moment this event was emitted.
    QuestionOpened {
        index: usize,
        question: QuestionView,
        deadline_ms: u64,
    },

    /// Receipt for a submission, accepted or not.
    AnswerAck {
        participant_id: ParticipantId,
        accepted: bool,
        reason: Option<String>,
    },

    /// The window closed: the answer is revealed along with everyone's
    /// outcome.
    QuestionClosed {
        index: usize,
        correct_option: usize,
        results: Vec<ParticipantResult>,
    },

    /// Fresh standings. `version` increases strictly; clients drop any
    /// snapshot whose version is not greater than the last one seen.
    Leaderboard {
        version: u64,
        entries: Vec<LeaderboardEntry>,
    },

    /// The last question closed. This payload is the session's single
    /// durable artifact: final standings plus the full answer log.
    SessionCompleted {
        final_leaderboard: Vec<LeaderboardEntry>,
        answer_log: Vec<QuestionLog>,
    },

    /// The room died before completing (host gone with no players left,
    /// everyone disconnected, or an internal invariant breach).
    RoomAborted { reason: String },

    /// A request failed. `code` follows HTTP-ish conventions.
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level wire wrapper, generic over direction: the payload is a
/// [`ClientRequest`] going up and a [`ServerEvent`] coming down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Per-sender sequence number, used to spot missing or out-of-order
    /// messages while debugging.
    pub seq: u64,

    /// Milliseconds since the sender started.
    pub timestamp: u64,

    /// The actual message.
    pub payload: T,
}

// =========================================================================
// Tests
// =========================================================================
