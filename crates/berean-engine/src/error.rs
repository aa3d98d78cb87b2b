//! Error types for the session engine.
//!
//! Every variant here is a *client* error or a room-local fatal: it is
//! returned synchronously to the caller that triggered it and never
//! crosses a room boundary. Coordination races (a timer firing against an
//! early advance, a reclaim racing a join) are not errors at all — they
//! resolve to silent no-ops inside the room's command loop.

use berean_protocol::{ParticipantId, QuestionId};

/// Errors from session operations: joining, starting, answering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The room reached a terminal phase. Deliberately mapped to
    /// "room not found" at the boundary so probing codes can't
    /// distinguish a finished room from one that never existed.
    #[error("room is closed")]
    RoomClosed,

    /// A join arrived after the session left the lobby.
    #[error("session already active")]
    SessionAlreadyActive,

    /// No player slot left (or the spectator cap is reached).
    #[error("room is full")]
    RoomFull,

    /// A spectator join against a room created without spectators.
    #[error("spectators are not allowed in this room")]
    SpectatorsNotAllowed,

    /// The participant is not on the roster — or is a spectator trying
    /// to do something only players may do.
    #[error("unknown participant {0}")]
    UnknownParticipant(ParticipantId),

    /// Only the current host may start a session.
    #[error("participant {0} is not the host")]
    NotHost(ParticipantId),

    /// Readiness is required and at least one connected player isn't.
    #[error("not all players are ready")]
    NotAllReady,

    /// Starting requires at least one connected player; spectators
    /// don't count.
    #[error("no connected players")]
    NoPlayers,

    /// The bank produced an empty draw.
    #[error("no questions drawn for this session")]
    NoQuestions,

    /// A submission outside an open window for that question.
    #[error("answers are not being accepted")]
    NotAcceptingAnswers,

    /// A second submission for the same (participant, question) pair.
    /// The first accepted answer wins; answers cannot be changed.
    #[error("participant {0} already answered this question")]
    DuplicateSubmission(ParticipantId),

    /// The chosen option index doesn't exist on the open question.
    #[error("option {option} out of range ({count} options)")]
    OptionOutOfRange { option: usize, count: usize },

    /// Fatal: the one-accepted-answer-per-pair invariant broke on the
    /// score board. The room aborts; the process does not.
    #[error("score board invariant violated for {participant} on {question}")]
    ScoreInvariant {
        participant: ParticipantId,
        question: QuestionId,
    },

    /// The question bank failed to supply a draw.
    #[error(transparent)]
    Bank(#[from] BankError),
}

/// Errors from the external question bank collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BankError {
    /// The bank has nothing matching the requested selection.
    #[error("no questions available for the requested selection")]
    Empty,

    /// The bank itself failed (storage, upstream service, ...).
    #[error("question bank unavailable: {0}")]
    Unavailable(String),
}
