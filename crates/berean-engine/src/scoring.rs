//! Scoring: turning accepted answers into points, exactly once.
//!
//! The policy is a pure function of (answer, question, window); the board
//! is the only mutable scoring state and is touched solely from inside a
//! room's command loop. Readers always get copies, never references into
//! the live board.

use std::collections::HashMap;
use std::time::Duration;

use berean_protocol::{ParticipantId, QuestionId};
use serde::{Deserialize, Serialize};

use crate::{Answer, Question, SessionError};

// ---------------------------------------------------------------------------
// ScoringPolicy
// ---------------------------------------------------------------------------

/// How correct answers convert to points.
///
/// A correct, on-time answer earns
/// `base_points + round(max_speed_bonus * (1 - elapsed / time_limit))`;
/// anything else earns zero. An answer at the last moment still earns the
/// full base — speed is a bonus, not a penalty. `max_speed_bonus = 0`
/// degrades cleanly to flat per-correct-answer scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    pub base_points: u32,
    pub max_speed_bonus: u32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            base_points: 1,
            max_speed_bonus: 10,
        }
    }
}

impl ScoringPolicy {
    /// Points for one answer record. Deterministic: same inputs, same
    /// points, every time.
    pub fn score(
        &self,
        answer: &Answer,
        question: &Question,
        time_limit: Duration,
    ) -> u32 {
        let Some(option) = answer.option else {
            return 0; // timeout
        };
        if answer.timed_out() || !question.is_correct(option) {
            return 0;
        }

        let bonus = if time_limit.is_zero() {
            0
        } else {
            let remaining_frac =
                1.0 - answer.elapsed.as_secs_f64() / time_limit.as_secs_f64();
            (self.max_speed_bonus as f64 * remaining_frac.max(0.0)).round()
                as u32
        };
        self.base_points + bonus
    }
}

// ---------------------------------------------------------------------------
// ScoreBoard
// ---------------------------------------------------------------------------

/// One participant's outcome for one question, as kept in their history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionOutcome {
    pub question: QuestionId,
    pub index: usize,
    pub option: Option<usize>,
    pub correct: bool,
    pub points: u32,
    pub elapsed: Duration,
    pub timed_out: bool,
}

/// A participant's running score state.
#[derive(Debug, Clone)]
pub struct ScoreEntry {
    pub participant: ParticipantId,
    pub total: u32,
    /// One outcome per closed question, in question order.
    pub history: Vec<QuestionOutcome>,
    /// Cumulative latency over answered (non-timeout) questions.
    /// Used only as a ranking tie-break.
    pub answered_latency: Duration,
}

impl ScoreEntry {
    fn new(participant: ParticipantId) -> Self {
        Self {
            participant,
            total: 0,
            history: Vec::new(),
            answered_latency: Duration::ZERO,
        }
    }
}

/// The authoritative score state of one session.
///
/// The version counter outlives individual sessions in a room: a "play
/// again" resets the entries but keeps counting versions up, so a client
/// can order every snapshot it ever receives from one room.
#[derive(Debug, Default)]
pub struct ScoreBoard {
    entries: HashMap<ParticipantId, ScoreEntry>,
    version: u64,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure a participant has an entry (all players get one when a
    /// session starts, so zero-score players still rank).
    pub fn ensure_entry(&mut self, participant: ParticipantId) {
        self.entries
            .entry(participant)
            .or_insert_with(|| ScoreEntry::new(participant));
    }

    /// Clears scores for a fresh session while keeping the version
    /// counter monotone.
    pub fn reset_for_new_session(&mut self) {
        self.entries.clear();
    }

    /// Scores one answer record into the board.
    ///
    /// Exactly-once: a record already marked `scored` is a silent no-op
    /// (`Ok(None)`). A *different* record for a question the participant
    /// already has history for is the invariant breach that aborts the
    /// room — it cannot happen through the collector, so reaching it
    /// means corrupted state, not a user mistake.
    pub fn apply(
        &mut self,
        answer: &mut Answer,
        question: &Question,
        index: usize,
        time_limit: Duration,
        policy: &ScoringPolicy,
    ) -> Result<Option<u32>, SessionError> {
        if answer.scored {
            return Ok(None);
        }

        let entry = self
            .entries
            .entry(answer.participant)
            .or_insert_with(|| ScoreEntry::new(answer.participant));

        if entry.history.iter().any(|o| o.question == question.id) {
            return Err(SessionError::ScoreInvariant {
                participant: answer.participant,
                question: question.id,
            });
        }

        let points = policy.score(answer, question, time_limit);
        let correct = answer
            .option
            .is_some_and(|o| !answer.timed_out() && question.is_correct(o));

        entry.total += points;
        if !answer.timed_out() {
            entry.answered_latency += answer.elapsed;
        }
        entry.history.push(QuestionOutcome {
            question: question.id,
            index,
            option: answer.option,
            correct,
            points,
            elapsed: answer.elapsed,
            timed_out: answer.timed_out(),
        });

        answer.scored = true;
        Ok(Some(points))
    }

    pub fn get(&self, participant: ParticipantId) -> Option<&ScoreEntry> {
        self.entries.get(&participant)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ScoreEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The version of the last published snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Bumps and returns the version for a new snapshot. The only way
    /// the counter moves, so published versions are strictly increasing.
    pub fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

// =========================================================================
// Tests
// =========================================================================
