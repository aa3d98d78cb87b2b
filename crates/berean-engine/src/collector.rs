//! The answer collector: one open question window at a time.
//!
//! A collector is created when a question opens and closed exactly once,
//! by whichever trigger wins — the deadline or the last connected player
//! answering. It enforces the central invariant: at most one *accepted*
//! answer per (participant, question), with rejections returned to the
//! caller and never stored.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use berean_protocol::{ParticipantId, QuestionId};
use serde::{Deserialize, Serialize};

use crate::SessionError;

/// How an accepted answer record came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerStatus {
    /// Submitted inside the window.
    OnTime,
    /// Backfilled at window close for a player who never submitted.
    Timeout,
}

/// One accepted (or backfilled) answer record.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub participant: ParticipantId,
    pub question: QuestionId,
    /// Chosen option; `None` for a timeout record.
    pub option: Option<usize>,
    /// Server-side time from window open to acceptance, clamped to
    /// `[0, time_limit]`. For timeouts this is the full limit.
    pub elapsed: Duration,
    pub status: AnswerStatus,
    /// Set once the scoring engine has consumed this record; guards
    /// exactly-once scoring.
    pub scored: bool,
}

impl Answer {
    pub fn timed_out(&self) -> bool {
        matches!(self.status, AnswerStatus::Timeout)
    }
}

/// Collects answers for a single open question window.
#[derive(Debug)]
pub struct AnswerCollector {
    question: QuestionId,
    index: usize,
    opened_at: Instant,
    time_limit: Duration,
    open: bool,
    answers: HashMap<ParticipantId, Answer>,
}

impl AnswerCollector {
    /// Opens a window for `question` at `opened_at`.
    pub fn open(
        question: QuestionId,
        index: usize,
        time_limit: Duration,
        opened_at: Instant,
    ) -> Self {
        Self {
            question,
            index,
            opened_at,
            time_limit,
            open: true,
            answers: HashMap::new(),
        }
    }

    pub fn question(&self) -> QuestionId {
        self.question
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    /// When the window closes if nobody forces an early close.
    pub fn deadline(&self) -> Instant {
        self.opened_at + self.time_limit
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Accepts a submission, or says exactly why not.
    ///
    /// `now` is the server receive time and is the *only* clock consulted
    /// — client timestamps never reach this path, so clock skew can't
    /// inflate a speed bonus. Elapsed time is clamped into the window:
    /// a submission racing the deadline inside the command queue still
    /// records at most `time_limit`.
    pub fn submit(
        &mut self,
        participant: ParticipantId,
        question: QuestionId,
        option: usize,
        now: Instant,
    ) -> Result<&Answer, SessionError> {
        if !self.open || question != self.question {
            return Err(SessionError::NotAcceptingAnswers);
        }
        if self.answers.contains_key(&participant) {
            return Err(SessionError::DuplicateSubmission(participant));
        }

        let elapsed = now
            .saturating_duration_since(self.opened_at)
            .min(self.time_limit);

        let answer = Answer {
            participant,
            question,
            option: Some(option),
            elapsed,
            status: AnswerStatus::OnTime,
            scored: false,
        };
        tracing::debug!(
            %participant,
            question = %self.question,
            option,
            elapsed_ms = elapsed.as_millis() as u64,
            "answer accepted"
        );
        Ok(self.answers.entry(participant).or_insert(answer))
    }

    /// Whether every id in `players` has an accepted answer. Vacuously
    /// true for an empty set — callers guard against closing a window
    /// just because nobody is left to answer.
    pub fn all_answered<I>(&self, players: I) -> bool
    where
        I: IntoIterator<Item = ParticipantId>,
    {
        players.into_iter().all(|p| self.answers.contains_key(&p))
    }

    /// How many accepted answers the window holds.
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    /// Closes the window and backfills a `Timeout` record for every
    /// player in `players` without an accepted answer, so each closed
    /// question holds exactly one record per roster player.
    ///
    /// Returns `false` if the window was already closed (the duplicate
    /// trigger case) — the call is then a complete no-op.
    pub fn close(&mut self, players: &[ParticipantId]) -> bool {
        if !self.open {
            return false;
        }
        self.open = false;

        for &p in players {
            self.answers.entry(p).or_insert(Answer {
                participant: p,
                question: self.question,
                option: None,
                elapsed: self.time_limit,
                status: AnswerStatus::Timeout,
                scored: false,
            });
        }
        tracing::debug!(
            question = %self.question,
            answers = self.answers.len(),
            "question window closed"
        );
        true
    }

    pub fn get(&self, participant: ParticipantId) -> Option<&Answer> {
        self.answers.get(&participant)
    }

    pub fn get_mut(&mut self, participant: ParticipantId) -> Option<&mut Answer> {
        self.answers.get_mut(&participant)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: u64) -> ParticipantId {
        ParticipantId(id)
    }

    const LIMIT: Duration = Duration::from_secs(30);

    fn open_collector(at: Instant) -> AnswerCollector {
        AnswerCollector::open(QuestionId(1), 0, LIMIT, at)
    }

    #[test]
    fn test_submit_records_elapsed_from_open() {
        let t0 = Instant::now();
        let mut c = open_collector(t0);

        let a = c
            .submit(pid(1), QuestionId(1), 2, t0 + Duration::from_secs(5))
            .unwrap();

        assert_eq!(a.option, Some(2));
        assert_eq!(a.elapsed, Duration::from_secs(5));
        assert_eq!(a.status, AnswerStatus::OnTime);
        assert!(!a.scored);
    }

    #[test]
    fn test_submit_duplicate_rejected_first_wins() {
        let t0 = Instant::now();
        let mut c = open_collector(t0);

        c.submit(pid(1), QuestionId(1), 0, t0 + Duration::from_secs(1))
            .unwrap();
        let second =
            c.submit(pid(1), QuestionId(1), 3, t0 + Duration::from_secs(2));

        assert_eq!(second, Err(SessionError::DuplicateSubmission(pid(1))));
        // The stored answer is still the first one — not overwritten.
        assert_eq!(c.get(pid(1)).unwrap().option, Some(0));
    }

    #[test]
    fn test_submit_wrong_question_rejected() {
        let t0 = Instant::now();
        let mut c = open_collector(t0);

        let result = c.submit(pid(1), QuestionId(9), 0, t0);
        assert_eq!(result, Err(SessionError::NotAcceptingAnswers));
    }

    #[test]
    fn test_submit_after_close_rejected() {
        let t0 = Instant::now();
        let mut c = open_collector(t0);
        c.close(&[]);

        let result = c.submit(pid(1), QuestionId(1), 0, t0);
        assert_eq!(result, Err(SessionError::NotAcceptingAnswers));
    }

    #[test]
    fn test_submit_elapsed_clamped_to_limit() {
        let t0 = Instant::now();
        let mut c = open_collector(t0);

        // A submission that raced the close inside the command queue:
        // received after the nominal deadline but before close ran.
        let a = c
            .submit(pid(1), QuestionId(1), 1, t0 + Duration::from_secs(45))
            .unwrap();
        assert_eq!(a.elapsed, LIMIT);
    }

    #[test]
    fn test_submit_before_open_clamps_to_zero() {
        let t0 = Instant::now() + Duration::from_secs(10);
        let mut c = open_collector(t0);

        // `now` earlier than opened_at can't produce negative elapsed.
        let a = c.submit(pid(1), QuestionId(1), 1, Instant::now()).unwrap();
        assert_eq!(a.elapsed, Duration::ZERO);
    }

    #[test]
    fn test_all_answered_tracks_given_players() {
        let t0 = Instant::now();
        let mut c = open_collector(t0);

        assert!(!c.all_answered([pid(1), pid(2)]));

        c.submit(pid(1), QuestionId(1), 0, t0).unwrap();
        assert!(!c.all_answered([pid(1), pid(2)]));
        assert!(c.all_answered([pid(1)]));

        c.submit(pid(2), QuestionId(1), 1, t0).unwrap();
        assert!(c.all_answered([pid(1), pid(2)]));
    }

    #[test]
    fn test_close_backfills_timeouts_for_silent_players() {
        let t0 = Instant::now();
        let mut c = open_collector(t0);
        c.submit(pid(1), QuestionId(1), 0, t0 + Duration::from_secs(3))
            .unwrap();

        assert!(c.close(&[pid(1), pid(2)]));

        let p2 = c.get(pid(2)).unwrap();
        assert_eq!(p2.status, AnswerStatus::Timeout);
        assert_eq!(p2.option, None);
        assert_eq!(p2.elapsed, LIMIT);

        // The on-time record is untouched by backfill.
        assert_eq!(c.get(pid(1)).unwrap().status, AnswerStatus::OnTime);
        assert_eq!(c.answered_count(), 2);
    }

    #[test]
    fn test_close_twice_is_noop() {
        let t0 = Instant::now();
        let mut c = open_collector(t0);

        assert!(c.close(&[pid(1)]));
        assert!(!c.close(&[pid(1), pid(2)]), "second close must be a no-op");
        // No backfill happened for pid(2) on the second call.
        assert!(c.get(pid(2)).is_none());
    }

    #[test]
    fn test_exactly_one_record_per_player_after_close() {
        let t0 = Instant::now();
        let mut c = open_collector(t0);
        let players = [pid(1), pid(2), pid(3)];

        c.submit(pid(2), QuestionId(1), 1, t0).unwrap();
        c.close(&players);

        for p in players {
            assert!(c.get(p).is_some(), "{p} must have exactly one record");
        }
        assert_eq!(c.answered_count(), players.len());
    }
}
