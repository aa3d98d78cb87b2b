//! The session state machine: one room's authoritative lifecycle.
//!
//! The machine is deliberately pure and synchronous. Every operation takes
//! the current instant and returns a list of [`Effect`]s — events to fan
//! out and timers to arm or cancel — which the room actor executes. All
//! concurrency lives in the actor; everything here is plain sequential
//! logic, which is what makes the transition guards testable without a
//! runtime.
//!
//! # Phases
//!
//! ```text
//! Lobby → Starting → QuestionOpen ⇄ QuestionReveal → Completed → Archived
//!                         (one round-trip per question)
//! ```
//!
//! `Aborted` is reachable from every non-terminal phase. `QuestionOpen →
//! QuestionReveal` fires on whichever comes first: the deadline elapsing
//! or every connected player holding an accepted answer. Both triggers
//! funnel through the same single-threaded command loop, and each carries
//! a phase (and, for timers, a generation) check, so the losing trigger
//! degrades to a no-op instead of a double advance.

use std::time::Instant;

use berean_protocol::{
    ParticipantId, ParticipantResult, QuestionId, QuestionLog, Role,
    ServerEvent,
};
use tracing::{debug, error, info, trace};

use crate::{
    leaderboard, AnswerCollector, ParticipantRoster, Question, RoomConfig,
    ScoreBoard, SessionError,
};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Lifecycle phase of a room and its (possibly not yet started) session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Participants joining and readying up.
    Lobby,
    /// Host pressed start; brief countdown, no new joins.
    Starting,
    /// Exactly one question window is open.
    QuestionOpen,
    /// Answers locked, scores visible, next question pending.
    QuestionReveal,
    /// Final leaderboard frozen; readable until archived.
    Completed,
    /// Terminal, read-only; the actor tears down.
    Archived,
    /// Terminal: host gone with nobody left, everyone disconnected, or
    /// an internal invariant breach.
    Aborted,
}

impl Phase {
    /// Whether a session is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::QuestionOpen | Self::QuestionReveal)
    }

    /// Whether the room is gone for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Archived | Self::Aborted)
    }

    /// Whether new participants may join.
    pub fn accepts_joins(&self) -> bool {
        matches!(self, Self::Lobby)
    }

    /// Whether outsiders should be told the room doesn't exist at all.
    /// Completed rooms hide too: a code must not reveal whether it once
    /// named a real room.
    pub fn hidden_from_join(&self) -> bool {
        matches!(self, Self::Completed | Self::Archived | Self::Aborted)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Lobby => "Lobby",
            Self::Starting => "Starting",
            Self::QuestionOpen => "QuestionOpen",
            Self::QuestionReveal => "QuestionReveal",
            Self::Completed => "Completed",
            Self::Archived => "Archived",
            Self::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Effect
// ---------------------------------------------------------------------------

/// What the room actor should do after an operation.
///
/// Ordering within the returned `Vec` is meaningful — events are fanned
/// out in order, so `QuestionClosed` always precedes the leaderboard that
/// reflects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Deliver to every connected participant.
    Broadcast(ServerEvent),
    /// Deliver to one participant.
    Send(ParticipantId, ServerEvent),
    /// Arm the phase timer (replacing any pending deadline). The
    /// generation comes back with the fire so stale fires are
    /// detectable.
    ArmPhaseTimer { deadline: Instant, generation: u64 },
    /// Cancel the phase timer.
    CancelPhaseTimer,
    /// Arm the abandoned-room grace timer.
    ArmAbandonTimer { deadline: Instant },
    /// Cancel the abandoned-room grace timer.
    CancelAbandonTimer,
}

// ---------------------------------------------------------------------------
// SessionMachine
// ---------------------------------------------------------------------------

/// Authoritative state of one room: roster, phase, questions, scores.
#[derive(Debug)]
pub struct SessionMachine {
    config: RoomConfig,
    roster: ParticipantRoster,
    phase: Phase,
    questions: Vec<Question>,
    current: usize,
    collector: Option<AnswerCollector>,
    board: ScoreBoard,
    answer_log: Vec<QuestionLog>,
    /// Bumped on every phase-timer arm; a fire with an older generation
    /// is stale and ignored.
    timer_gen: u64,
    last_transition: Instant,
}

impl SessionMachine {
    pub fn new(config: RoomConfig, now: Instant) -> Self {
        Self {
            config,
            roster: ParticipantRoster::new(),
            phase: Phase::Lobby,
            questions: Vec::new(),
            current: 0,
            collector: None,
            board: ScoreBoard::new(),
            answer_log: Vec::new(),
            timer_gen: 0,
            last_transition: now,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn roster(&self) -> &ParticipantRoster {
        &self.roster
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn board(&self) -> &ScoreBoard {
        &self.board
    }

    /// Instant of the last activity, for idle reclamation.
    pub fn last_activity(&self) -> Instant {
        self.last_transition
    }

    fn touch(&mut self, now: Instant) {
        self.last_transition = now;
    }

    fn arm_phase_timer(&mut self, deadline: Instant) -> Effect {
        self.timer_gen += 1;
        Effect::ArmPhaseTimer {
            deadline,
            generation: self.timer_gen,
        }
    }

    // -- Joining / leaving --------------------------------------------------

    /// Adds a participant, returning their id and the effects to run.
    pub fn join(
        &mut self,
        name: &str,
        role: Role,
        now: Instant,
    ) -> Result<(ParticipantId, Vec<Effect>), SessionError> {
        if self.phase.hidden_from_join() {
            return Err(SessionError::RoomClosed);
        }
        if !self.phase.accepts_joins() {
            return Err(SessionError::SessionAlreadyActive);
        }
        match role {
            Role::Spectator => {
                if !self.config.spectator_allowed {
                    return Err(SessionError::SpectatorsNotAllowed);
                }
                if self.config.max_spectators > 0
                    && self.roster.spectator_count() >= self.config.max_spectators
                {
                    return Err(SessionError::RoomFull);
                }
            }
            Role::Player => {
                if self.roster.player_count() >= self.config.max_players {
                    return Err(SessionError::RoomFull);
                }
            }
        }

        let prev_host = self.roster.host();
        let id = self.roster.join(name, role).id;
        self.touch(now);

        let mut effects = Vec::new();
        let entry = self
            .roster
            .entries()
            .into_iter()
            .find(|e| e.participant_id == id)
            .expect("just joined");
        effects.push(Effect::Broadcast(ServerEvent::ParticipantJoined { entry }));
        if let Some(host) = self.roster.host() {
            if prev_host != Some(host) {
                effects.push(Effect::Broadcast(ServerEvent::HostChanged { host }));
            }
        }
        Ok((id, effects))
    }

    /// Removes a participant for good (explicit leave).
    pub fn leave(
        &mut self,
        id: ParticipantId,
        now: Instant,
    ) -> Result<Vec<Effect>, SessionError> {
        let prev_host = self.roster.host();
        let removed = self
            .roster
            .remove(id)
            .ok_or(SessionError::UnknownParticipant(id))?;
        self.touch(now);

        let mut effects = vec![Effect::Broadcast(ServerEvent::ParticipantLeft {
            participant_id: id,
        })];
        if let Some(host) = self.roster.host() {
            if prev_host != Some(host) {
                effects.push(Effect::Broadcast(ServerEvent::HostChanged { host }));
            }
        }

        if removed.is_player() && self.phase.is_active() {
            if self.roster.connected_player_count() == 0 {
                // Deliberate exits don't get a grace period.
                effects.extend(self.abort("all players left", now));
                return Ok(effects);
            }
            effects.extend(self.try_early_close(now));
        }
        Ok(effects)
    }

    // -- Readiness ----------------------------------------------------------

    /// Flips a readiness flag. Ignored (not an error) once the session
    /// has left the lobby.
    pub fn set_ready(
        &mut self,
        id: ParticipantId,
        ready: bool,
        now: Instant,
    ) -> Result<Vec<Effect>, SessionError> {
        if self.phase != Phase::Lobby {
            return Ok(Vec::new());
        }
        self.roster
            .set_ready(id, ready)
            .ok_or(SessionError::UnknownParticipant(id))?;
        self.touch(now);
        Ok(vec![Effect::Broadcast(ServerEvent::ReadyChanged {
            participant_id: id,
            ready,
        })])
    }

    // -- Starting -----------------------------------------------------------

    /// Checks every start guard without mutating anything. The room
    /// actor runs this before the (async) bank draw so a non-host can't
    /// trigger bank work; [`Self::start`] re-checks afterwards.
    pub fn validate_start(
        &self,
        requested_by: ParticipantId,
    ) -> Result<(), SessionError> {
        match self.phase {
            Phase::Lobby | Phase::Completed => {}
            Phase::Starting | Phase::QuestionOpen | Phase::QuestionReveal => {
                return Err(SessionError::SessionAlreadyActive);
            }
            Phase::Archived | Phase::Aborted => {
                return Err(SessionError::RoomClosed);
            }
        }
        if self.roster.get(requested_by).is_none() {
            return Err(SessionError::UnknownParticipant(requested_by));
        }
        if !self.roster.is_host(requested_by) {
            return Err(SessionError::NotHost(requested_by));
        }
        if self.roster.connected_player_count() == 0 {
            return Err(SessionError::NoPlayers);
        }
        if self.config.require_ready
            && self.phase == Phase::Lobby
            && !self.roster.all_players_ready()
        {
            return Err(SessionError::NotAllReady);
        }
        Ok(())
    }

    /// Starts a session with a fresh draw of questions. Valid from the
    /// lobby and from the results screen (play again).
    pub fn start(
        &mut self,
        requested_by: ParticipantId,
        questions: Vec<Question>,
        now: Instant,
    ) -> Result<Vec<Effect>, SessionError> {
        self.validate_start(requested_by)?;
        if questions.is_empty() {
            return Err(SessionError::NoQuestions);
        }

        self.board.reset_for_new_session();
        for id in self.roster.players().map(|p| p.id).collect::<Vec<_>>() {
            self.board.ensure_entry(id);
        }
        self.answer_log.clear();
        self.questions = questions;
        self.current = 0;
        self.collector = None;
        self.roster.clear_ready();
        self.phase = Phase::Starting;
        self.touch(now);

        info!(
            questions = self.questions.len(),
            players = self.roster.player_count(),
            "session starting"
        );

        let countdown = self.config.countdown;
        Ok(vec![
            Effect::Broadcast(ServerEvent::SessionStarting {
                countdown_ms: countdown.as_millis() as u64,
            }),
            self.arm_phase_timer(now + countdown),
        ])
    }

    // -- Answers ------------------------------------------------------------

    /// Accepts or rejects an answer submission.
    ///
    /// On acceptance the ack is broadcast (so lobbies can show who has
    /// answered without revealing what), and the window closes early if
    /// this was the last connected player. Rejections come back as
    /// errors for the caller alone.
    pub fn submit(
        &mut self,
        id: ParticipantId,
        question: QuestionId,
        option: usize,
        now: Instant,
    ) -> Result<Vec<Effect>, SessionError> {
        match self.roster.get(id) {
            Some(p) if p.is_player() => {}
            _ => return Err(SessionError::UnknownParticipant(id)),
        }
        if self.phase != Phase::QuestionOpen {
            return Err(SessionError::NotAcceptingAnswers);
        }

        let q = &self.questions[self.current];
        if option >= q.options.len() {
            return Err(SessionError::OptionOutOfRange {
                option,
                count: q.options.len(),
            });
        }

        let collector = self
            .collector
            .as_mut()
            .ok_or(SessionError::NotAcceptingAnswers)?;
        collector.submit(id, question, option, now)?;

        let mut effects = vec![Effect::Broadcast(ServerEvent::AnswerAck {
            participant_id: id,
            accepted: true,
            reason: None,
        })];
        effects.extend(self.try_early_close(now));
        Ok(effects)
    }

    /// Closes the window now if every connected player has answered.
    fn try_early_close(&mut self, now: Instant) -> Vec<Effect> {
        if self.phase != Phase::QuestionOpen {
            return Vec::new();
        }
        let Some(collector) = &self.collector else {
            return Vec::new();
        };
        let mut connected = self.roster.connected_players().map(|p| p.id).peekable();
        if connected.peek().is_none() {
            // Nobody left to wait for — but closing here would race the
            // abandon grace; let the deadline or the grace timer decide.
            return Vec::new();
        }
        if collector.all_answered(connected) {
            debug!(index = self.current, "all connected players answered — closing early");
            self.close_window(now)
        } else {
            Vec::new()
        }
    }

    // -- Timers -------------------------------------------------------------

    /// Handles a phase-timer fire. `generation` is the value carried by
    /// the `ArmPhaseTimer` effect that armed it; a stale generation means
    /// the deadline lost a race (early advance, abort, restart) and the
    /// fire is ignored.
    pub fn phase_deadline_elapsed(
        &mut self,
        generation: u64,
        now: Instant,
    ) -> Vec<Effect> {
        if generation != self.timer_gen {
            trace!(
                generation,
                current = self.timer_gen,
                "stale phase deadline ignored"
            );
            return Vec::new();
        }

        match self.phase {
            Phase::Starting => self.open_current(now),
            Phase::QuestionOpen => self.close_window(now),
            Phase::QuestionReveal => {
                self.current += 1;
                if self.current < self.questions.len() {
                    self.open_current(now)
                } else {
                    self.complete(now)
                }
            }
            Phase::Completed => {
                info!("archiving completed room");
                self.phase = Phase::Archived;
                self.touch(now);
                Vec::new()
            }
            Phase::Lobby | Phase::Archived | Phase::Aborted => Vec::new(),
        }
    }

    /// Handles the abandon-grace timer firing.
    pub fn abandon_elapsed(&mut self, now: Instant) -> Vec<Effect> {
        if self.phase.is_active() && self.roster.connected_player_count() == 0 {
            self.abort("all players disconnected", now)
        } else {
            // A player came back or the session ended first.
            Vec::new()
        }
    }

    fn open_current(&mut self, now: Instant) -> Vec<Effect> {
        let q = &self.questions[self.current];
        let question_id = q.id;
        let limit = q.time_limit.unwrap_or(self.config.time_limit);
        let opened = ServerEvent::QuestionOpened {
            index: self.current,
            question: q.view(),
            deadline_ms: limit.as_millis() as u64,
        };

        self.collector =
            Some(AnswerCollector::open(question_id, self.current, limit, now));
        self.phase = Phase::QuestionOpen;
        self.touch(now);

        debug!(index = self.current, question = %question_id, ?limit, "question opened");

        vec![
            Effect::Broadcast(opened),
            self.arm_phase_timer(now + limit),
        ]
    }

    /// Closes the current window: backfills timeouts, scores everything,
    /// publishes results and standings, and enters the reveal pause.
    /// A second call against the same window is a complete no-op.
    fn close_window(&mut self, now: Instant) -> Vec<Effect> {
        let players: Vec<ParticipantId> =
            self.roster.players().map(|p| p.id).collect();

        // Close and score inside one scope so every field borrow ends
        // before the abort/arm calls below (which need all of `self`).
        let scored: Result<Vec<ParticipantResult>, ()> = {
            let Some(collector) = self.collector.as_mut() else {
                return Vec::new();
            };
            if !collector.close(&players) {
                return Vec::new();
            }

            let q = &self.questions[self.current];
            let limit = collector.time_limit();
            let policy = self.config.scoring;

            // Score in join order so the whole close is deterministic.
            let mut corrupted = false;
            for &p in &players {
                let Some(answer) = collector.get_mut(p) else {
                    continue; // close() backfilled everyone; defensive only
                };
                if let Err(e) =
                    self.board.apply(answer, q, self.current, limit, &policy)
                {
                    error!(error = %e, "score board corrupted — aborting room");
                    corrupted = true;
                    break;
                }
            }

            if corrupted {
                Err(())
            } else {
                Ok(players
                    .iter()
                    .filter_map(|&p| collector.get(p))
                    .map(|a| ParticipantResult {
                        participant_id: a.participant,
                        option: a.option,
                        correct: a
                            .option
                            .is_some_and(|o| !a.timed_out() && q.is_correct(o)),
                        points: self
                            .board
                            .get(a.participant)
                            .and_then(|e| {
                                e.history.iter().find(|o| o.question == q.id)
                            })
                            .map(|o| o.points)
                            .unwrap_or(0),
                        elapsed_ms: a.elapsed.as_millis() as u64,
                        timed_out: a.timed_out(),
                    })
                    .collect())
            }
        };

        let results = match scored {
            Ok(results) => results,
            Err(()) => return self.abort("internal scoring fault", now),
        };

        let q = &self.questions[self.current];
        self.answer_log.push(QuestionLog {
            question: q.id,
            index: self.current,
            correct_option: q.correct,
            results: results.clone(),
        });

        let closed = ServerEvent::QuestionClosed {
            index: self.current,
            correct_option: q.correct,
            results,
        };

        self.phase = Phase::QuestionReveal;
        self.touch(now);

        let mut effects = vec![Effect::Broadcast(closed)];
        effects.push(self.publish_leaderboard());
        effects.push(self.arm_phase_timer(now + self.config.reveal_duration));
        effects
    }

    fn publish_leaderboard(&mut self) -> Effect {
        let entries = leaderboard::rank(&self.board, |p| self.roster.join_order(p));
        let version = self.board.next_version();
        Effect::Broadcast(ServerEvent::Leaderboard { version, entries })
    }

    fn complete(&mut self, now: Instant) -> Vec<Effect> {
        self.phase = Phase::Completed;
        self.touch(now);
        info!(questions = self.questions.len(), "session completed");

        let final_leaderboard =
            leaderboard::rank(&self.board, |p| self.roster.join_order(p));
        let completed = ServerEvent::SessionCompleted {
            final_leaderboard,
            answer_log: self.answer_log.clone(),
        };
        vec![
            Effect::Broadcast(completed),
            self.arm_phase_timer(now + self.config.archive_grace),
        ]
    }

    // -- Connection changes --------------------------------------------------

    /// Marks a participant disconnected without removing them.
    pub fn mark_disconnected(
        &mut self,
        id: ParticipantId,
        now: Instant,
    ) -> Vec<Effect> {
        if self.roster.get(id).is_none() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        if let Some(new_host) = self.roster.mark_disconnected(id) {
            effects.push(Effect::Broadcast(ServerEvent::HostChanged {
                host: new_host,
            }));
        }
        self.touch(now);

        if self.phase.is_active() && self.roster.connected_player_count() == 0 {
            info!("room abandoned — grace timer armed");
            effects.push(Effect::ArmAbandonTimer {
                deadline: now + self.config.abandon_grace,
            });
        } else {
            // One fewer voice to wait for may mean everyone has answered.
            effects.extend(self.try_early_close(now));
        }
        effects
    }

    /// Marks a participant connected again (transport re-attached).
    pub fn mark_connected(
        &mut self,
        id: ParticipantId,
        now: Instant,
    ) -> Vec<Effect> {
        if self.roster.get(id).is_none() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        if let Some(new_host) = self.roster.mark_connected(id) {
            effects.push(Effect::Broadcast(ServerEvent::HostChanged {
                host: new_host,
            }));
        }
        self.touch(now);
        if self.roster.connected_player_count() > 0 {
            effects.push(Effect::CancelAbandonTimer);
        }
        effects
    }

    // -- Teardown -----------------------------------------------------------

    /// Aborts the room. Idempotent against already-terminal phases.
    pub fn abort(&mut self, reason: &str, now: Instant) -> Vec<Effect> {
        if self.phase.is_terminal() {
            return Vec::new();
        }
        info!(%reason, phase = %self.phase, "room aborted");
        self.phase = Phase::Aborted;
        self.timer_gen += 1; // invalidate any in-flight fire
        self.touch(now);
        vec![
            Effect::CancelPhaseTimer,
            Effect::CancelAbandonTimer,
            Effect::Broadcast(ServerEvent::RoomAborted {
                reason: reason.to_string(),
            }),
        ]
    }

    /// Reclaims the room if it has been idle past the configured TTL.
    /// Returns effects to run (and tear down) when reclaimed, `None`
    /// while the room is still live.
    pub fn reclaim_if_idle(&mut self, now: Instant) -> Option<Vec<Effect>> {
        if now.saturating_duration_since(self.last_transition)
            < self.config.idle_ttl
        {
            return None;
        }
        if self.phase.is_terminal() {
            return Some(Vec::new());
        }
        info!(phase = %self.phase, "idle room reclaimed");
        Some(self.abort("room reclaimed after inactivity", now))
    }
}

// =========================================================================
// Tests
// =========================================================================
