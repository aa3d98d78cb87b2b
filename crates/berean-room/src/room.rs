//! Room actor: an isolated Tokio task that owns one quiz session.
//!
//! Each room runs in its own task, communicating with the outside world
//! through an mpsc channel. That channel *is* the room's critical
//! section: joins, answers, timer fires, disconnects, and reclaim checks
//! are handled one at a time, so an "all answered" check can never
//! interleave with a deadline fire, and a reclaim can never race a join.
//!
//! The actor owns two [`DeadlineTimer`]s — the phase timer (countdown /
//! question window / reveal pause / archive grace) and the abandon
//! timer (everyone disconnected). Arming replaces; firing disarms; the
//! state machine's generation check catches anything stale.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant as StdInstant;

use berean_clock::DeadlineTimer;
use berean_engine::{
    Effect, Phase, QuestionBank, RoomConfig, SessionError, SessionMachine,
};
use berean_protocol::{
    ParticipantId, QuestionId, Role, RoomCode, RoomId, RosterEntry,
    ServerEvent,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant as TokioInstant;

use crate::RoomError;

/// Channel sender used to deliver room events to one participant's
/// connection handler.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Successful join: the new identity plus a roster snapshot.
#[derive(Debug, Clone)]
pub struct JoinOk {
    pub participant_id: ParticipantId,
    pub roster: Vec<RosterEntry>,
}

/// A snapshot of room metadata.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub code: RoomCode,
    pub phase: Phase,
    pub players: usize,
    pub spectators: usize,
    pub max_players: usize,
}

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        name: String,
        role: Role,
        sender: EventSender,
        reply: oneshot::Sender<Result<JoinOk, RoomError>>,
    },
    Leave {
        participant: ParticipantId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    SetReady {
        participant: ParticipantId,
        ready: bool,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Start {
        participant: ParticipantId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Submit {
        participant: ParticipantId,
        question: QuestionId,
        option: usize,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Disconnected {
        participant: ParticipantId,
    },
    Reconnected {
        participant: ParticipantId,
        sender: EventSender,
    },
    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },
    ReclaimIfIdle {
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Handle to a running room actor. Cheap to clone — it's an
/// `mpsc::Sender` wrapper. The registry holds one per room.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    /// Joins the room. `sender` is where this participant's event
    /// stream will be delivered.
    pub async fn join(
        &self,
        name: &str,
        role: Role,
        sender: EventSender,
    ) -> Result<JoinOk, RoomError> {
        self.request(|reply| RoomCommand::Join {
            name: name.to_string(),
            role,
            sender,
            reply,
        })
        .await?
    }

    pub async fn leave(
        &self,
        participant: ParticipantId,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Leave { participant, reply })
            .await?
    }

    pub async fn set_ready(
        &self,
        participant: ParticipantId,
        ready: bool,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::SetReady {
            participant,
            ready,
            reply,
        })
        .await?
    }

    pub async fn start(
        &self,
        participant: ParticipantId,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Start { participant, reply })
            .await?
    }

    /// Submits an answer. A submission racing the room's teardown gets
    /// the same answer a too-late submission would — the room stopped
    /// accepting, nothing more dramatic.
    pub async fn submit(
        &self,
        participant: ParticipantId,
        question: QuestionId,
        option: usize,
    ) -> Result<(), RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = RoomCommand::Submit {
            participant,
            question,
            option,
            reply: reply_tx,
        };
        if self.sender.send(cmd).await.is_err() {
            return Err(SessionError::NotAcceptingAnswers.into());
        }
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(SessionError::NotAcceptingAnswers.into()),
        }
    }

    /// Tells the room a participant's connection dropped
    /// (fire-and-forget; the room may already be gone).
    pub async fn disconnected(&self, participant: ParticipantId) {
        let _ = self
            .sender
            .send(RoomCommand::Disconnected { participant })
            .await;
    }

    /// Re-attaches a connection for an existing participant.
    pub async fn reconnected(
        &self,
        participant: ParticipantId,
        sender: EventSender,
    ) {
        let _ = self
            .sender
            .send(RoomCommand::Reconnected {
                participant,
                sender,
            })
            .await;
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::GetInfo { reply }).await
    }

    /// Asks the room to reclaim itself if idle. The idleness check runs
    /// *inside* the actor loop, serialized with joins — the registry
    /// never decides a room's fate from the outside. Returns whether the
    /// room is now gone.
    pub async fn reclaim_if_idle(&self) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::ReclaimIfIdle { reply })
            .await
    }

    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Server receive time, as a std instant sourced from the Tokio clock so
/// paused-time tests stay deterministic.
fn now() -> StdInstant {
    TokioInstant::now().into_std()
}

struct RoomActor<B: QuestionBank> {
    room_id: RoomId,
    code: RoomCode,
    machine: SessionMachine,
    bank: Arc<B>,
    /// Per-participant outbound event channels.
    senders: HashMap<ParticipantId, EventSender>,
    phase_timer: DeadlineTimer,
    /// Generation of the currently armed phase deadline, handed back to
    /// the machine on fire so it can reject anything stale.
    phase_timer_gen: u64,
    abandon_timer: DeadlineTimer,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl<B: QuestionBank> RoomActor<B> {
    async fn run(mut self) {
        tracing::info!(room_id = %self.room_id, code = %self.code, "room actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break, // registry dropped us
                    }
                }
                _ = self.phase_timer.fired() => {
                    let generation = self.phase_timer_gen;
                    let effects =
                        self.machine.phase_deadline_elapsed(generation, now());
                    self.run_effects(effects);
                }
                _ = self.abandon_timer.fired() => {
                    let effects = self.machine.abandon_elapsed(now());
                    self.run_effects(effects);
                }
            }

            if self.machine.phase().is_terminal() {
                break;
            }
        }

        tracing::info!(room_id = %self.room_id, phase = %self.machine.phase(), "room actor stopped");
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                name,
                role,
                sender,
                reply,
            } => {
                let result = match self.machine.join(&name, role, now()) {
                    Ok((participant_id, effects)) => {
                        self.senders.insert(participant_id, sender);
                        self.run_effects(effects);
                        Ok(JoinOk {
                            participant_id,
                            roster: self.machine.roster().entries(),
                        })
                    }
                    // Terminal rooms are indistinguishable from absent
                    // ones to a joiner.
                    Err(SessionError::RoomClosed) => Err(RoomError::RoomNotFound),
                    Err(e) => Err(e.into()),
                };
                let _ = reply.send(result);
            }

            RoomCommand::Leave { participant, reply } => {
                let result = match self.machine.leave(participant, now()) {
                    Ok(effects) => {
                        self.senders.remove(&participant);
                        self.run_effects(effects);
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                };
                let _ = reply.send(result);
            }

            RoomCommand::SetReady {
                participant,
                ready,
                reply,
            } => {
                let result = self
                    .machine
                    .set_ready(participant, ready, now())
                    .map(|effects| self.run_effects(effects))
                    .map_err(RoomError::from);
                let _ = reply.send(result);
            }

            RoomCommand::Start { participant, reply } => {
                let result = self.handle_start(participant).await;
                let _ = reply.send(result);
            }

            RoomCommand::Submit {
                participant,
                question,
                option,
                reply,
            } => {
                let result = self
                    .machine
                    .submit(participant, question, option, now())
                    .map(|effects| self.run_effects(effects))
                    .map_err(RoomError::from);
                let _ = reply.send(result);
            }

            RoomCommand::Disconnected { participant } => {
                self.senders.remove(&participant);
                let effects = self.machine.mark_disconnected(participant, now());
                self.run_effects(effects);
            }

            RoomCommand::Reconnected {
                participant,
                sender,
            } => {
                if self.machine.roster().get(participant).is_some() {
                    self.senders.insert(participant, sender);
                    let effects = self.machine.mark_connected(participant, now());
                    self.run_effects(effects);
                }
            }

            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }

            RoomCommand::ReclaimIfIdle { reply } => {
                let reclaimed = match self.machine.reclaim_if_idle(now()) {
                    Some(effects) => {
                        self.run_effects(effects);
                        true
                    }
                    None => false,
                };
                let _ = reply.send(reclaimed);
            }

            RoomCommand::Shutdown => {
                let effects = self.machine.abort("server shutting down", now());
                self.run_effects(effects);
            }
        }
    }

    /// Start is the one command that needs the bank: validate the
    /// guards first so a non-host can't trigger a draw, then draw,
    /// then start for real. The machine re-checks its own guards.
    async fn handle_start(
        &mut self,
        participant: ParticipantId,
    ) -> Result<(), RoomError> {
        self.machine.validate_start(participant)?;

        let selection = self.machine.config().selection();
        let questions = self
            .bank
            .draw(&selection)
            .await
            .map_err(SessionError::from)?;

        let effects = self.machine.start(participant, questions, now())?;
        self.run_effects(effects);
        Ok(())
    }

    fn run_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Broadcast(event) => self.broadcast(event),
                Effect::Send(participant, event) => {
                    self.send_to(participant, event);
                }
                Effect::ArmPhaseTimer {
                    deadline,
                    generation,
                } => {
                    self.phase_timer.arm(TokioInstant::from_std(deadline));
                    self.phase_timer_gen = generation;
                }
                Effect::CancelPhaseTimer => self.phase_timer.cancel(),
                Effect::ArmAbandonTimer { deadline } => {
                    self.abandon_timer.arm(TokioInstant::from_std(deadline));
                }
                Effect::CancelAbandonTimer => self.abandon_timer.cancel(),
            }
        }
    }

    /// Fans an event out to every attached connection. Closed channels
    /// are dropped silently — the disconnect command will follow.
    fn broadcast(&mut self, event: ServerEvent) {
        self.senders.retain(|participant, sender| {
            let alive = sender.send(event.clone()).is_ok();
            if !alive {
                tracing::debug!(%participant, "dropping closed event channel");
            }
            alive
        });
    }

    fn send_to(&self, participant: ParticipantId, event: ServerEvent) {
        if let Some(sender) = self.senders.get(&participant) {
            let _ = sender.send(event);
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id,
            code: self.code.clone(),
            phase: self.machine.phase(),
            players: self.machine.roster().player_count(),
            spectators: self.machine.roster().spectator_count(),
            max_players: self.machine.config().max_players,
        }
    }
}

/// Spawns a new room actor task and returns a handle to it.
pub(crate) fn spawn_room<B: QuestionBank>(
    room_id: RoomId,
    code: RoomCode,
    config: RoomConfig,
    bank: Arc<B>,
    channel_size: usize,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);

    let actor = RoomActor {
        room_id,
        code: code.clone(),
        machine: SessionMachine::new(config, now()),
        bank,
        senders: HashMap::new(),
        phase_timer: DeadlineTimer::new(),
        phase_timer_gen: 0,
        abandon_timer: DeadlineTimer::new(),
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        code,
        sender: tx,
    }
}
