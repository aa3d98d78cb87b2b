//! Per-connection handler: greeting, request dispatch, event pumping.
//!
//! Each accepted connection gets its own task running [`handle_connection`].
//! The flow is:
//!
//! 1. Receive `Hello` → check the protocol version → send `Welcome`.
//! 2. Loop on incoming requests, dispatching to the registry or the
//!    connection's current room.
//! 3. On join, spawn an *event pump*: a small task that drains the
//!    room's event channel straight into the socket's write queue. The
//!    pump preserves the room's emission order end-to-end, which is what
//!    makes leaderboard versions arrive monotonically at each client.
//!
//! Client errors become `ServerEvent::Error` (or a negative `AnswerAck`
//! for submissions) on this connection only; they never touch the room.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use berean_engine::{QuestionBank, RoomConfig, SessionError};
use berean_protocol::{
    ClientRequest, Codec, Envelope, ParticipantId, ProtocolError, Role,
    ServerEvent, PROTOCOL_VERSION,
};
use berean_room::{RoomError, RoomHandle};
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::ws::WsConnection;
use crate::BereanError;

/// How long a client gets to say hello before we hang up.
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// The room this connection is attached to, if any.
struct Membership {
    handle: RoomHandle,
    participant: ParticipantId,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<B, C>(
    mut conn: WsConnection,
    state: Arc<ServerState<B, C>>,
) -> Result<(), BereanError>
where
    B: QuestionBank,
    C: Codec + Clone,
{
    let conn_id = conn.id();
    let seq = Arc::new(AtomicU64::new(1));

    perform_hello(&mut conn, &state, &seq).await?;
    tracing::debug!(conn = conn_id, "client greeted");

    let mut membership: Option<Membership> = None;

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(conn = conn_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(conn = conn_id, error = %e, "recv error");
                break;
            }
        };

        let envelope: Envelope<ClientRequest> = match state.codec.decode(&data)
        {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(conn = conn_id, error = %e, "undecodable frame");
                continue;
            }
        };

        handle_request(envelope.payload, &conn, &state, &seq, &mut membership)
            .await?;
    }

    // The room treats a vanished connection as a disconnect, not a
    // leave — the participant keeps their seat and scores.
    if let Some(m) = membership {
        m.handle.disconnected(m.participant).await;
    }
    Ok(())
}

/// First contact: the client must send `Hello` with a matching protocol
/// version before anything else.
async fn perform_hello<B, C>(
    conn: &mut WsConnection,
    state: &Arc<ServerState<B, C>>,
    seq: &Arc<AtomicU64>,
) -> Result<(), BereanError>
where
    B: QuestionBank,
    C: Codec + Clone,
{
    let data = match tokio::time::timeout(HELLO_TIMEOUT, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before hello".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(
                ProtocolError::InvalidMessage("hello timed out".into()).into()
            );
        }
    };

    let envelope: Envelope<ClientRequest> = state.codec.decode(&data)?;
    let version = match envelope.payload {
        ClientRequest::Hello { version } => version,
        _ => {
            send_event(
                conn,
                state,
                seq,
                ServerEvent::Error {
                    code: 400,
                    message: "expected Hello".into(),
                },
            );
            return Err(ProtocolError::InvalidMessage(
                "first message must be Hello".into(),
            )
            .into());
        }
    };

    if version != PROTOCOL_VERSION {
        send_event(
            conn,
            state,
            seq,
            ServerEvent::Error {
                code: 400,
                message: format!(
                    "version mismatch: expected {PROTOCOL_VERSION}, got {version}"
                ),
            },
        );
        return Err(ProtocolError::InvalidMessage(
            "protocol version mismatch".into(),
        )
        .into());
    }

    send_event(
        conn,
        state,
        seq,
        ServerEvent::Welcome {
            server_time: state.started.elapsed().as_millis() as u64,
        },
    );
    Ok(())
}

async fn handle_request<B, C>(
    request: ClientRequest,
    conn: &WsConnection,
    state: &Arc<ServerState<B, C>>,
    seq: &Arc<AtomicU64>,
    membership: &mut Option<Membership>,
) -> Result<(), BereanError>
where
    B: QuestionBank,
    C: Codec + Clone,
{
    match request {
        ClientRequest::Hello { .. } => {
            tracing::debug!("redundant Hello ignored");
        }

        ClientRequest::CreateRoom { options } => {
            let config = RoomConfig::from_options(&options);
            let (code, room_id) = state.registry.create(config);
            send_event(conn, state, seq, ServerEvent::RoomCreated {
                code,
                room_id,
            });
        }

        ClientRequest::JoinRoom {
            code,
            name,
            spectator,
        } => {
            if membership.is_some() {
                send_event(conn, state, seq, ServerEvent::Error {
                    code: 409,
                    message: "already in a room".into(),
                });
                return Ok(());
            }

            let handle = match state.registry.lookup(&code) {
                Ok(handle) => handle,
                Err(e) => {
                    send_error(conn, state, seq, &e);
                    return Ok(());
                }
            };

            let role = if spectator { Role::Spectator } else { Role::Player };
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            match handle.join(&name, role, events_tx).await {
                Ok(ok) => {
                    spawn_event_pump(
                        events_rx,
                        conn.sender(),
                        state.codec.clone(),
                        Arc::clone(seq),
                        Arc::clone(state),
                    );
                    send_event(conn, state, seq, ServerEvent::RoomJoined {
                        participant_id: ok.participant_id,
                        code,
                        roster: ok.roster,
                    });
                    *membership = Some(Membership {
                        handle,
                        participant: ok.participant_id,
                    });
                }
                Err(e) => send_error(conn, state, seq, &e),
            }
        }

        ClientRequest::SetReady { ready } => {
            let Some(m) = membership.as_ref() else {
                send_not_in_room(conn, state, seq);
                return Ok(());
            };
            if let Err(e) = m.handle.set_ready(m.participant, ready).await {
                send_error(conn, state, seq, &e);
            }
        }

        ClientRequest::StartSession => {
            let Some(m) = membership.as_ref() else {
                send_not_in_room(conn, state, seq);
                return Ok(());
            };
            if let Err(e) = m.handle.start(m.participant).await {
                send_error(conn, state, seq, &e);
            }
        }

        ClientRequest::SubmitAnswer { question, option } => {
            let Some(m) = membership.as_ref() else {
                send_not_in_room(conn, state, seq);
                return Ok(());
            };
            // A rejected submission is acknowledged, not errored — the
            // accepted acks travel the broadcast stream, the rejection
            // only to its sender.
            if let Err(e) = m.handle.submit(m.participant, question, option).await
            {
                send_event(conn, state, seq, ServerEvent::AnswerAck {
                    participant_id: m.participant,
                    accepted: false,
                    reason: Some(e.to_string()),
                });
            }
        }

        ClientRequest::LeaveRoom => {
            if let Some(m) = membership.take() {
                if let Err(e) = m.handle.leave(m.participant).await {
                    tracing::debug!(error = %e, "leave failed");
                }
            }
        }
    }
    Ok(())
}

/// Forwards a room's event stream into the connection's write queue.
///
/// Runs until the room drops the channel (leave, teardown) or the
/// writer goes away. Order in, order out.
fn spawn_event_pump<B, C>(
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
    out: mpsc::UnboundedSender<Vec<u8>>,
    codec: C,
    seq: Arc<AtomicU64>,
    state: Arc<ServerState<B, C>>,
) where
    B: QuestionBank,
    C: Codec + Clone,
{
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let envelope = Envelope {
                seq: seq.fetch_add(1, Ordering::Relaxed),
                timestamp: state.started.elapsed().as_millis() as u64,
                payload: event,
            };
            match codec.encode(&envelope) {
                Ok(bytes) => {
                    if out.send(bytes).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode event");
                }
            }
        }
    });
}

fn send_event<B, C>(
    conn: &WsConnection,
    state: &Arc<ServerState<B, C>>,
    seq: &Arc<AtomicU64>,
    event: ServerEvent,
) where
    B: QuestionBank,
    C: Codec + Clone,
{
    let envelope = Envelope {
        seq: seq.fetch_add(1, Ordering::Relaxed),
        timestamp: state.started.elapsed().as_millis() as u64,
        payload: event,
    };
    match state.codec.encode(&envelope) {
        Ok(bytes) => {
            conn.send(bytes);
        }
        Err(e) => tracing::warn!(error = %e, "failed to encode reply"),
    }
}

fn send_error<B, C>(
    conn: &WsConnection,
    state: &Arc<ServerState<B, C>>,
    seq: &Arc<AtomicU64>,
    error: &RoomError,
) where
    B: QuestionBank,
    C: Codec + Clone,
{
    send_event(conn, state, seq, ServerEvent::Error {
        code: error_code(error),
        message: error.to_string(),
    });
}

fn send_not_in_room<B, C>(
    conn: &WsConnection,
    state: &Arc<ServerState<B, C>>,
    seq: &Arc<AtomicU64>,
) where
    B: QuestionBank,
    C: Codec + Clone,
{
    send_event(conn, state, seq, ServerEvent::Error {
        code: 400,
        message: "not in a room".into(),
    });
}

/// HTTP-ish status codes for the wire.
fn error_code(error: &RoomError) -> u16 {
    match error {
        RoomError::RoomNotFound => 404,
        RoomError::Unavailable(_) => 503,
        RoomError::Session(session) => match session {
            SessionError::RoomClosed | SessionError::UnknownParticipant(_) => {
                404
            }
            SessionError::RoomFull
            | SessionError::SessionAlreadyActive
            | SessionError::NotAllReady
            | SessionError::NoPlayers
            | SessionError::NotAcceptingAnswers
            | SessionError::DuplicateSubmission(_) => 409,
            SessionError::SpectatorsNotAllowed | SessionError::NotHost(_) => {
                403
            }
            SessionError::OptionOutOfRange { .. } => 400,
            SessionError::NoQuestions | SessionError::Bank(_) => 503,
            SessionError::ScoreInvariant { .. } => 500,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(error_code(&RoomError::RoomNotFound), 404);
        assert_eq!(
            error_code(&RoomError::Session(SessionError::RoomClosed)),
            404,
            "closed rooms must be indistinguishable from absent ones"
        );
        assert_eq!(
            error_code(&RoomError::Session(SessionError::RoomFull)),
            409
        );
        assert_eq!(
            error_code(&RoomError::Session(SessionError::NotHost(
                ParticipantId(1)
            ))),
            403
        );
        assert_eq!(
            error_code(&RoomError::Session(
                SessionError::OptionOutOfRange { option: 9, count: 4 }
            )),
            400
        );
    }
}
