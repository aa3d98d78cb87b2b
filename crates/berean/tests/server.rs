//! Integration tests for the Berean server: real websockets, real time.
//!
//! These cover the connection-facing surface — greeting, room creation,
//! joining, error envelopes, and one short end-to-end quiz. The timing
//! and concurrency corner cases live in the `berean-room` and
//! `berean-engine` suites where the clock can be paused; here the quiz
//! configs are kept small so the whole file stays fast.

use std::sync::Arc;
use std::time::Duration;

use berean::BereanServer;
use berean_engine::{FixedBank, Question};
use berean_protocol::{
    ClientRequest, Envelope, QuestionId, RoomCode, RoomOptions, ServerEvent,
    PROTOCOL_VERSION,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =========================================================================
// Helpers
// =========================================================================

fn bank() -> Arc<FixedBank> {
    Arc::new(FixedBank::new(vec![Question {
        id: QuestionId(1),
        prompt: "Who hid the spies in Jericho?".into(),
        options: vec![
            "Deborah".into(),
            "Rahab".into(),
            "Ruth".into(),
            "Esther".into(),
        ],
        correct: 1,
        time_limit: None,
    }]))
}

async fn start_server() -> std::net::SocketAddr {
    let server = BereanServer::builder()
        .bind("127.0.0.1:0")
        .build(bank())
        .await
        .expect("server should bind");
    let addr = server.local_addr().expect("should have a local addr");
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn connect(addr: std::net::SocketAddr) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("client should connect");
    ws
}

async fn send(ws: &mut Client, seq: u64, request: ClientRequest) {
    let envelope = Envelope {
        seq,
        timestamp: 0,
        payload: request,
    };
    let bytes = serde_json::to_vec(&envelope).unwrap();
    ws.send(Message::Binary(bytes.into()))
        .await
        .expect("send should succeed");
}

/// Receives the next server event, failing the test after 10 seconds.
async fn recv_event(ws: &mut Client) -> ServerEvent {
    let frame = tokio::time::timeout(Duration::from_secs(10), ws.next())
        .await
        .expect("timed out waiting for an event")
        .expect("stream ended unexpectedly")
        .expect("websocket error");
    let data = match frame {
        Message::Binary(data) => data.to_vec(),
        Message::Text(text) => text.as_bytes().to_vec(),
        other => panic!("unexpected frame: {other:?}"),
    };
    let envelope: Envelope<ServerEvent> =
        serde_json::from_slice(&data).expect("event should decode");
    envelope.payload
}

/// Receives events until one matches, failing after 15 seconds total.
async fn recv_until(
    ws: &mut Client,
    mut matches: impl FnMut(&ServerEvent) -> bool,
) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let event = recv_event(ws).await;
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("matching event never arrived")
}

/// Connects and completes the greeting.
async fn greeted_client(addr: std::net::SocketAddr) -> Client {
    let mut ws = connect(addr).await;
    send(&mut ws, 1, ClientRequest::Hello { version: PROTOCOL_VERSION }).await;
    let event = recv_event(&mut ws).await;
    assert!(matches!(event, ServerEvent::Welcome { .. }), "got {event:?}");
    ws
}

fn options(question_count: usize, time_limit_secs: u64) -> RoomOptions {
    RoomOptions {
        max_players: 4,
        question_count,
        time_limit_secs,
        ..RoomOptions::default()
    }
}

/// Creates a room via `ws` and returns its code.
async fn create_room(ws: &mut Client, opts: RoomOptions) -> RoomCode {
    send(ws, 2, ClientRequest::CreateRoom { options: opts }).await;
    match recv_event(ws).await {
        ServerEvent::RoomCreated { code, .. } => code,
        other => panic!("expected RoomCreated, got {other:?}"),
    }
}

// =========================================================================
// Greeting
// =========================================================================

#[tokio::test]
async fn test_hello_gets_welcome() {
    let addr = start_server().await;
    let _ws = greeted_client(addr).await;
}

#[tokio::test]
async fn test_version_mismatch_rejected() {
    let addr = start_server().await;
    let mut ws = connect(addr).await;

    send(&mut ws, 1, ClientRequest::Hello { version: 999 }).await;

    let event = recv_event(&mut ws).await;
    match event {
        ServerEvent::Error { code, message } => {
            assert_eq!(code, 400);
            assert!(message.contains("version"), "got: {message}");
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_message_must_be_hello() {
    let addr = start_server().await;
    let mut ws = connect(addr).await;

    send(&mut ws, 1, ClientRequest::StartSession).await;

    let event = recv_event(&mut ws).await;
    assert!(
        matches!(event, ServerEvent::Error { code: 400, .. }),
        "got {event:?}"
    );
}

// =========================================================================
// Rooms
// =========================================================================

#[tokio::test]
async fn test_create_room_returns_wellformed_code() {
    let addr = start_server().await;
    let mut ws = greeted_client(addr).await;

    let code = create_room(&mut ws, options(1, 30)).await;

    assert_eq!(code.as_str().len(), 6);
    // The code round-trips through parsing (uppercase alphanumeric).
    assert_eq!(RoomCode::parse(code.as_str()).unwrap(), code);
}

#[tokio::test]
async fn test_join_unknown_code_is_not_found() {
    let addr = start_server().await;
    let mut ws = greeted_client(addr).await;

    send(&mut ws, 2, ClientRequest::JoinRoom {
        code: RoomCode::parse("ZZZZ99").unwrap(),
        name: "Silas".into(),
        spectator: false,
    })
    .await;

    let event = recv_event(&mut ws).await;
    assert!(
        matches!(event, ServerEvent::Error { code: 404, .. }),
        "got {event:?}"
    );
}

#[tokio::test]
async fn test_join_delivers_roster_and_broadcasts() {
    let addr = start_server().await;
    let mut host = greeted_client(addr).await;
    let code = create_room(&mut host, options(1, 30)).await;

    send(&mut host, 3, ClientRequest::JoinRoom {
        code: code.clone(),
        name: "Phoebe".into(),
        spectator: false,
    })
    .await;
    let event = recv_until(&mut host, |e| {
        matches!(e, ServerEvent::RoomJoined { .. })
    })
    .await;
    match event {
        ServerEvent::RoomJoined { roster, .. } => {
            assert_eq!(roster.len(), 1);
            assert!(roster[0].is_host);
        }
        _ => unreachable!(),
    }

    let mut second = greeted_client(addr).await;
    send(&mut second, 2, ClientRequest::JoinRoom {
        code,
        name: "Junia".into(),
        spectator: false,
    })
    .await;
    let event = recv_until(&mut second, |e| {
        matches!(e, ServerEvent::RoomJoined { .. })
    })
    .await;
    match event {
        ServerEvent::RoomJoined { roster, .. } => assert_eq!(roster.len(), 2),
        _ => unreachable!(),
    }

    // The host hears about the newcomer.
    let event = recv_until(&mut host, |e| {
        matches!(e, ServerEvent::ParticipantJoined { .. })
    })
    .await;
    match event {
        ServerEvent::ParticipantJoined { entry } => {
            assert_eq!(entry.name, "Junia");
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_start_by_non_host_gets_forbidden() {
    let addr = start_server().await;
    let mut host = greeted_client(addr).await;
    let code = create_room(&mut host, options(1, 30)).await;
    send(&mut host, 3, ClientRequest::JoinRoom {
        code: code.clone(),
        name: "host".into(),
        spectator: false,
    })
    .await;
    recv_until(&mut host, |e| matches!(e, ServerEvent::RoomJoined { .. })).await;

    let mut other = greeted_client(addr).await;
    send(&mut other, 2, ClientRequest::JoinRoom {
        code,
        name: "other".into(),
        spectator: false,
    })
    .await;
    recv_until(&mut other, |e| matches!(e, ServerEvent::RoomJoined { .. }))
        .await;

    send(&mut other, 3, ClientRequest::StartSession).await;
    let event =
        recv_until(&mut other, |e| matches!(e, ServerEvent::Error { .. }))
            .await;
    assert!(
        matches!(event, ServerEvent::Error { code: 403, .. }),
        "got {event:?}"
    );
}

#[tokio::test]
async fn test_submit_outside_window_gets_negative_ack() {
    let addr = start_server().await;
    let mut ws = greeted_client(addr).await;
    let code = create_room(&mut ws, options(1, 30)).await;
    send(&mut ws, 3, ClientRequest::JoinRoom {
        code,
        name: "eager".into(),
        spectator: false,
    })
    .await;
    recv_until(&mut ws, |e| matches!(e, ServerEvent::RoomJoined { .. })).await;

    send(&mut ws, 4, ClientRequest::SubmitAnswer {
        question: QuestionId(1),
        option: 0,
    })
    .await;

    let event = recv_until(&mut ws, |e| {
        matches!(e, ServerEvent::AnswerAck { accepted: false, .. })
    })
    .await;
    match event {
        ServerEvent::AnswerAck { reason, .. } => {
            assert!(reason.is_some(), "rejection must carry a reason");
        }
        _ => unreachable!(),
    }
}

// =========================================================================
// One short quiz, end to end
// =========================================================================

#[tokio::test]
async fn test_single_question_quiz_end_to_end() {
    let addr = start_server().await;

    let mut host = greeted_client(addr).await;
    let code = create_room(&mut host, options(1, 5)).await;
    send(&mut host, 3, ClientRequest::JoinRoom {
        code: code.clone(),
        name: "Apollos".into(),
        spectator: false,
    })
    .await;
    let host_id = match recv_until(&mut host, |e| {
        matches!(e, ServerEvent::RoomJoined { .. })
    })
    .await
    {
        ServerEvent::RoomJoined { participant_id, .. } => participant_id,
        _ => unreachable!(),
    };

    let mut guest = greeted_client(addr).await;
    send(&mut guest, 2, ClientRequest::JoinRoom {
        code,
        name: "Barnabas".into(),
        spectator: false,
    })
    .await;
    recv_until(&mut guest, |e| matches!(e, ServerEvent::RoomJoined { .. }))
        .await;

    send(&mut host, 4, ClientRequest::StartSession).await;

    // Both see the countdown, then the open question.
    recv_until(&mut host, |e| {
        matches!(e, ServerEvent::SessionStarting { .. })
    })
    .await;
    let opened = recv_until(&mut guest, |e| {
        matches!(e, ServerEvent::QuestionOpened { .. })
    })
    .await;
    let question = match &opened {
        ServerEvent::QuestionOpened { question, index, .. } => {
            assert_eq!(*index, 0);
            assert_eq!(question.options.len(), 4);
            question.id
        }
        _ => unreachable!(),
    };
    recv_until(&mut host, |e| matches!(e, ServerEvent::QuestionOpened { .. }))
        .await;

    // Host answers correctly, guest wrongly; the second answer closes
    // the window.
    send(&mut host, 5, ClientRequest::SubmitAnswer {
        question,
        option: 1,
    })
    .await;
    send(&mut guest, 3, ClientRequest::SubmitAnswer {
        question,
        option: 0,
    })
    .await;

    let closed = recv_until(&mut guest, |e| {
        matches!(e, ServerEvent::QuestionClosed { .. })
    })
    .await;
    match closed {
        ServerEvent::QuestionClosed { correct_option, results, .. } => {
            assert_eq!(correct_option, 1);
            assert_eq!(results.len(), 2);
        }
        _ => unreachable!(),
    }

    let board = recv_until(&mut guest, |e| {
        matches!(e, ServerEvent::Leaderboard { .. })
    })
    .await;
    match board {
        ServerEvent::Leaderboard { version, entries } => {
            assert!(version >= 1);
            assert_eq!(entries[0].participant_id, host_id);
            assert!(entries[0].score > entries[1].score);
        }
        _ => unreachable!(),
    }

    let completed = recv_until(&mut guest, |e| {
        matches!(e, ServerEvent::SessionCompleted { .. })
    })
    .await;
    match completed {
        ServerEvent::SessionCompleted { final_leaderboard, answer_log } => {
            assert_eq!(final_leaderboard.len(), 2);
            assert_eq!(final_leaderboard[0].participant_id, host_id);
            assert_eq!(answer_log.len(), 1);
            assert_eq!(answer_log[0].results.len(), 2);
        }
        _ => unreachable!(),
    }
}
