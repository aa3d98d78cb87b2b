//! WebSocket transport: listener plus split connections.
//!
//! Each accepted socket is split into halves. The read half stays with
//! the connection handler; the write half runs as a small pump task fed
//! by an unbounded channel, so room events can be queued for a client
//! without anyone awaiting the socket — a slow reader never blocks the
//! room's fan-out or the handler's own request loop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitStream, StreamExt};
use futures_util::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Counter for connection ids (log correlation only).
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// Errors from the websocket transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// Receiving from the peer failed.
    #[error("receive failed: {0}")]
    Receive(String),
}

/// Listens for incoming websocket connections.
pub struct WsListener {
    listener: TcpListener,
}

impl WsListener {
    /// Binds to `addr`.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::Accept)?;
        tracing::info!(addr, "websocket listener bound");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts and upgrades the next connection.
    pub async fn accept(&mut self) -> Result<WsConnection, TransportError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;

        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| TransportError::Receive(e.to_string()))?;

        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(conn = id, %peer, "websocket connection accepted");

        Ok(WsConnection::new(id, ws))
    }
}

/// One client connection: an owned read half and a channel into the
/// write pump.
pub struct WsConnection {
    id: u64,
    reader: SplitStream<WsStream>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl WsConnection {
    fn new(id: u64, ws: WsStream) -> Self {
        let (mut sink, reader) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        // Write pump: drains the queue into the socket, then closes it.
        // Ends when every sender handle is dropped.
        tokio::spawn(async move {
            while let Some(data) = outbound_rx.recv().await {
                if sink.send(Message::Binary(data.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
            tracing::debug!(conn = id, "write pump stopped");
        });

        Self {
            id,
            reader,
            outbound,
        }
    }

    /// Connection id for log correlation.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queues bytes for delivery. Returns `false` once the pump is gone.
    pub fn send(&self, data: Vec<u8>) -> bool {
        self.outbound.send(data).is_ok()
    }

    /// A second handle into the write queue, for tasks that outlive
    /// individual calls (the event pump).
    pub fn sender(&self) -> mpsc::UnboundedSender<Vec<u8>> {
        self.outbound.clone()
    }

    /// Receives the next data frame. `Ok(None)` means the peer closed
    /// cleanly. Ping/pong frames are handled below this level and
    /// skipped here.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            match self.reader.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(TransportError::Receive(e.to_string()));
                }
            }
        }
    }
}
