//! `BereanServer` builder and accept loop.
//!
//! Ties the layers together: websocket transport → protocol codec →
//! room registry → session engine. One connection-handler task per
//! client, one actor task per room, one background sweeper.

use std::sync::Arc;
use std::time::{Duration, Instant};

use berean_engine::{FixedBank, QuestionBank};
use berean_protocol::{Codec, JsonCodec};
use berean_room::RoomRegistry;

use crate::handler::handle_connection;
use crate::ws::WsListener;
use crate::BereanError;

/// Shared server state handed to every connection handler.
pub(crate) struct ServerState<B: QuestionBank, C: Codec> {
    pub(crate) registry: Arc<RoomRegistry<B>>,
    pub(crate) codec: C,
    /// Server start instant; wire timestamps are milliseconds since
    /// this point.
    pub(crate) started: Instant,
}

/// Builder for configuring and starting a Berean server.
///
/// # Example
///
/// ```rust,ignore
/// let bank = Arc::new(FixedBank::new(questions));
/// let server = BereanServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(bank)
///     .await?;
/// server.run().await
/// ```
pub struct BereanServerBuilder {
    bind_addr: String,
    sweep_interval: Duration,
}

impl BereanServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            sweep_interval: Duration::from_secs(60),
        }
    }

    /// Sets the address to bind to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets how often the registry sweeps for idle rooms.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Builds the server over the given question bank, using the JSON
    /// codec.
    pub async fn build<B: QuestionBank>(
        self,
        bank: Arc<B>,
    ) -> Result<BereanServer<B, JsonCodec>, BereanError> {
        let listener = WsListener::bind(&self.bind_addr).await?;
        let registry = Arc::new(RoomRegistry::new(bank));

        Ok(BereanServer {
            listener,
            state: Arc::new(ServerState {
                registry,
                codec: JsonCodec,
                started: Instant::now(),
            }),
            sweep_interval: self.sweep_interval,
        })
    }
}

impl Default for BereanServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Berean quiz server.
pub struct BereanServer<B: QuestionBank = FixedBank, C: Codec = JsonCodec> {
    listener: WsListener,
    state: Arc<ServerState<B, C>>,
    sweep_interval: Duration,
}

impl BereanServer {
    pub fn builder() -> BereanServerBuilder {
        BereanServerBuilder::new()
    }
}

impl<B, C> BereanServer<B, C>
where
    B: QuestionBank,
    C: Codec + Clone + 'static,
{
    /// The local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    ///
    /// Spawns the idle-room sweeper, then accepts connections and
    /// hands each its own task. A connection ending with an error is
    /// logged, never fatal to the server.
    pub async fn run(mut self) -> Result<(), BereanError> {
        let _sweeper = Arc::clone(&self.state.registry)
            .spawn_sweeper(self.sweep_interval);
        tracing::info!("Berean server running");

        loop {
            match self.listener.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
