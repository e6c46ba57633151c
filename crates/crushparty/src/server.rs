//! `PartyServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → session → room.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crushparty_protocol::{Codec, JsonCodec};
use crushparty_room::{GameConfig, QuestionProvider, RoomRegistry};
use crushparty_session::{Authenticator, UserRegistry};
use crushparty_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::PartyError;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A, P, C> {
    pub(crate) users: Mutex<UserRegistry>,
    pub(crate) rooms: Mutex<RoomRegistry<P>>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
    /// Origin of every `server_time` and envelope `timestamp`.
    pub(crate) started: Instant,
}

impl<A, P, C> ServerState<A, P, C> {
    pub(crate) fn now_millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Builder for configuring and starting a Crush Party server.
///
/// # Example
///
/// ```rust,ignore
/// use crushparty::prelude::*;
///
/// let server = PartyServerBuilder::new()
///     .bind("0.0.0.0:3000")
///     .game_config(GameConfig::default())
///     .build(DevAuthenticator, StaticQuestionBank::from_json(QUESTIONS)?)
///     .await?;
/// server.run().await
/// ```
#[derive(Debug, Clone)]
pub struct PartyServerBuilder {
    bind_addr: String,
    game_config: GameConfig,
    idle_timeout: Duration,
}

impl PartyServerBuilder {
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            game_config: GameConfig::default(),
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn game_config(mut self, config: GameConfig) -> Self {
        self.game_config = config;
        self
    }

    /// Connections silent for this long are dropped. Clients keep alive
    /// with `heartbeat`.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Binds the listener and assembles the server with the given
    /// authenticator and question provider.
    ///
    /// Uses `JsonCodec` over `WebSocketTransport`.
    pub async fn build<A, P>(self, auth: A, provider: P) -> Result<PartyServer<A, P, JsonCodec>, PartyError>
    where
        A: Authenticator,
        P: QuestionProvider,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            users: Mutex::new(UserRegistry::new()),
            rooms: Mutex::new(RoomRegistry::new(self.game_config, provider)),
            auth,
            codec: JsonCodec,
            idle_timeout: self.idle_timeout,
            started: Instant::now(),
        });

        Ok(PartyServer { transport, state })
    }
}

impl Default for PartyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Crush Party server. Call [`run()`](Self::run) to start
/// accepting connections.
pub struct PartyServer<A, P, C> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, P, C>>,
}

impl<A, P, C> PartyServer<A, P, C>
where
    A: Authenticator,
    P: QuestionProvider,
    C: Codec,
{
    pub fn local_addr(&self) -> Result<SocketAddr, PartyError> {
        Ok(self.transport.local_addr()?)
    }

    /// Number of users with a live, authenticated connection.
    pub async fn connected_users(&self) -> usize {
        self.state.users.lock().await.len()
    }

    pub async fn room_count(&self) -> usize {
        self.state.rooms.lock().await.room_count()
    }

    /// Runs the accept loop until the process ends, spawning one handler
    /// task per connection.
    pub async fn run(mut self) -> Result<(), PartyError> {
        let addr = self.transport.local_addr()?;
        tracing::info!(%addr, "party server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
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
