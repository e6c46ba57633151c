//! Connection layer for Crush Party.
//!
//! The [`Transport`] and [`Connection`] traits hide the socket library from
//! the rest of the server: the orchestrator only ever sees framed byte
//! payloads tagged with a [`ConnectionId`].
//!
//! # Feature Flags
//!
//! - `websocket` (default): browser WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Opaque identifier for one live connection.
///
/// A user that reconnects gets a fresh id; rooms use it to address the
/// host's connection and to notice stale membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Source of new browser connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Resolves once a peer has connected and finished any upgrade.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Bound address; with port 0 this is where the OS put us.
    fn local_addr(&self) -> Result<std::net::SocketAddr, Self::Error>;
}

/// One player's socket, moving whole frames in both directions.
///
/// The handler reads and writes from one `select!` loop, so an
/// implementation must keep the read and write halves independent.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Next frame, or `Ok(None)` once the peer hung up.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Idempotent.
    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;
}
