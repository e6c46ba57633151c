//! WebSocket transport built on `tokio-tungstenite`.
//!
//! Each accepted socket is split into a sink and a stream guarded by
//! separate locks, so a task parked in [`Connection::recv`] never blocks a
//! broadcast going out on the same connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Transport, TransportError};

type WsStream = WebSocketStream<TcpStream>;

/// Listens for browser clients and upgrades them to WebSocket connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    next_connection_id: AtomicU64,
}

impl WebSocketTransport {
    /// Binds a listener to `addr` (e.g. `"0.0.0.0:3000"` or `"127.0.0.1:0"`).
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| TransportError::Bind {
            addr: addr.to_owned(),
            source,
        })?;
        tracing::info!(addr, "websocket transport listening");
        Ok(Self {
            listener,
            next_connection_id: AtomicU64::new(1),
        })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Listener)?;

        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| TransportError::Upgrade {
                peer: addr,
                reason: e.to_string(),
            })?;

        let id = ConnectionId::new(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, "accepted websocket connection");

        Ok(WebSocketConnection::new(id, addr, ws))
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        self.listener.local_addr().map_err(TransportError::Listener)
    }
}

/// One upgraded browser connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    peer: SocketAddr,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    closed: AtomicBool,
}

impl WebSocketConnection {
    fn new(id: ConnectionId, peer: SocketAddr, ws: WsStream) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id,
            peer,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed: AtomicBool::new(false),
        }
    }

    /// Remote address of the browser.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    /// UTF-8 payloads (every JSON envelope) go out as text frames so
    /// browsers can hand them straight to `JSON.parse`.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed(self.id));
        }
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        self.sink
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| TransportError::Write {
                id: self.id,
                reason: e.to_string(),
            })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // ping/pong are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(TransportError::Read {
                        id: self.id,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(id = %self.id, peer = %self.peer, "closing websocket connection");
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| TransportError::Write {
                id: self.id,
                reason: e.to_string(),
            })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
