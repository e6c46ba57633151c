use std::net::SocketAddr;

use crate::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The listener itself failed (accept or address lookup).
    #[error("listener error: {0}")]
    Listener(#[source] std::io::Error),

    /// A TCP peer connected but never completed the WebSocket upgrade.
    #[error("websocket upgrade from {peer} failed: {reason}")]
    Upgrade { peer: SocketAddr, reason: String },

    #[error("{0} is closed")]
    Closed(ConnectionId),

    #[error("write to {id} failed: {reason}")]
    Write { id: ConnectionId, reason: String },

    #[error("read from {id} failed: {reason}")]
    Read { id: ConnectionId, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_error_names_connection() {
        let err = TransportError::Closed(ConnectionId::new(9));
        assert_eq!(err.to_string(), "conn-9 is closed");
    }

    #[test]
    fn test_bind_error_keeps_io_source() {
        use std::error::Error;
        let err = TransportError::Bind {
            addr: "0.0.0.0:80".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().starts_with("cannot listen on 0.0.0.0:80"));
        assert!(err.source().is_some());
    }
}
