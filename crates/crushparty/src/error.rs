//! Unified error type for the Crush Party server.

use crushparty_protocol::ProtocolError;
use crushparty_room::RoomError;
use crushparty_session::SessionError;
use crushparty_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum PartyError {
    /// Connection, send, receive or accept failures.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Frames that could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Handshake authentication and connection bookkeeping.
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Room(#[from] RoomError),
}

impl PartyError {
    /// The code sent to a client in an `error` event.
    pub fn status_code(&self) -> u16 {
        match self {
            PartyError::Transport(_) => 500,
            PartyError::Protocol(_) => 400,
            PartyError::Session(SessionError::AuthFailed(_)) => 401,
            PartyError::Session(SessionError::AlreadyConnected(_)) => 409,
            PartyError::Session(SessionError::NotFound(_)) => 404,
            PartyError::Room(err) => err.status_code(),
        }
    }
}
