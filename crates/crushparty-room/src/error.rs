//! Error types for the room layer.

use crushparty_protocol::{CrushId, RoomId, UserId};

/// Errors from room operations.
///
/// Every variant maps to an HTTP-style code via [`RoomError::status_code`]
/// so the server can forward it to the client as an `error` event.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room's game already started; joins reopen after it returns to
    /// the lobby.
    #[error("room {0} has a game in progress")]
    GameInProgress(RoomId),

    /// The user was kicked from this room.
    #[error("user {0} is banned from room {1}")]
    Banned(UserId, RoomId),

    /// A host-only action from someone who is not the host.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("room {0} is full")]
    RoomFull(RoomId),

    #[error("user {0} is not in a room")]
    NotInRoom(UserId),

    #[error("user {0} is already in room {1}")]
    InAnotherRoom(UserId, RoomId),

    #[error("unknown crush {0}")]
    UnknownCrush(CrushId),

    /// The action is not valid in the room's current phase.
    #[error("invalid room state: {0}")]
    InvalidState(String),

    /// Questions for the next round could not be fetched.
    #[error("question provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The room actor is gone or its queue is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}

impl RoomError {
    pub fn status_code(&self) -> u16 {
        match self {
            RoomError::UnknownCrush(_) => 400,
            RoomError::Banned(..) | RoomError::Unauthorized(_) => 403,
            RoomError::NotFound(_) | RoomError::NotInRoom(_) => 404,
            RoomError::GameInProgress(_)
            | RoomError::RoomFull(_)
            | RoomError::InAnotherRoom(..)
            | RoomError::InvalidState(_) => 409,
            RoomError::ProviderUnavailable(_) | RoomError::Unavailable(_) => 503,
        }
    }
}
