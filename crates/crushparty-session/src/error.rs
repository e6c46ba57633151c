use crushparty_protocol::{ConnectionId, UserId};

/// Errors from authentication and connection bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token was rejected by the [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The user already has a live connection; a second tab must close the
    /// first one before it can play.
    #[error("user {0} is already connected")]
    AlreadyConnected(UserId),

    /// No registered user on this connection.
    #[error("no user registered on {0}")]
    NotFound(ConnectionId),
}
