//! Identity and connection records.

use std::time::Instant;

use crushparty_protocol::{ConnectionId, UserId};

/// Who a connection belongs to, as vouched for by the [`Authenticator`].
///
/// [`Authenticator`]: crate::Authenticator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
    /// Name of the avatar picked at sign-up; rendered by the client.
    pub avatar_name: String,
}

impl Identity {
    pub fn new(user_id: UserId, username: impl Into<String>, avatar_name: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            avatar_name: avatar_name.into(),
        }
    }
}

/// A live, authenticated connection.
#[derive(Debug, Clone)]
pub struct RegisteredUser {
    pub identity: Identity,
    pub connection_id: ConnectionId,
    pub connected_at: Instant,
}

impl RegisteredUser {
    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }
}
