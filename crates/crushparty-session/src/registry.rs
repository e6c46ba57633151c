//! The user registry: which authenticated user sits behind which live
//! connection.
//!
//! # Concurrency note
//!
//! `UserRegistry` is a plain pair of `HashMap`s. The server owns one behind
//! a mutex; every operation is O(1) and never awaits, so the lock is held
//! only for map mutation.

use std::collections::HashMap;
use std::time::Instant;

use crushparty_protocol::{ConnectionId, UserId};

use crate::{Identity, RegisteredUser, SessionError};

/// Index of live connections, in both directions.
///
/// ```text
/// register_user() ──→ [live] ──→ unregister_connection()
///        │
///        └─ AlreadyConnected if the user is live on another connection
/// ```
#[derive(Debug, Default)]
pub struct UserRegistry {
    by_connection: HashMap<ConnectionId, RegisteredUser>,
    by_user: HashMap<UserId, ConnectionId>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `identity` is now live on `connection_id`.
    ///
    /// Re-registering the same connection refreshes its identity.
    ///
    /// # Errors
    /// [`SessionError::AlreadyConnected`] if the user is live on a
    /// different connection.
    pub fn register_user(
        &mut self,
        connection_id: ConnectionId,
        identity: Identity,
    ) -> Result<&RegisteredUser, SessionError> {
        let user_id = identity.user_id;
        if let Some(&existing) = self.by_user.get(&user_id) {
            if existing != connection_id {
                return Err(SessionError::AlreadyConnected(user_id));
            }
        }
        if let Some(previous) = self.by_connection.get(&connection_id) {
            if previous.user_id() != user_id {
                self.by_user.remove(&previous.user_id());
            }
        }

        self.by_user.insert(user_id, connection_id);
        let entry = self
            .by_connection
            .entry(connection_id)
            .insert_entry(RegisteredUser {
                identity,
                connection_id,
                connected_at: Instant::now(),
            })
            .into_mut();

        tracing::info!(%user_id, %connection_id, "user registered");
        Ok(entry)
    }

    /// Forgets a connection. Returns the user that was on it, if any.
    pub fn unregister_connection(&mut self, connection_id: ConnectionId) -> Option<RegisteredUser> {
        let registered = self.by_connection.remove(&connection_id)?;
        if self.by_user.get(&registered.user_id()) == Some(&connection_id) {
            self.by_user.remove(&registered.user_id());
        }
        tracing::info!(user_id = %registered.user_id(), %connection_id, "user unregistered");
        Some(registered)
    }

    pub fn lookup_user_by_connection(&self, connection_id: ConnectionId) -> Option<&RegisteredUser> {
        self.by_connection.get(&connection_id)
    }

    pub fn lookup_connection_by_user_id(&self, user_id: UserId) -> Option<ConnectionId> {
        self.by_user.get(&user_id).copied()
    }

    /// Every live user, ordered by user id so listings are stable.
    pub fn list_users(&self) -> Vec<&RegisteredUser> {
        let mut users: Vec<_> = self.by_connection.values().collect();
        users.sort_by_key(|u| u.user_id());
        users
    }

    pub fn len(&self) -> usize {
        self.by_connection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_connection.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(id: u64) -> UserId {
        UserId(id)
    }

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn identity(id: u64, name: &str) -> Identity {
        Identity::new(uid(id), name, "fox")
    }

    // =====================================================================
    // register_user()
    // =====================================================================

    #[test]
    fn test_register_user_new_user_is_indexed_both_ways() {
        let mut reg = UserRegistry::new();

        let entry = reg.register_user(conn(10), identity(1, "ava")).unwrap();
        assert_eq!(entry.identity.username, "ava");
        assert_eq!(entry.connection_id, conn(10));

        assert_eq!(reg.lookup_connection_by_user_id(uid(1)), Some(conn(10)));
        assert_eq!(reg.lookup_user_by_connection(conn(10)).unwrap().user_id(), uid(1));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_register_user_second_live_connection_returns_already_connected() {
        let mut reg = UserRegistry::new();
        reg.register_user(conn(10), identity(1, "ava")).unwrap();

        let err = reg.register_user(conn(11), identity(1, "ava")).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyConnected(u) if u == uid(1)));
        assert_eq!(reg.lookup_connection_by_user_id(uid(1)), Some(conn(10)));
        assert!(reg.lookup_user_by_connection(conn(11)).is_none());
    }

    #[test]
    fn test_register_user_same_connection_refreshes_identity() {
        let mut reg = UserRegistry::new();
        reg.register_user(conn(10), identity(1, "ava")).unwrap();

        reg.register_user(conn(10), identity(1, "ava2")).unwrap();
        assert_eq!(reg.lookup_user_by_connection(conn(10)).unwrap().identity.username, "ava2");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_register_user_after_unregister_allows_new_connection() {
        let mut reg = UserRegistry::new();
        reg.register_user(conn(10), identity(1, "ava")).unwrap();
        reg.unregister_connection(conn(10));

        reg.register_user(conn(12), identity(1, "ava")).unwrap();
        assert_eq!(reg.lookup_connection_by_user_id(uid(1)), Some(conn(12)));
    }

    // =====================================================================
    // unregister_connection()
    // =====================================================================

    #[test]
    fn test_unregister_connection_returns_user_and_clears_indexes() {
        let mut reg = UserRegistry::new();
        reg.register_user(conn(10), identity(1, "ava")).unwrap();

        let gone = reg.unregister_connection(conn(10)).unwrap();
        assert_eq!(gone.user_id(), uid(1));
        assert!(reg.lookup_connection_by_user_id(uid(1)).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_unregister_connection_unknown_returns_none() {
        let mut reg = UserRegistry::new();
        assert!(reg.unregister_connection(conn(99)).is_none());
    }

    // =====================================================================
    // lookups
    // =====================================================================

    #[test]
    fn test_lookup_unknown_user_returns_none() {
        let reg = UserRegistry::new();
        assert!(reg.lookup_connection_by_user_id(uid(5)).is_none());
        assert!(reg.lookup_user_by_connection(conn(5)).is_none());
    }

    #[test]
    fn test_list_users_sorted_by_user_id() {
        let mut reg = UserRegistry::new();
        reg.register_user(conn(1), identity(3, "cat")).unwrap();
        reg.register_user(conn(2), identity(1, "ava")).unwrap();
        reg.register_user(conn(3), identity(2, "ben")).unwrap();

        let names: Vec<_> = reg
            .list_users()
            .into_iter()
            .map(|u| u.identity.username.as_str())
            .collect();
        assert_eq!(names, vec!["ava", "ben", "cat"]);
    }
}
