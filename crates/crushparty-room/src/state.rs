//! Room and player state owned by a room actor.

use std::collections::HashSet;

use crushparty_protocol::{ConnectionId, CrushId, Phase, RoomId, RoomView, Standing, UserId, UserView};
use crushparty_session::Identity;

use crate::trivia::QuestionSet;
use crate::voting::Ballot;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A seated player.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: UserId,
    pub username: String,
    pub avatar_name: String,
    pub connection_id: ConnectionId,
    pub ready: bool,
    pub score: u32,
    /// Index of the question this player is currently answering.
    pub current_answer_index: usize,
    /// False after a mid-game disconnect. The seat and score stay until
    /// the room returns to the lobby.
    pub connected: bool,
}

impl User {
    pub fn new(identity: &Identity, connection_id: ConnectionId) -> Self {
        Self {
            user_id: identity.user_id,
            username: identity.username.clone(),
            avatar_name: identity.avatar_name.clone(),
            connection_id,
            ready: false,
            score: 0,
            current_answer_index: 0,
            connected: true,
        }
    }

    pub fn view(&self) -> UserView {
        UserView {
            user_id: self.user_id,
            username: self.username.clone(),
            avatar_name: self.avatar_name.clone(),
            ready: self.ready,
            score: self.score,
            connected: self.connected,
        }
    }

    /// Back to the state of a fresh lobby seat.
    pub(crate) fn reset_for_lobby(&mut self) {
        self.ready = false;
        self.score = 0;
        self.current_answer_index = 0;
    }
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// One logical game session inside a room.
#[derive(Debug, Default)]
pub struct GameState {
    pub phase: Phase,
    /// Set when voting starts; a room that returns to the lobby starts a
    /// fresh `GameState`.
    pub game_active: bool,
    /// 0, 1 or 2.
    pub trivia_round_index: u8,
    /// The crush that won the vote.
    pub selected_topic: Option<CrushId>,
    /// Questions of the running trivia round, once the provider answered.
    pub round: Option<QuestionSet>,
    /// Standings at the previous phase boundary, for the lounge narrative.
    pub boundary_standings: Vec<Standing>,
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Room {
    pub room_id: RoomId,
    pub host_user_id: UserId,
    pub host_connection_id: ConnectionId,
    pub host_display_name: String,
    /// Seated players in join order.
    pub users: Vec<User>,
    pub kicked_user_ids: HashSet<UserId>,
    pub game: GameState,
    pub ballot: Ballot,
}

impl Room {
    /// A fresh lobby with `host` in the first seat.
    pub fn new(room_id: RoomId, host: &Identity, connection_id: ConnectionId) -> Self {
        Self {
            room_id,
            host_user_id: host.user_id,
            host_connection_id: connection_id,
            host_display_name: host.username.clone(),
            users: vec![User::new(host, connection_id)],
            kicked_user_ids: HashSet::new(),
            game: GameState::default(),
            ballot: Ballot::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.game.phase
    }

    pub fn user(&self, user_id: UserId) -> Option<&User> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    pub fn user_mut(&mut self, user_id: UserId) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.user_id == user_id)
    }

    pub fn is_member(&self, user_id: UserId) -> bool {
        self.user(user_id).is_some()
    }

    pub fn is_host(&self, user_id: UserId) -> bool {
        self.host_user_id == user_id
    }

    /// Removes a seat, keeping the join order of everyone else.
    pub fn remove_user(&mut self, user_id: UserId) -> Option<User> {
        let idx = self.users.iter().position(|u| u.user_id == user_id)?;
        Some(self.users.remove(idx))
    }

    pub fn connected_users(&self) -> impl Iterator<Item = &User> {
        self.users.iter().filter(|u| u.connected)
    }

    pub fn connected_count(&self) -> usize {
        self.connected_users().count()
    }

    /// Hands the host role to `user_id`. The caller checks membership.
    pub(crate) fn set_host(&mut self, user_id: UserId) {
        if let Some(user) = self.users.iter().find(|u| u.user_id == user_id) {
            self.host_user_id = user.user_id;
            self.host_connection_id = user.connection_id;
            self.host_display_name = user.username.clone();
        }
    }

    /// True when every connected non-host player is ready. Vacuously true
    /// for a host alone in the lobby.
    pub fn all_guests_ready(&self) -> bool {
        self.connected_users()
            .filter(|u| u.user_id != self.host_user_id)
            .all(|u| u.ready)
    }

    pub fn view(&self) -> RoomView {
        RoomView {
            room_id: self.room_id,
            host_user_id: self.host_user_id,
            host_display_name: self.host_display_name.clone(),
            phase: self.game.phase,
            game_active: self.game.game_active,
            trivia_round_index: self.game.trivia_round_index,
            users: self.roster(),
        }
    }

    pub fn roster(&self) -> Vec<UserView> {
        self.users.iter().map(User::view).collect()
    }

    /// Players the host may kick: everyone seated except the host.
    pub fn kick_roster(&self) -> Vec<UserView> {
        self.users
            .iter()
            .filter(|u| u.user_id != self.host_user_id)
            .map(User::view)
            .collect()
    }
}
