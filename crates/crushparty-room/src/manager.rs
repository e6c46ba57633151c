//! Room registry: creates, tracks, and routes players to rooms.
//!
//! Operations that talk to a room actor come in two halves so callers can
//! release the registry lock while the actor answers: a synchronous
//! `begin_*` that validates and hands back a cloned [`RoomHandle`], and a
//! `commit_*`/`finish_*` that records the result. The `async` methods
//! (`join_room`, `leave_room`, ...) compose both halves for callers that
//! own the registry outright.

use std::collections::HashMap;
use std::sync::Arc;

use crushparty_protocol::{RoomId, RoomSummary, UserId};
use tokio::sync::mpsc;

use crate::config::GameConfig;
use crate::machine::{JoinOutcome, LeaveOutcome, RoomEvent, RoomInfo};
use crate::room::{spawn_room, Member, RoomHandle, SeatRelease};
use crate::trivia::QuestionProvider;
use crate::RoomError;

/// Default command channel size for room actors.
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Where a player sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Seat {
    room_id: RoomId,
    /// False once the player left a running game. The room keeps their
    /// score until it returns to the lobby, and the seat blocks joining
    /// anywhere else until then.
    live: bool,
}

/// Owns every live room of one server and the player → room index.
///
/// A player is in at most one room at a time, counting seats held for
/// players who dropped out of a running game. Instances are independent;
/// room ids are allocated per registry.
pub struct RoomRegistry<P> {
    rooms: HashMap<RoomId, RoomHandle>,
    seats: HashMap<UserId, Seat>,
    releases_tx: mpsc::UnboundedSender<SeatRelease>,
    releases_rx: mpsc::UnboundedReceiver<SeatRelease>,
    next_room_id: u64,
    config: Arc<GameConfig>,
    provider: Arc<P>,
}

impl<P> RoomRegistry<P>
where
    P: QuestionProvider + Send + Sync + 'static,
{
    pub fn new(config: GameConfig, provider: P) -> Self {
        Self::with_shared(Arc::new(config), Arc::new(provider))
    }

    /// Builds a registry around an already shared config and provider.
    /// The config is validated on the way in.
    pub fn with_shared(config: Arc<GameConfig>, provider: Arc<P>) -> Self {
        let config = Arc::new(GameConfig::clone(&config).validated());
        let (releases_tx, releases_rx) = mpsc::unbounded_channel();
        Self {
            rooms: HashMap::new(),
            seats: HashMap::new(),
            releases_tx,
            releases_rx,
            next_room_id: 1,
            config,
            provider,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Opens a room with `host` in the first seat.
    ///
    /// # Errors
    /// [`RoomError::InAnotherRoom`] if the host is seated elsewhere, or
    /// still holds a seat in a game they dropped out of.
    pub fn create_room(&mut self, host: Member) -> Result<RoomId, RoomError> {
        self.drain_releases();
        let user_id = host.user_id();
        if let Some(seat) = self.seats.get(&user_id) {
            return Err(RoomError::InAnotherRoom(user_id, seat.room_id));
        }

        let room_id = RoomId(self.next_room_id);
        self.next_room_id += 1;
        let handle = spawn_room(
            room_id,
            host,
            Arc::clone(&self.config),
            Arc::clone(&self.provider),
            self.releases_tx.clone(),
            DEFAULT_CHANNEL_SIZE,
        );
        self.rooms.insert(room_id, handle);
        self.seats.insert(user_id, Seat { room_id, live: true });
        tracing::info!(%room_id, host = %user_id, "room created");
        Ok(room_id)
    }

    /// Checks that `user_id` may join `room_id` and returns the room's
    /// handle. Finish with [`commit_join`](Self::commit_join) once the
    /// room accepted them.
    pub fn begin_join(&mut self, room_id: RoomId, user_id: UserId) -> Result<RoomHandle, RoomError> {
        self.drain_releases();
        let handle = self.rooms.get(&room_id).ok_or(RoomError::NotFound(room_id))?;
        if let Some(seat) = self.seats.get(&user_id) {
            if seat.room_id != room_id {
                return Err(RoomError::InAnotherRoom(user_id, seat.room_id));
            }
        }
        Ok(handle.clone())
    }

    /// Records a seat the room accepted. Ignored if the room has been
    /// removed in the meantime.
    pub fn commit_join(&mut self, room_id: RoomId, user_id: UserId) {
        if self.rooms.contains_key(&room_id) {
            self.seats.insert(user_id, Seat { room_id, live: true });
        }
    }

    /// Seats a player in a room.
    ///
    /// The room must exist and the player must not be seated elsewhere;
    /// the room actor then checks game state, bans and capacity.
    pub async fn join_room(&mut self, room_id: RoomId, member: Member) -> Result<JoinOutcome, RoomError> {
        let user_id = member.user_id();
        let handle = self.begin_join(room_id, user_id)?;
        let outcome = handle.join(member).await?;
        self.commit_join(room_id, user_id);
        Ok(outcome)
    }

    /// Marks a player as leaving and returns their room. The handle is
    /// `None` when the room is already gone. Finish with
    /// [`finish_leave`](Self::finish_leave).
    pub fn begin_leave(&mut self, user_id: UserId) -> Result<(RoomId, Option<RoomHandle>), RoomError> {
        let seat = self
            .seats
            .get_mut(&user_id)
            .filter(|s| s.live)
            .ok_or(RoomError::NotInRoom(user_id))?;
        seat.live = false;
        let room_id = seat.room_id;
        Ok((room_id, self.rooms.get(&room_id).cloned()))
    }

    /// Applies the room's answer to a leave: the seat is kept while the
    /// game runs and dropped otherwise, and an emptied room is removed.
    pub fn finish_leave(
        &mut self,
        user_id: UserId,
        room_id: RoomId,
        result: Result<LeaveOutcome, RoomError>,
    ) -> Result<LeaveOutcome, RoomError> {
        let gone = LeaveOutcome {
            room_empty: true,
            seat_kept: false,
        };
        match result {
            Ok(outcome) if outcome.room_empty => {
                self.forget_room(room_id);
                Ok(outcome)
            }
            Ok(outcome) => {
                if !outcome.seat_kept {
                    self.drop_seat(user_id, room_id);
                }
                Ok(outcome)
            }
            Err(RoomError::Unavailable(_)) => {
                self.forget_room(room_id);
                Ok(gone)
            }
            Err(err) => {
                self.drop_seat(user_id, room_id);
                Err(err)
            }
        }
    }

    /// Takes a player out of their room, removing the room once nobody is
    /// left in it. Leaving a running game keeps a disconnected seat until
    /// the room returns to the lobby.
    pub async fn leave_room(&mut self, user_id: UserId) -> Result<LeaveOutcome, RoomError> {
        let (room_id, handle) = self.begin_leave(user_id)?;
        let result = match handle {
            Some(handle) => handle.leave(user_id).await,
            None => Err(RoomError::Unavailable(room_id)),
        };
        self.finish_leave(user_id, room_id, result)
    }

    /// Drops a player's seat without telling the room. Used once the room
    /// itself removed them (a kick).
    pub fn release_user(&mut self, user_id: UserId) -> Option<RoomId> {
        self.seats.remove(&user_id).map(|s| s.room_id)
    }

    /// Handle of the room a player is actively seated in.
    pub fn live_handle(&self, user_id: UserId) -> Result<RoomHandle, RoomError> {
        let room_id = self.room_of(user_id).ok_or(RoomError::NotInRoom(user_id))?;
        self.rooms.get(&room_id).cloned().ok_or(RoomError::NotFound(room_id))
    }

    /// Routes a player action to their current room.
    pub async fn route_event(&self, user_id: UserId, event: RoomEvent) -> Result<(), RoomError> {
        self.live_handle(user_id)?.send_event(user_id, event).await
    }

    /// The room a player is actively seated in. Seats held after leaving a
    /// running game don't count.
    pub fn room_of(&self, user_id: UserId) -> Option<RoomId> {
        self.seats.get(&user_id).filter(|s| s.live).map(|s| s.room_id)
    }

    /// The room holding any seat for the player, live or not.
    pub fn seat_of(&self, user_id: UserId) -> Option<RoomId> {
        self.seats.get(&user_id).map(|s| s.room_id)
    }

    /// A cloned handle, for talking to a room without holding the
    /// registry lock.
    pub fn handle_for(&self, room_id: RoomId) -> Option<RoomHandle> {
        self.rooms.get(&room_id).cloned()
    }

    pub fn room_handles(&self) -> Vec<RoomHandle> {
        self.rooms.values().cloned().collect()
    }

    pub async fn lookup_room(&self, room_id: RoomId) -> Option<RoomInfo> {
        self.handle_for(room_id)?.get_info().await.ok()
    }

    /// Every live room, ordered by id.
    pub async fn list_rooms(&self) -> Vec<RoomSummary> {
        summarize_rooms(&self.room_handles()).await
    }

    /// Shuts a room down and unseats everyone in it.
    pub async fn destroy_room(&mut self, room_id: RoomId) -> Result<(), RoomError> {
        let handle = self.rooms.get(&room_id).cloned().ok_or(RoomError::NotFound(room_id))?;
        let _ = handle.shutdown().await;
        self.forget_room(room_id);
        Ok(())
    }

    fn forget_room(&mut self, room_id: RoomId) {
        self.rooms.remove(&room_id);
        self.seats.retain(|_, seat| seat.room_id != room_id);
        tracing::info!(%room_id, "room removed");
    }

    /// Removes a seat if it still points at `room_id`.
    fn drop_seat(&mut self, user_id: UserId, room_id: RoomId) {
        if self.seats.get(&user_id).is_some_and(|s| s.room_id == room_id) {
            self.seats.remove(&user_id);
        }
    }

    /// Frees the disconnected seats rooms have reported as dropped.
    fn drain_releases(&mut self) {
        while let Ok(release) = self.releases_rx.try_recv() {
            for user_id in release.user_ids {
                let stale = self
                    .seats
                    .get(&user_id)
                    .is_some_and(|s| s.room_id == release.room_id && !s.live);
                if stale {
                    tracing::debug!(room_id = %release.room_id, %user_id, "seat released");
                    self.seats.remove(&user_id);
                }
            }
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.keys().copied().collect();
        ids.sort();
        ids
    }
}

/// Summaries of the given rooms, ordered by id. Rooms that fail to answer
/// (shutting down) are skipped.
pub async fn summarize_rooms(handles: &[RoomHandle]) -> Vec<RoomSummary> {
    let mut summaries = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Ok(info) = handle.get_info().await {
            summaries.push(info.summary());
        }
    }
    summaries.sort_by_key(|s| s.room_id);
    summaries
}
