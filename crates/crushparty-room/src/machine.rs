//! The party game state machine.
//!
//! [`GameMachine`] owns a [`Room`] and applies one input at a time: a
//! join, a leave, a player event, a countdown tick, or a finished question
//! load. Each input returns a [`Step`], the notifications to deliver and
//! the side effects to run. The machine never touches sockets, clocks or
//! the question provider itself; the room actor does that with the step.
//!
//! ```text
//! Lobby ──start_voting──▶ Voting ──last vote──▶ Trivia(0) ──timer──▶ Lounge ──timer──▶ Trivia(1) …
//!                                                    Trivia(2) ──timer──▶ Victory ──return_to_lobby──▶ Lobby
//! ```

use std::sync::Arc;

use crushparty_protocol::{
    ConnectionId, CrushId, Difficulty, Phase, Recipient, RoomId, RoomSummary, ServerEvent, UserId,
};
use crushparty_session::Identity;
use tracing::{debug, info, warn};

use crate::config::{Category, Crush, GameConfig};
use crate::leaderboard::compute_standings;
use crate::narrative::{lounge_dialogue, victory_summary};
use crate::state::{GameState, Room, User};
use crate::trivia::{ProviderError, Question, QuestionSet};
use crate::voting::VoteOutcome;
use crate::RoomError;

/// Index of the final trivia round.
pub const LAST_ROUND: u8 = 2;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// A player action routed to their room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    StartVoting,
    CastVote { crush_id: CrushId },
    SetReady { ready: bool },
    SubmitAnswer { answer: String },
    KickUser { target: UserId },
    ReturnToLobby,
}

/// Which phase a countdown was armed for. A tick whose tag does not match
/// the room's current phase and round is stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTag {
    pub phase: Phase,
    pub round: u8,
}

/// Side effects the room actor runs after delivering a step's events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Ask the question provider for the round's questions.
    FetchRound {
        round: u8,
        category: Category,
        difficulty: Difficulty,
        count: usize,
    },
    ArmTimer { tag: PhaseTag, seconds: u32 },
    CancelTimer,
    /// Close a player's connection (after a kick).
    Disconnect { user_id: UserId, reason: String },
    /// Dropped players were unseated; they may sit down elsewhere now.
    ReleaseSeats { user_ids: Vec<UserId> },
    /// Nobody is left; stop the room.
    Teardown,
}

#[derive(Debug, Default)]
pub struct Step {
    pub outbound: Vec<(Recipient, ServerEvent)>,
    pub effects: Vec<Effect>,
}

impl Step {
    pub fn send(&mut self, to: Recipient, event: ServerEvent) {
        self.outbound.push((to, event));
    }

    pub fn effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.effects.is_empty()
    }

    /// Events addressed to exactly `recipient`, in order.
    pub fn events_for(&self, recipient: &Recipient) -> Vec<&ServerEvent> {
        self.outbound
            .iter()
            .filter(|(to, _)| to == recipient)
            .map(|(_, ev)| ev)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// Already seated; the snapshot was re-sent.
    AlreadyMember,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// The room has no connected players left and is shutting down.
    pub room_empty: bool,
    /// A game is running, so the player still holds a disconnected seat
    /// until the room returns to the lobby.
    pub seat_kept: bool,
}

/// Registry-facing facts about a room, for the lobby browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub host_display_name: String,
    pub phase: Phase,
    pub game_active: bool,
    pub player_count: usize,
    pub max_players: usize,
}

impl RoomInfo {
    pub fn is_joinable(&self) -> bool {
        !self.game_active && self.player_count < self.max_players
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.room_id,
            host_display_name: self.host_display_name.clone(),
            player_count: self.player_count,
            max_players: self.max_players,
            phase: self.phase,
            joinable: self.is_joinable(),
        }
    }
}

// ---------------------------------------------------------------------------
// GameMachine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct GameMachine {
    room: Room,
    config: Arc<GameConfig>,
}

impl GameMachine {
    /// Opens a lobby with `host` seated. The step greets the host.
    pub fn new(
        room_id: RoomId,
        host: &Identity,
        connection_id: ConnectionId,
        config: Arc<GameConfig>,
    ) -> (Self, Step) {
        let machine = Self {
            room: Room::new(room_id, host, connection_id),
            config,
        };
        let mut step = Step::default();
        machine.send_snapshot(&mut step, host.user_id);
        machine.send_host_panels(&mut step);
        (machine, step)
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room.room_id,
            host_display_name: self.room.host_display_name.clone(),
            phase: self.room.phase(),
            game_active: self.room.game.game_active,
            player_count: self.room.users.len(),
            max_players: self.config.max_players,
        }
    }

    fn current_tag(&self) -> PhaseTag {
        PhaseTag {
            phase: self.room.phase(),
            round: self.room.game.trivia_round_index,
        }
    }

    // =====================================================================
    // Membership
    // =====================================================================

    /// Seats a player.
    ///
    /// Checks, in order: game not active, not banned, not already seated
    /// (idempotent: refreshes the connection and re-sends the snapshot),
    /// free seat.
    pub fn join(
        &mut self,
        identity: &Identity,
        connection_id: ConnectionId,
    ) -> Result<(JoinOutcome, Step), RoomError> {
        let room_id = self.room.room_id;
        let user_id = identity.user_id;
        if self.room.game.game_active {
            return Err(RoomError::GameInProgress(room_id));
        }
        if self.room.kicked_user_ids.contains(&user_id) {
            return Err(RoomError::Banned(user_id, room_id));
        }

        let mut step = Step::default();
        if let Some(user) = self.room.user_mut(user_id) {
            user.connection_id = connection_id;
            if self.room.is_host(user_id) {
                self.room.host_connection_id = connection_id;
            }
            self.send_snapshot(&mut step, user_id);
            return Ok((JoinOutcome::AlreadyMember, step));
        }
        if self.room.users.len() >= self.config.max_players {
            return Err(RoomError::RoomFull(room_id));
        }

        let user = User::new(identity, connection_id);
        let view = user.view();
        self.room.users.push(user);
        info!(%room_id, %user_id, players = self.room.users.len(), "user joined");

        self.send_snapshot(&mut step, user_id);
        step.send(Recipient::AllExcept(user_id), ServerEvent::UserJoined { user: view });
        self.send_host_panels(&mut step);
        Ok((JoinOutcome::Joined, step))
    }

    /// Handles a player leaving or dropping.
    ///
    /// In the lobby the seat is freed. Once a game is running the seat is
    /// kept, score frozen, and marked disconnected; a pending vote is
    /// filled in as "no preference" so voting cannot stall.
    pub fn leave(&mut self, user_id: UserId) -> Result<(LeaveOutcome, Step), RoomError> {
        let room_id = self.room.room_id;
        let was_host = self.room.is_host(user_id);
        let mut step = Step::default();

        let seat_kept = self.room.phase().is_active();
        let departed_name = if seat_kept {
            let user = self
                .room
                .user_mut(user_id)
                .filter(|u| u.connected)
                .ok_or(RoomError::NotInRoom(user_id))?;
            user.connected = false;
            user.username.clone()
        } else {
            self.room
                .remove_user(user_id)
                .ok_or(RoomError::NotInRoom(user_id))?
                .username
        };
        info!(%room_id, %user_id, phase = %self.room.phase(), "user left");

        if self.room.connected_count() == 0 {
            info!(%room_id, "last player left, tearing down");
            step.effect(Effect::CancelTimer);
            step.effect(Effect::Teardown);
            return Ok((
                LeaveOutcome {
                    room_empty: true,
                    seat_kept,
                },
                step,
            ));
        }

        if was_host {
            self.migrate_host(&mut step, &departed_name);
        }
        step.send(
            Recipient::All,
            ServerEvent::RosterChanged {
                users: self.room.roster(),
                host_user_id: self.room.host_user_id,
            },
        );

        match self.room.phase() {
            Phase::Lobby => self.send_host_panels(&mut step),
            Phase::Voting => {
                if !self.room.ballot.has_voted(user_id) {
                    debug!(%room_id, %user_id, "casting no-preference vote for departed user");
                    self.room.ballot.cast(user_id, None);
                }
                self.check_ballot(&mut step);
            }
            _ => step.send(Recipient::Host, ServerEvent::KickRoster { users: self.room.kick_roster() }),
        }
        Ok((
            LeaveOutcome {
                room_empty: false,
                seat_kept,
            },
            step,
        ))
    }

    /// Hands the host role to the next connected player in join order.
    /// Returns false if nobody is left to take it.
    fn migrate_host(&mut self, step: &mut Step, previous_host_name: &str) -> bool {
        let previous = self.room.host_user_id;
        let Some(next) = self
            .room
            .connected_users()
            .find(|u| u.user_id != previous)
            .map(|u| u.user_id)
        else {
            return false;
        };
        self.room.set_host(next);
        info!(room_id = %self.room.room_id, from = %previous, to = %next, "host migrated");

        step.send(
            Recipient::User(next),
            ServerEvent::HostPromoted {
                previous_host_name: previous_host_name.to_owned(),
                phase: self.room.phase(),
            },
        );
        step.send(
            Recipient::All,
            ServerEvent::HostChanged {
                host_user_id: next,
                host_display_name: self.room.host_display_name.clone(),
            },
        );
        true
    }

    // =====================================================================
    // Player events
    // =====================================================================

    /// Applies a player action. Errors mutate nothing.
    pub fn handle_event(&mut self, user_id: UserId, event: RoomEvent) -> Result<Step, RoomError> {
        if !self.room.user(user_id).is_some_and(|u| u.connected) {
            return Err(RoomError::NotInRoom(user_id));
        }
        match event {
            RoomEvent::StartVoting => self.start_voting(user_id),
            RoomEvent::CastVote { crush_id } => self.cast_vote(user_id, crush_id),
            RoomEvent::SetReady { ready } => self.set_ready(user_id, ready),
            RoomEvent::SubmitAnswer { answer } => self.submit_answer(user_id, &answer),
            RoomEvent::KickUser { target } => self.kick(user_id, target),
            RoomEvent::ReturnToLobby => self.return_to_lobby(user_id),
        }
    }

    fn require_phase(&self, expected: Phase, action: &str) -> Result<(), RoomError> {
        let phase = self.room.phase();
        if phase == expected {
            Ok(())
        } else {
            Err(RoomError::InvalidState(format!("cannot {action} during {phase}")))
        }
    }

    fn start_voting(&mut self, user_id: UserId) -> Result<Step, RoomError> {
        if !self.room.is_host(user_id) {
            return Err(RoomError::Unauthorized("only the host can start the game".into()));
        }
        self.require_phase(Phase::Lobby, "start voting")?;

        let game = &mut self.room.game;
        game.phase = Phase::Voting;
        game.game_active = true;
        game.trivia_round_index = 0;
        game.selected_topic = None;
        game.round = None;
        self.room.ballot.clear();
        for user in &mut self.room.users {
            user.score = 0;
            user.current_answer_index = 0;
        }
        let standings = compute_standings(&self.room.users);
        self.room.game.boundary_standings = standings.clone();
        info!(room_id = %self.room.room_id, players = self.room.users.len(), "voting started");

        let mut step = Step::default();
        step.send(
            Recipient::All,
            ServerEvent::VotingStarted {
                crushes: self.config.crush_cards(),
                standings,
            },
        );
        Ok(step)
    }

    fn cast_vote(&mut self, user_id: UserId, crush_id: CrushId) -> Result<Step, RoomError> {
        self.require_phase(Phase::Voting, "vote")?;
        if self.config.crush(crush_id).is_none() {
            return Err(RoomError::UnknownCrush(crush_id));
        }
        let candidates = self.config.candidate_ids();
        let outcome = self
            .room
            .ballot
            .cast_vote(user_id, Some(crush_id), self.room.users.len(), &candidates);

        let mut step = Step::default();
        self.announce_ballot(&mut step, outcome);
        Ok(step)
    }

    /// Re-tallies after a seat changed (departure or kick).
    fn check_ballot(&mut self, step: &mut Step) {
        let candidates = self.config.candidate_ids();
        let outcome = self.room.ballot.resolve(self.room.users.len(), &candidates);
        self.announce_ballot(step, outcome);
    }

    /// Announces progress, or the winner once every seat has voted.
    fn announce_ballot(&mut self, step: &mut Step, outcome: VoteOutcome) {
        match outcome {
            VoteOutcome::StillWaiting { voted, total } => {
                step.send(Recipient::All, ServerEvent::VotingProgress { voted, total });
            }
            VoteOutcome::Winner { crush_id, final_voter } => {
                let voted = self.room.ballot.len();
                step.send(
                    Recipient::All,
                    ServerEvent::VotingProgress {
                        voted,
                        total: self.room.users.len(),
                    },
                );
                self.begin_trivia(step, crush_id, final_voter);
            }
        }
    }

    fn begin_trivia(&mut self, step: &mut Step, crush_id: CrushId, final_voter: UserId) {
        let Some(card) = self.config.crush(crush_id).map(Crush::card) else {
            return;
        };
        let game = &mut self.room.game;
        game.selected_topic = Some(crush_id);
        game.phase = Phase::Trivia;
        game.trivia_round_index = 0;
        game.round = None;
        info!(room_id = %self.room.room_id, crush = %card.name, "voting resolved");

        step.send(Recipient::All, ServerEvent::VotingResult { crush: card, final_voter });
        self.request_round(step);
    }

    fn selected_crush(&self) -> Option<&Crush> {
        self.room.game.selected_topic.and_then(|id| self.config.crush(id))
    }

    fn request_round(&self, step: &mut Step) {
        let round = self.room.game.trivia_round_index;
        let Some((category, difficulty)) = self.selected_crush().and_then(|c| c.category_for(round)) else {
            warn!(room_id = %self.room.room_id, round, "no category for round");
            return;
        };
        step.effect(Effect::FetchRound {
            round,
            category: category.clone(),
            difficulty,
            count: self.config.question_count,
        });
    }

    fn set_ready(&mut self, user_id: UserId, ready: bool) -> Result<Step, RoomError> {
        self.require_phase(Phase::Lobby, "change ready state")?;
        if let Some(user) = self.room.user_mut(user_id) {
            user.ready = ready;
        }

        let mut step = Step::default();
        step.send(Recipient::All, ServerEvent::UserReady { user_id, ready });
        step.send(
            Recipient::Host,
            ServerEvent::ReadyCheck {
                all_ready: self.room.all_guests_ready(),
            },
        );
        Ok(step)
    }

    fn submit_answer(&mut self, user_id: UserId, answer: &str) -> Result<Step, RoomError> {
        self.require_phase(Phase::Trivia, "answer")?;
        let Some(set) = self.room.game.round.as_ref() else {
            return Err(RoomError::InvalidState("questions are still loading".into()));
        };
        let Some(user) = self.room.users.iter_mut().find(|u| u.user_id == user_id) else {
            return Err(RoomError::NotInRoom(user_id));
        };
        let index = user.current_answer_index;
        if index >= set.len() {
            return Err(RoomError::InvalidState("no questions left this round".into()));
        }

        let mut step = Step::default();
        if !set.check(index, answer) {
            step.send(
                Recipient::User(user_id),
                ServerEvent::AnswerResult {
                    correct: false,
                    points_awarded: 0,
                    score: user.score,
                    finished: false,
                },
            );
            return Ok(step);
        }

        let points = self.config.points.for_difficulty(set.difficulty());
        user.score += points;
        user.current_answer_index += 1;
        let finished = user.current_answer_index >= set.len();
        step.send(
            Recipient::User(user_id),
            ServerEvent::AnswerResult {
                correct: true,
                points_awarded: points,
                score: user.score,
                finished,
            },
        );
        if let Some(next) = set.client_question(user.current_answer_index) {
            step.send(Recipient::User(user_id), ServerEvent::RoundQuestion { question: next.clone() });
        }
        step.send(
            Recipient::All,
            ServerEvent::LeaderboardUpdate {
                standings: compute_standings(&self.room.users),
            },
        );
        Ok(step)
    }

    fn kick(&mut self, by: UserId, target: UserId) -> Result<Step, RoomError> {
        let room_id = self.room.room_id;
        if !self.room.is_host(by) {
            return Err(RoomError::Unauthorized("only the host can kick players".into()));
        }
        if by == target {
            return Err(RoomError::InvalidState("the host cannot kick themselves".into()));
        }
        self.room.remove_user(target).ok_or(RoomError::NotInRoom(target))?;
        self.room.kicked_user_ids.insert(target);
        self.room.ballot.retract(target);
        info!(%room_id, host = %by, %target, "user kicked");

        let mut step = Step::default();
        step.effect(Effect::Disconnect {
            user_id: target,
            reason: "kicked by the host".into(),
        });
        step.send(
            Recipient::All,
            ServerEvent::RosterChanged {
                users: self.room.roster(),
                host_user_id: self.room.host_user_id,
            },
        );
        match self.room.phase() {
            Phase::Lobby => self.send_host_panels(&mut step),
            Phase::Voting => {
                step.send(Recipient::Host, ServerEvent::KickRoster { users: self.room.kick_roster() });
                self.check_ballot(&mut step);
            }
            _ => {
                step.send(Recipient::Host, ServerEvent::KickRoster { users: self.room.kick_roster() });
                step.send(
                    Recipient::All,
                    ServerEvent::LeaderboardUpdate {
                        standings: compute_standings(&self.room.users),
                    },
                );
            }
        }
        Ok(step)
    }

    fn return_to_lobby(&mut self, user_id: UserId) -> Result<Step, RoomError> {
        self.require_phase(Phase::Victory, "return to the lobby")?;
        info!(room_id = %self.room.room_id, %user_id, "returning to lobby");

        let mut step = Step::default();
        self.reset_game(&mut step);
        Ok(step)
    }

    /// Fresh lobby for the same room: scores, votes and ready flags
    /// cleared, dropped players unseated, bans kept.
    fn reset_game(&mut self, step: &mut Step) {
        step.effect(Effect::CancelTimer);
        self.room.game = GameState::default();
        self.room.ballot.clear();
        let dropped: Vec<UserId> = self
            .room
            .users
            .iter()
            .filter(|u| !u.connected)
            .map(|u| u.user_id)
            .collect();
        self.room.users.retain(|u| u.connected);
        if !dropped.is_empty() {
            step.effect(Effect::ReleaseSeats { user_ids: dropped });
        }
        for user in &mut self.room.users {
            user.reset_for_lobby();
        }
        let ids: Vec<UserId> = self.room.users.iter().map(|u| u.user_id).collect();
        for id in ids {
            self.send_snapshot(step, id);
        }
        self.send_host_panels(step);
    }

    // =====================================================================
    // Rounds and timers
    // =====================================================================

    /// Questions for `round` arrived (or failed to). Ignored unless the
    /// room is still waiting for exactly that round.
    pub fn round_loaded(&mut self, round: u8, result: Result<Vec<Question>, ProviderError>) -> Step {
        let mut step = Step::default();
        let game = &self.room.game;
        if game.phase != Phase::Trivia || game.trivia_round_index != round || game.round.is_some() {
            debug!(room_id = %self.room.room_id, round, "discarding stale question load");
            return step;
        }
        let Some((category, difficulty)) = self
            .selected_crush()
            .and_then(|c| c.category_for(round))
            .map(|(category, difficulty)| (category.name.clone(), difficulty))
        else {
            return step;
        };

        let set = match result.and_then(|qs| QuestionSet::prepare(&category, difficulty, qs, self.config.question_count)) {
            Ok(set) => set,
            Err(err) => {
                let err = RoomError::ProviderUnavailable(err.to_string());
                warn!(room_id = %self.room.room_id, round, %err, "aborting game");
                step.send(Recipient::All, ServerEvent::GameAborted { reason: err.to_string() });
                self.reset_game(&mut step);
                return step;
            }
        };

        for user in &mut self.room.users {
            user.current_answer_index = 0;
        }
        let seconds = self.config.round_seconds;
        info!(room_id = %self.room.room_id, round, %difficulty, questions = set.len(), "trivia round started");

        step.send(
            Recipient::All,
            ServerEvent::RoundStart {
                round,
                category,
                difficulty,
                question_count: set.len(),
                seconds,
            },
        );
        step.send(
            Recipient::All,
            ServerEvent::LeaderboardUpdate {
                standings: compute_standings(&self.room.users),
            },
        );
        if let Some(first) = set.client_question(0) {
            step.send(Recipient::All, ServerEvent::RoundQuestion { question: first.clone() });
        }
        self.room.game.round = Some(set);
        step.effect(Effect::ArmTimer {
            tag: PhaseTag {
                phase: Phase::Trivia,
                round,
            },
            seconds,
        });
        step
    }

    /// A countdown tick. Only ticks tagged with the current phase and
    /// round count; anything else is a leftover and ignored.
    pub fn timer_tick(&mut self, tag: PhaseTag, remaining: u32, expired: bool) -> Step {
        let mut step = Step::default();
        if tag != self.current_tag() {
            debug!(room_id = %self.room.room_id, ?tag, "ignoring stale timer tick");
            return step;
        }
        step.send(
            Recipient::All,
            ServerEvent::Countdown {
                phase: tag.phase,
                remaining,
            },
        );
        if expired {
            match tag.phase {
                Phase::Trivia => self.end_round(&mut step),
                Phase::Lounge => self.next_round(&mut step),
                _ => {}
            }
        }
        step
    }

    fn end_round(&mut self, step: &mut Step) {
        let round = self.room.game.trivia_round_index;
        self.room.game.round = None;
        step.send(Recipient::All, ServerEvent::RoundEnd { round });
        let standings = compute_standings(&self.room.users);

        if round < LAST_ROUND {
            let next = self
                .selected_crush()
                .and_then(|c| c.category_for(round + 1))
                .map(|(category, difficulty)| (category.name.clone(), difficulty));
            let Some((next_category, next_difficulty)) = next else {
                return;
            };
            let dialogue = lounge_dialogue(&self.room.game.boundary_standings, &standings, &next_category);
            self.room.game.phase = Phase::Lounge;
            self.room.game.boundary_standings = standings.clone();
            let seconds = self.config.lounge_seconds;
            info!(room_id = %self.room.room_id, round, "lounge started");

            step.send(
                Recipient::All,
                ServerEvent::LoungeStart {
                    standings,
                    dialogue,
                    next_category,
                    next_difficulty,
                    seconds,
                },
            );
            step.effect(Effect::ArmTimer {
                tag: PhaseTag {
                    phase: Phase::Lounge,
                    round,
                },
                seconds,
            });
        } else {
            let crush_name = self.selected_crush().map(|c| c.name.clone()).unwrap_or_default();
            let (champion, lines) = victory_summary(&standings, &crush_name);
            self.room.game.phase = Phase::Victory;
            info!(
                room_id = %self.room.room_id,
                champion = ?champion.as_ref().map(|c| c.user_id),
                "game finished"
            );
            step.send(
                Recipient::All,
                ServerEvent::VictorySummary {
                    standings,
                    champion,
                    lines,
                },
            );
        }
    }

    fn next_round(&mut self, step: &mut Step) {
        let game = &mut self.room.game;
        game.trivia_round_index += 1;
        game.phase = Phase::Trivia;
        game.round = None;
        self.request_round(step);
    }

    // =====================================================================
    // Notifications
    // =====================================================================

    fn send_snapshot(&self, step: &mut Step, user_id: UserId) {
        step.send(
            Recipient::User(user_id),
            ServerEvent::RoomSnapshot {
                room: self.room.view(),
                your_user_id: user_id,
            },
        );
    }

    /// Kick roster and ready check, both host-only.
    fn send_host_panels(&self, step: &mut Step) {
        step.send(Recipient::Host, ServerEvent::KickRoster { users: self.room.kick_roster() });
        step.send(
            Recipient::Host,
            ServerEvent::ReadyCheck {
                all_ready: self.room.all_guests_ready(),
            },
        );
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const T1: CrushId = CrushId(1);
    const T2: CrushId = CrushId(2);

    fn uid(id: u64) -> UserId {
        UserId(id)
    }

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn ident(id: u64, name: &str) -> Identity {
        Identity::new(uid(id), name, "fox")
    }

    fn questions(n: usize) -> Vec<Question> {
        (0..n)
            .map(|i| Question {
                category: "Music".into(),
                question: format!("Question {i}?"),
                correct_answer: "right".into(),
                incorrect_answers: vec!["wrong a".into(), "wrong b".into(), "wrong c".into()],
                difficulty: Difficulty::Easy,
            })
            .collect()
    }

    fn tag(phase: Phase, round: u8) -> PhaseTag {
        PhaseTag { phase, round }
    }

    fn machine_with(config: GameConfig) -> GameMachine {
        let (machine, _) = GameMachine::new(RoomId(1), &ident(1, "ava"), conn(1), Arc::new(config));
        machine
    }

    /// Ava (host), Ben and Cat seated in the lobby.
    fn lobby_of_three() -> GameMachine {
        let mut m = machine_with(GameConfig::default());
        m.join(&ident(2, "ben"), conn(2)).unwrap();
        m.join(&ident(3, "cat"), conn(3)).unwrap();
        m
    }

    fn act(m: &mut GameMachine, user: u64, event: RoomEvent) -> Step {
        m.handle_event(uid(user), event).unwrap()
    }

    fn vote(m: &mut GameMachine, user: u64, crush_id: CrushId) -> Step {
        act(m, user, RoomEvent::CastVote { crush_id })
    }

    /// Three players in trivia round 0 with `n` questions loaded.
    fn trivia_of_three(n: usize) -> GameMachine {
        let mut m = lobby_of_three();
        act(&mut m, 1, RoomEvent::StartVoting);
        for user in 1..=3 {
            vote(&mut m, user, T1);
        }
        m.round_loaded(0, Ok(questions(n)));
        m
    }

    fn answer(m: &mut GameMachine, user: u64, answer: &str) -> Step {
        act(m, user, RoomEvent::SubmitAnswer { answer: answer.into() })
    }

    fn score_of(m: &GameMachine, user: u64) -> u32 {
        m.room().user(uid(user)).map(|u| u.score).unwrap()
    }

    // =====================================================================
    // new() / join()
    // =====================================================================

    #[test]
    fn test_new_greets_host_with_snapshot() {
        let (m, step) = GameMachine::new(RoomId(9), &ident(1, "ava"), conn(1), Arc::new(GameConfig::default()));
        assert_eq!(m.room().host_user_id, uid(1));
        let to_host = step.events_for(&Recipient::User(uid(1)));
        assert!(matches!(to_host[0], ServerEvent::RoomSnapshot { your_user_id, .. } if *your_user_id == uid(1)));
    }

    #[test]
    fn test_join_sends_snapshot_broadcast_and_host_roster() {
        let mut m = machine_with(GameConfig::default());
        let (outcome, step) = m.join(&ident(2, "ben"), conn(2)).unwrap();

        assert_eq!(outcome, JoinOutcome::Joined);
        assert_eq!(m.room().users.len(), 2);
        assert!(matches!(
            step.events_for(&Recipient::User(uid(2)))[0],
            ServerEvent::RoomSnapshot { room, .. } if room.users.len() == 2
        ));
        assert!(matches!(
            step.events_for(&Recipient::AllExcept(uid(2)))[0],
            ServerEvent::UserJoined { user } if user.username == "ben"
        ));
        let host = step.events_for(&Recipient::Host);
        assert!(matches!(host[0], ServerEvent::KickRoster { users } if users.len() == 1));
        assert!(matches!(host[1], ServerEvent::ReadyCheck { all_ready: false }));
    }

    #[test]
    fn test_join_twice_is_idempotent() {
        let mut m = machine_with(GameConfig::default());
        m.join(&ident(2, "ben"), conn(2)).unwrap();
        let (outcome, step) = m.join(&ident(2, "ben"), conn(7)).unwrap();

        assert_eq!(outcome, JoinOutcome::AlreadyMember);
        assert_eq!(m.room().users.len(), 2);
        assert_eq!(m.room().user(uid(2)).unwrap().connection_id, conn(7));
        assert!(step.events_for(&Recipient::AllExcept(uid(2))).is_empty());
    }

    #[test]
    fn test_join_during_game_returns_game_in_progress_without_mutation() {
        let mut m = lobby_of_three();
        act(&mut m, 1, RoomEvent::StartVoting);

        let err = m.join(&ident(4, "dan"), conn(4)).unwrap_err();
        assert!(matches!(err, RoomError::GameInProgress(_)));
        assert_eq!(m.room().users.len(), 3);
    }

    #[test]
    fn test_join_full_room_returns_room_full() {
        let mut m = machine_with(GameConfig {
            max_players: 2,
            ..GameConfig::default()
        });
        m.join(&ident(2, "ben"), conn(2)).unwrap();

        let err = m.join(&ident(3, "cat"), conn(3)).unwrap_err();
        assert!(matches!(err, RoomError::RoomFull(_)));
        assert!(!m.info().is_joinable());
    }

    #[test]
    fn test_join_after_kick_is_always_banned() {
        let mut m = lobby_of_three();
        act(&mut m, 1, RoomEvent::KickUser { target: uid(3) });

        for attempt in 0..3 {
            let err = m.join(&ident(3, "cat"), conn(10 + attempt)).unwrap_err();
            assert!(matches!(err, RoomError::Banned(..)));
        }
        assert!(!m.room().is_member(uid(3)));
    }

    // =====================================================================
    // leave() / host migration
    // =====================================================================

    #[test]
    fn test_leave_lobby_host_promotes_next_in_join_order() {
        let mut m = lobby_of_three();
        let (outcome, step) = m.leave(uid(1)).unwrap();

        assert!(!outcome.room_empty);
        assert_eq!(m.room().host_user_id, uid(2));
        assert_eq!(m.room().users.len(), 2);
        assert!(matches!(
            step.events_for(&Recipient::User(uid(2)))[0],
            ServerEvent::HostPromoted { previous_host_name, .. } if previous_host_name == "ava"
        ));
        assert!(step
            .events_for(&Recipient::All)
            .iter()
            .any(|ev| matches!(ev, ServerEvent::HostChanged { host_user_id, .. } if *host_user_id == uid(2))));
    }

    #[test]
    fn test_leave_last_user_tears_down() {
        let mut m = machine_with(GameConfig::default());
        let (outcome, step) = m.leave(uid(1)).unwrap();

        assert!(outcome.room_empty);
        assert!(step.effects.contains(&Effect::Teardown));
    }

    #[test]
    fn test_leave_non_member_returns_not_in_room() {
        let mut m = lobby_of_three();
        assert!(matches!(m.leave(uid(9)), Err(RoomError::NotInRoom(_))));
    }

    #[test]
    fn test_leave_during_voting_synthesizes_no_preference_vote() {
        let mut m = lobby_of_three();
        act(&mut m, 1, RoomEvent::StartVoting);
        vote(&mut m, 1, T2);
        vote(&mut m, 2, T2);

        let (_, step) = m.leave(uid(3)).unwrap();
        assert_eq!(m.room().ballot.choice_of(uid(3)), Some(None));
        assert_eq!(m.room().phase(), Phase::Trivia);
        assert!(step
            .events_for(&Recipient::All)
            .iter()
            .any(|ev| matches!(ev, ServerEvent::VotingResult { crush, final_voter } if crush.id == T2 && *final_voter == uid(3))));
    }

    // =====================================================================
    // Voting
    // =====================================================================

    #[test]
    fn test_start_voting_by_guest_is_unauthorized() {
        let mut m = lobby_of_three();
        let err = m.handle_event(uid(2), RoomEvent::StartVoting).unwrap_err();

        assert!(matches!(err, RoomError::Unauthorized(_)));
        assert_eq!(m.room().phase(), Phase::Lobby);
        assert!(!m.room().game.game_active);
    }

    #[test]
    fn test_start_voting_activates_game_with_zero_standings() {
        let mut m = lobby_of_three();
        let step = act(&mut m, 1, RoomEvent::StartVoting);

        assert_eq!(m.room().phase(), Phase::Voting);
        assert!(m.room().game.game_active);
        match step.events_for(&Recipient::All)[0] {
            ServerEvent::VotingStarted { crushes, standings } => {
                assert_eq!(crushes.len(), 4);
                assert!(standings.iter().all(|s| s.score == 0));
            }
            other => panic!("expected VotingStarted, got {other:?}"),
        }
    }

    #[test]
    fn test_voting_majority_wins_and_enters_easy_trivia() {
        let mut m = lobby_of_three();
        act(&mut m, 1, RoomEvent::StartVoting);
        let step = vote(&mut m, 2, T1);
        assert!(matches!(
            step.events_for(&Recipient::All)[0],
            ServerEvent::VotingProgress { voted: 1, total: 3 }
        ));
        vote(&mut m, 3, T1);
        let step = vote(&mut m, 1, T2);

        assert_eq!(m.room().phase(), Phase::Trivia);
        assert_eq!(m.room().game.trivia_round_index, 0);
        assert_eq!(m.room().game.selected_topic, Some(T1));
        match &step.effects[..] {
            [Effect::FetchRound { round: 0, category, difficulty: Difficulty::Easy, count: 20 }] => {
                assert_eq!(category.id, "music");
            }
            other => panic!("expected FetchRound, got {other:?}"),
        }
    }

    #[test]
    fn test_cast_vote_changed_vote_counts_once() {
        let mut m = lobby_of_three();
        act(&mut m, 1, RoomEvent::StartVoting);
        vote(&mut m, 2, T1);
        let step = vote(&mut m, 2, T2);

        assert!(matches!(
            step.events_for(&Recipient::All)[0],
            ServerEvent::VotingProgress { voted: 1, total: 3 }
        ));
        assert_eq!(m.room().ballot.choice_of(uid(2)), Some(Some(T2)));
        assert_eq!(m.room().phase(), Phase::Voting);
    }

    #[test]
    fn test_vote_for_unknown_crush_is_rejected() {
        let mut m = lobby_of_three();
        act(&mut m, 1, RoomEvent::StartVoting);
        let err = m.handle_event(uid(2), RoomEvent::CastVote { crush_id: CrushId(99) }).unwrap_err();

        assert!(matches!(err, RoomError::UnknownCrush(_)));
        assert!(m.room().ballot.is_empty());
    }

    #[test]
    fn test_vote_outside_voting_is_invalid_state() {
        let mut m = lobby_of_three();
        let err = m.handle_event(uid(2), RoomEvent::CastVote { crush_id: T1 }).unwrap_err();
        assert!(matches!(err, RoomError::InvalidState(_)));
    }

    #[test]
    fn test_kick_mid_voting_resolves_with_remaining_voters() {
        let mut m = lobby_of_three();
        act(&mut m, 1, RoomEvent::StartVoting);
        vote(&mut m, 1, T2);
        vote(&mut m, 2, T2);
        assert_eq!(m.room().phase(), Phase::Voting);

        let step = act(&mut m, 1, RoomEvent::KickUser { target: uid(3) });
        assert_eq!(m.room().phase(), Phase::Trivia);
        assert_eq!(m.room().game.selected_topic, Some(T2));
        assert!(step.effects.contains(&Effect::Disconnect {
            user_id: uid(3),
            reason: "kicked by the host".into(),
        }));
        assert!(step
            .events_for(&Recipient::All)
            .iter()
            .any(|ev| matches!(ev, ServerEvent::VotingProgress { voted: 2, total: 2 })));
    }

    // =====================================================================
    // Kick / ready
    // =====================================================================

    #[test]
    fn test_kick_by_guest_is_unauthorized_and_silent() {
        let mut m = lobby_of_three();
        let err = m.handle_event(uid(2), RoomEvent::KickUser { target: uid(3) }).unwrap_err();

        assert!(matches!(err, RoomError::Unauthorized(_)));
        assert!(m.room().is_member(uid(3)));
        assert!(m.room().kicked_user_ids.is_empty());
    }

    #[test]
    fn test_kick_self_is_invalid() {
        let mut m = lobby_of_three();
        let err = m.handle_event(uid(1), RoomEvent::KickUser { target: uid(1) }).unwrap_err();
        assert!(matches!(err, RoomError::InvalidState(_)));
    }

    #[test]
    fn test_set_ready_notifies_room_and_host_ready_check() {
        let mut m = lobby_of_three();
        let step = act(&mut m, 2, RoomEvent::SetReady { ready: true });
        assert!(matches!(step.events_for(&Recipient::Host)[0], ServerEvent::ReadyCheck { all_ready: false }));

        let step = act(&mut m, 3, RoomEvent::SetReady { ready: true });
        assert!(matches!(
            step.events_for(&Recipient::All)[0],
            ServerEvent::UserReady { user_id, ready: true } if *user_id == uid(3)
        ));
        assert!(matches!(step.events_for(&Recipient::Host)[0], ServerEvent::ReadyCheck { all_ready: true }));
    }

    #[test]
    fn test_set_ready_after_lobby_is_invalid() {
        let mut m = lobby_of_three();
        act(&mut m, 1, RoomEvent::StartVoting);
        let err = m.handle_event(uid(2), RoomEvent::SetReady { ready: true }).unwrap_err();
        assert!(matches!(err, RoomError::InvalidState(_)));
    }

    // =====================================================================
    // Trivia
    // =====================================================================

    #[test]
    fn test_round_loaded_starts_round_and_arms_timer() {
        let mut m = lobby_of_three();
        act(&mut m, 1, RoomEvent::StartVoting);
        for user in 1..=3 {
            vote(&mut m, user, T1);
        }
        let step = m.round_loaded(0, Ok(questions(5)));

        let all = step.events_for(&Recipient::All);
        assert!(matches!(
            all[0],
            ServerEvent::RoundStart { round: 0, difficulty: Difficulty::Easy, question_count: 5, seconds: 60, .. }
        ));
        assert!(matches!(all[2], ServerEvent::RoundQuestion { question } if question.index == 0 && question.answers.len() == 4));
        assert_eq!(
            step.effects,
            vec![Effect::ArmTimer {
                tag: tag(Phase::Trivia, 0),
                seconds: 60,
            }]
        );
    }

    #[test]
    fn test_round_loaded_twice_is_ignored() {
        let mut m = trivia_of_three(3);
        assert!(m.round_loaded(0, Ok(questions(3))).is_empty());
    }

    #[test]
    fn test_provider_failure_aborts_to_lobby() {
        let mut m = lobby_of_three();
        act(&mut m, 1, RoomEvent::StartVoting);
        for user in 1..=3 {
            vote(&mut m, user, T1);
        }
        let step = m.round_loaded(0, Err(ProviderError::Unavailable("timeout".into())));

        assert!(matches!(step.events_for(&Recipient::All)[0], ServerEvent::GameAborted { .. }));
        assert_eq!(m.room().phase(), Phase::Lobby);
        assert!(!m.room().game.game_active);
        assert!(m.join(&ident(4, "dan"), conn(4)).is_ok());
    }

    #[test]
    fn test_empty_question_set_aborts_to_lobby() {
        let mut m = lobby_of_three();
        act(&mut m, 1, RoomEvent::StartVoting);
        for user in 1..=3 {
            vote(&mut m, user, T1);
        }
        m.round_loaded(0, Ok(Vec::new()));
        assert_eq!(m.room().phase(), Phase::Lobby);
    }

    #[test]
    fn test_submit_correct_answer_scores_and_advances() {
        let mut m = trivia_of_three(3);
        let step = answer(&mut m, 2, " right ");

        let to_ben = step.events_for(&Recipient::User(uid(2)));
        assert!(matches!(
            to_ben[0],
            ServerEvent::AnswerResult { correct: true, points_awarded: 100, score: 100, finished: false }
        ));
        assert!(matches!(to_ben[1], ServerEvent::RoundQuestion { question } if question.index == 1));
        assert_eq!(m.room().user(uid(2)).unwrap().current_answer_index, 1);
        assert!(matches!(
            step.events_for(&Recipient::All)[0],
            ServerEvent::LeaderboardUpdate { standings } if standings[0].user_id == uid(2)
        ));
    }

    #[test]
    fn test_submit_wrong_answer_does_not_advance() {
        let mut m = trivia_of_three(3);
        let step = answer(&mut m, 2, "wrong a");

        assert!(matches!(
            step.events_for(&Recipient::User(uid(2)))[0],
            ServerEvent::AnswerResult { correct: false, points_awarded: 0, .. }
        ));
        assert_eq!(m.room().user(uid(2)).unwrap().current_answer_index, 0);
        assert_eq!(score_of(&m, 2), 0);
    }

    #[test]
    fn test_submit_past_last_question_is_invalid() {
        let mut m = trivia_of_three(1);
        let step = answer(&mut m, 2, "right");
        assert!(matches!(
            step.events_for(&Recipient::User(uid(2)))[0],
            ServerEvent::AnswerResult { finished: true, .. }
        ));

        let err = m
            .handle_event(uid(2), RoomEvent::SubmitAnswer { answer: "right".into() })
            .unwrap_err();
        assert!(matches!(err, RoomError::InvalidState(_)));
    }

    #[test]
    fn test_submit_while_loading_is_invalid() {
        let mut m = lobby_of_three();
        act(&mut m, 1, RoomEvent::StartVoting);
        for user in 1..=3 {
            vote(&mut m, user, T1);
        }
        let err = m
            .handle_event(uid(2), RoomEvent::SubmitAnswer { answer: "right".into() })
            .unwrap_err();
        assert!(matches!(err, RoomError::InvalidState(_)));
    }

    // =====================================================================
    // Timers and phase progression
    // =====================================================================

    #[test]
    fn test_tick_broadcasts_countdown() {
        let mut m = trivia_of_three(3);
        let step = m.timer_tick(tag(Phase::Trivia, 0), 42, false);

        assert!(matches!(
            step.events_for(&Recipient::All)[0],
            ServerEvent::Countdown { phase: Phase::Trivia, remaining: 42 }
        ));
        assert_eq!(m.room().phase(), Phase::Trivia);
    }

    #[test]
    fn test_disconnect_mid_round_freezes_score_through_lounge() {
        let mut m = trivia_of_three(3);
        answer(&mut m, 2, "right");
        m.leave(uid(2)).unwrap();
        answer(&mut m, 3, "right");
        answer(&mut m, 3, "right");

        let step = m.timer_tick(tag(Phase::Trivia, 0), 0, true);
        assert_eq!(m.room().phase(), Phase::Lounge);
        assert_eq!(score_of(&m, 2), 100);
        assert!(!m.room().user(uid(2)).unwrap().connected);
        assert!(step
            .events_for(&Recipient::All)
            .iter()
            .any(|ev| matches!(ev, ServerEvent::LoungeStart { next_difficulty: Difficulty::Medium, seconds: 20, .. })));
        assert!(step.effects.contains(&Effect::ArmTimer {
            tag: tag(Phase::Lounge, 0),
            seconds: 20,
        }));

        let step = m.timer_tick(tag(Phase::Lounge, 0), 0, true);
        assert_eq!(m.room().phase(), Phase::Trivia);
        assert_eq!(m.room().game.trivia_round_index, 1);
        assert!(matches!(
            &step.effects[..],
            [Effect::FetchRound { round: 1, difficulty: Difficulty::Medium, .. }]
        ));
        assert_eq!(score_of(&m, 2), 100);
    }

    #[test]
    fn test_duplicate_expiry_tick_does_not_double_advance() {
        let mut m = trivia_of_three(3);
        m.timer_tick(tag(Phase::Trivia, 0), 0, true);
        assert_eq!(m.room().phase(), Phase::Lounge);

        let step = m.timer_tick(tag(Phase::Trivia, 0), 0, true);
        assert!(step.is_empty());
        assert_eq!(m.room().phase(), Phase::Lounge);
        assert_eq!(m.room().game.trivia_round_index, 0);
    }

    #[test]
    fn test_full_game_reaches_victory_and_returns_to_lobby() {
        let mut m = trivia_of_three(2);
        answer(&mut m, 3, "right");
        for round in 0..2 {
            m.timer_tick(tag(Phase::Trivia, round), 0, true);
            assert_eq!(m.room().phase(), Phase::Lounge);
            m.timer_tick(tag(Phase::Lounge, round), 0, true);
            assert_eq!(m.room().game.trivia_round_index, round + 1);
            m.round_loaded(round + 1, Ok(questions(2)));
        }
        answer(&mut m, 3, "right");
        let step = m.timer_tick(tag(Phase::Trivia, LAST_ROUND), 0, true);

        assert_eq!(m.room().phase(), Phase::Victory);
        match step.events_for(&Recipient::All).last() {
            Some(ServerEvent::VictorySummary { champion, lines, .. }) => {
                assert_eq!(champion.as_ref().map(|c| c.user_id), Some(uid(3)));
                assert!(lines[0].contains("cat"));
            }
            other => panic!("expected VictorySummary, got {other:?}"),
        }
        // points follow the round's difficulty: easy 100 + hard 300
        assert_eq!(score_of(&m, 3), 400);

        let step = act(&mut m, 2, RoomEvent::ReturnToLobby);
        assert_eq!(m.room().phase(), Phase::Lobby);
        assert!(!m.room().game.game_active);
        assert_eq!(score_of(&m, 3), 0);
        assert!(m.room().ballot.is_empty());
        assert_eq!(step.events_for(&Recipient::User(uid(1))).len(), 1);
    }

    #[test]
    fn test_return_to_lobby_before_victory_is_invalid() {
        let mut m = trivia_of_three(2);
        let err = m.handle_event(uid(1), RoomEvent::ReturnToLobby).unwrap_err();
        assert!(matches!(err, RoomError::InvalidState(_)));
    }

    #[test]
    fn test_return_to_lobby_keeps_bans_and_drops_ghost_seats() {
        let mut m = trivia_of_three(2);
        act(&mut m, 1, RoomEvent::KickUser { target: uid(3) });
        m.leave(uid(2)).unwrap();
        for round in 0..LAST_ROUND {
            m.timer_tick(tag(Phase::Trivia, round), 0, true);
            m.timer_tick(tag(Phase::Lounge, round), 0, true);
            m.round_loaded(round + 1, Ok(questions(2)));
        }
        m.timer_tick(tag(Phase::Trivia, LAST_ROUND), 0, true);
        let step = act(&mut m, 1, RoomEvent::ReturnToLobby);

        assert!(step.effects.contains(&Effect::ReleaseSeats { user_ids: vec![uid(2)] }));
        assert_eq!(m.room().users.len(), 1);
        assert!(matches!(m.join(&ident(3, "cat"), conn(30)), Err(RoomError::Banned(..))));
        assert!(m.join(&ident(2, "ben"), conn(20)).is_ok());
    }

    #[test]
    fn test_leave_mid_game_keeps_seat_and_lobby_leave_frees_it() {
        let mut m = lobby_of_three();
        let (outcome, _) = m.leave(uid(3)).unwrap();
        assert!(!outcome.seat_kept);

        act(&mut m, 1, RoomEvent::StartVoting);
        let (outcome, _) = m.leave(uid(2)).unwrap();
        assert!(outcome.seat_kept);
        assert!(m.room().is_member(uid(2)));
    }

    #[test]
    fn test_provider_failure_releases_dropped_seats() {
        let mut m = lobby_of_three();
        act(&mut m, 1, RoomEvent::StartVoting);
        vote(&mut m, 1, T1);
        vote(&mut m, 2, T1);
        m.leave(uid(3)).unwrap();

        let step = m.round_loaded(0, Err(ProviderError::Unavailable("timed out".into())));
        assert!(step.effects.contains(&Effect::ReleaseSeats { user_ids: vec![uid(3)] }));
        assert!(!m.room().is_member(uid(3)));
    }

    #[test]
    fn test_all_players_leaving_mid_game_tears_down() {
        let mut m = trivia_of_three(2);
        m.leave(uid(2)).unwrap();
        m.leave(uid(3)).unwrap();
        let (outcome, step) = m.leave(uid(1)).unwrap();

        assert!(outcome.room_empty);
        assert_eq!(step.effects, vec![Effect::CancelTimer, Effect::Teardown]);
    }

    #[test]
    fn test_disconnected_player_cannot_act() {
        let mut m = trivia_of_three(2);
        m.leave(uid(2)).unwrap();
        let err = m
            .handle_event(uid(2), RoomEvent::SubmitAnswer { answer: "right".into() })
            .unwrap_err();
        assert!(matches!(err, RoomError::NotInRoom(_)));
    }
}
