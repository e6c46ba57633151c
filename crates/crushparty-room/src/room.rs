//! Room actor: an isolated Tokio task that owns one party room.
//!
//! The actor holds the [`GameMachine`], each seated player's outbound
//! channel, the phase countdown and the question provider. Commands,
//! countdown ticks and finished question loads are all handled on the one
//! task, so room state is only ever touched by one operation at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crushparty_protocol::{ConnectionId, Recipient, RoomId, ServerEvent, UserId};
use crushparty_session::Identity;
use crushparty_timer::{Countdown, CountdownConfig};
use tokio::sync::{mpsc, oneshot};

use crate::config::GameConfig;
use crate::machine::{Effect, GameMachine, JoinOutcome, LeaveOutcome, PhaseTag, RoomEvent, RoomInfo, Step};
use crate::trivia::{ProviderError, Question, QuestionProvider};
use crate::RoomError;

/// An outbound message from the room actor to a player's connection handler.
#[derive(Debug, Clone)]
pub enum RoomOutbound {
    Event(ServerEvent),
    /// The room wants this connection closed (the player was kicked).
    Disconnect { reason: String },
}

/// Channel sender for delivering outbound messages to a player.
pub type UserSender = mpsc::UnboundedSender<RoomOutbound>;

/// Everything a room needs to seat a player.
#[derive(Debug, Clone)]
pub struct Member {
    pub identity: Identity,
    pub connection_id: ConnectionId,
    pub sender: UserSender,
}

impl Member {
    pub fn new(identity: Identity, connection_id: ConnectionId, sender: UserSender) -> Self {
        Self {
            identity,
            connection_id,
            sender,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }
}

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        member: Member,
        reply: oneshot::Sender<Result<JoinOutcome, RoomError>>,
    },
    Leave {
        user_id: UserId,
        reply: oneshot::Sender<Result<LeaveOutcome, RoomError>>,
    },
    /// A player action. Failures go back to the player as an `error` event.
    Event { user_id: UserId, event: RoomEvent },
    GetInfo { reply: oneshot::Sender<RoomInfo> },
    Shutdown,
}

impl std::fmt::Debug for RoomCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomCommand::Join { member, .. } => write!(f, "Join({})", member.user_id()),
            RoomCommand::Leave { user_id, .. } => write!(f, "Leave({user_id})"),
            RoomCommand::Event { user_id, event } => write!(f, "Event({user_id}, {event:?})"),
            RoomCommand::GetInfo { .. } => f.write_str("GetInfo"),
            RoomCommand::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// True once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        reply_rx.await.map_err(|_| RoomError::Unavailable(self.room_id))
    }

    pub async fn join(&self, member: Member) -> Result<JoinOutcome, RoomError> {
        self.request(|reply| RoomCommand::Join { member, reply }).await?
    }

    pub async fn leave(&self, user_id: UserId) -> Result<LeaveOutcome, RoomError> {
        self.request(|reply| RoomCommand::Leave { user_id, reply }).await?
    }

    /// Queues a player action (fire-and-forget).
    pub async fn send_event(&self, user_id: UserId, event: RoomEvent) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Event { user_id, event })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    pub async fn get_info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::GetInfo { reply }).await
    }

    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }
}

/// Questions for one round, back from the provider task.
struct RoundLoad {
    round: u8,
    result: Result<Vec<Question>, ProviderError>,
}

/// Players a room dropped from their disconnected seats, reported back to
/// the registry so they may sit down elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SeatRelease {
    pub room_id: RoomId,
    pub user_ids: Vec<UserId>,
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor<P> {
    room_id: RoomId,
    machine: GameMachine,
    /// Outbound channels of connected players.
    senders: HashMap<UserId, UserSender>,
    receiver: mpsc::Receiver<RoomCommand>,
    countdown: Countdown<PhaseTag>,
    loads_tx: mpsc::UnboundedSender<RoundLoad>,
    loads_rx: mpsc::UnboundedReceiver<RoundLoad>,
    releases: mpsc::UnboundedSender<SeatRelease>,
    provider: Arc<P>,
    provider_timeout: Duration,
}

impl<P> RoomActor<P>
where
    P: QuestionProvider + Send + Sync + 'static,
{
    async fn run(mut self, greeting: Step) {
        tracing::info!(room_id = %self.room_id, "room actor started");
        let mut stop = self.apply(greeting);

        while !stop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    stop = self.handle_command(cmd);
                }
                tick = self.countdown.wait_for_tick() => {
                    let step = self.machine.timer_tick(tick.tag, tick.remaining, tick.expired);
                    stop = self.apply(step);
                }
                Some(load) = self.loads_rx.recv() => {
                    let step = self.machine.round_loaded(load.round, load.result);
                    stop = self.apply(step);
                }
            }
        }

        tracing::info!(room_id = %self.room_id, "room actor stopped");
    }

    /// Returns true when the actor should stop.
    fn handle_command(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join { member, reply } => {
                let user_id = member.user_id();
                match self.machine.join(&member.identity, member.connection_id) {
                    Ok((outcome, step)) => {
                        self.senders.insert(user_id, member.sender);
                        let stop = self.apply(step);
                        let _ = reply.send(Ok(outcome));
                        stop
                    }
                    Err(err) => {
                        tracing::debug!(room_id = %self.room_id, %user_id, %err, "join rejected");
                        let _ = reply.send(Err(err));
                        false
                    }
                }
            }
            RoomCommand::Leave { user_id, reply } => match self.machine.leave(user_id) {
                Ok((outcome, step)) => {
                    self.senders.remove(&user_id);
                    let stop = self.apply(step);
                    let _ = reply.send(Ok(outcome));
                    stop
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                    false
                }
            },
            RoomCommand::Event { user_id, event } => match self.machine.handle_event(user_id, event) {
                Ok(step) => self.apply(step),
                Err(err) => {
                    tracing::debug!(room_id = %self.room_id, %user_id, %err, "event rejected");
                    self.send_to(user_id, RoomOutbound::Event(ServerEvent::error(err.status_code(), err.to_string())));
                    false
                }
            },
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.machine.info());
                false
            }
            RoomCommand::Shutdown => {
                tracing::info!(room_id = %self.room_id, "room shutting down");
                let closing = RoomOutbound::Event(ServerEvent::GameAborted {
                    reason: "room closed".into(),
                });
                for sender in self.senders.values() {
                    let _ = sender.send(closing.clone());
                }
                true
            }
        }
    }

    /// Delivers a step's events, then runs its effects. Returns true on
    /// teardown.
    fn apply(&mut self, step: Step) -> bool {
        for (recipient, event) in step.outbound {
            self.dispatch(recipient, event);
        }

        let mut teardown = false;
        for effect in step.effects {
            match effect {
                Effect::FetchRound {
                    round,
                    category,
                    difficulty,
                    count,
                } => {
                    tracing::debug!(room_id = %self.room_id, round, category = %category.id, %difficulty, count, "fetching questions");
                    let provider = Arc::clone(&self.provider);
                    let loads = self.loads_tx.clone();
                    let deadline = self.provider_timeout;
                    tokio::spawn(async move {
                        let result = tokio::time::timeout(deadline, provider.fetch_questions(&category.id, difficulty, count))
                            .await
                            .unwrap_or_else(|_| Err(ProviderError::Unavailable(format!("no questions within {deadline:?}"))));
                        let _ = loads.send(RoundLoad { round, result });
                    });
                }
                Effect::ArmTimer { tag, seconds } => {
                    self.countdown.arm(tag, seconds);
                }
                Effect::CancelTimer => {
                    self.countdown.cancel();
                }
                Effect::Disconnect { user_id, reason } => {
                    if let Some(sender) = self.senders.remove(&user_id) {
                        let _ = sender.send(RoomOutbound::Disconnect { reason });
                    }
                }
                Effect::ReleaseSeats { user_ids } => {
                    let _ = self.releases.send(SeatRelease {
                        room_id: self.room_id,
                        user_ids,
                    });
                }
                Effect::Teardown => teardown = true,
            }
        }
        teardown
    }

    fn dispatch(&self, recipient: Recipient, event: ServerEvent) {
        let room = self.machine.room();
        match recipient {
            Recipient::All => {
                for user in room.connected_users() {
                    self.send_to(user.user_id, RoomOutbound::Event(event.clone()));
                }
            }
            Recipient::AllExcept(excluded) => {
                for user in room.connected_users().filter(|u| u.user_id != excluded) {
                    self.send_to(user.user_id, RoomOutbound::Event(event.clone()));
                }
            }
            Recipient::User(user_id) => self.send_to(user_id, RoomOutbound::Event(event)),
            Recipient::Host => self.send_to(room.host_user_id, RoomOutbound::Event(event)),
        }
    }

    /// Silently drops if the player's handler is gone.
    fn send_to(&self, user_id: UserId, msg: RoomOutbound) {
        if let Some(sender) = self.senders.get(&user_id) {
            let _ = sender.send(msg);
        }
    }
}

/// Spawns a room actor with `host` seated and returns a handle to it.
///
/// `channel_size` bounds the command queue; senders wait when it is full.
/// Dropped seats are reported on `releases`.
pub(crate) fn spawn_room<P>(
    room_id: RoomId,
    host: Member,
    config: Arc<GameConfig>,
    provider: Arc<P>,
    releases: mpsc::UnboundedSender<SeatRelease>,
    channel_size: usize,
) -> RoomHandle
where
    P: QuestionProvider + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(channel_size);
    let (loads_tx, loads_rx) = mpsc::unbounded_channel();
    let countdown = Countdown::new(CountdownConfig {
        interval: config.countdown_interval,
    });
    let provider_timeout = config.provider_timeout;
    let (machine, greeting) = GameMachine::new(room_id, &host.identity, host.connection_id, config);

    let mut senders = HashMap::new();
    senders.insert(host.user_id(), host.sender);

    let actor = RoomActor {
        room_id,
        machine,
        senders,
        receiver: rx,
        countdown,
        loads_tx,
        loads_rx,
        releases,
        provider,
        provider_timeout,
    };
    tokio::spawn(actor.run(greeting));

    RoomHandle { room_id, sender: tx }
}
