//! Rooms for Crush Party.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns the
//! party game for the players seated in it.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates and tracks rooms, enforces one room per player
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`GameMachine`]: the pure phase machine (Lobby, Voting, Trivia, Lounge, Victory)
//! - [`GameConfig`]: player limits, round lengths, scoring, the crush roster
//! - [`QuestionProvider`]: where trivia questions come from

mod config;
mod error;
mod leaderboard;
mod machine;
mod manager;
mod narrative;
mod room;
mod state;
mod trivia;
mod voting;

pub use config::{default_crushes, Category, Crush, GameConfig, PointsTable};
pub use error::RoomError;
pub use leaderboard::compute_standings;
pub use machine::{
    Effect, GameMachine, JoinOutcome, LeaveOutcome, PhaseTag, RoomEvent, RoomInfo, Step, LAST_ROUND,
};
pub use manager::{summarize_rooms, RoomRegistry, DEFAULT_CHANNEL_SIZE};
pub use narrative::{lounge_dialogue, victory_summary};
pub use room::{Member, RoomHandle, RoomOutbound, UserSender};
pub use state::{GameState, Room, User};
pub use trivia::{ProviderError, Question, QuestionProvider, QuestionSet, StaticQuestionBank};
pub use voting::{Ballot, VoteOutcome};
