//! # Crush Party
//!
//! Session orchestration server for a browser party trivia game: lobby
//! rooms, seats and hosts, crush voting, three escalating trivia rounds
//! with lounge intermissions, and a victory screen, all pushed to players
//! over WebSockets.
//!
//! The crate ties the layers together; each layer is its own crate and is
//! re-exported here:
//!
//! - [`transport`]: WebSocket connections
//! - [`protocol`]: ids, events, views, codec
//! - [`session`]: authentication and the user registry
//! - [`room`]: room actors, the registry and the game state machine
//! - [`timer`]: the phase countdown
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crushparty::prelude::*;
//!
//! # async fn start() -> Result<(), PartyError> {
//! let server = PartyServerBuilder::new()
//!     .bind("0.0.0.0:3000")
//!     .build(DevAuthenticator, StaticQuestionBank::default())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use crushparty_protocol as protocol;
pub use crushparty_room as room;
pub use crushparty_session as session;
pub use crushparty_timer as timer;
pub use crushparty_transport as transport;

pub use error::PartyError;
pub use server::{PartyServer, PartyServerBuilder};

pub mod prelude {
    pub use crate::{PartyError, PartyServer, PartyServerBuilder};
    pub use crushparty_protocol::{
        ClientEvent, CrushId, Difficulty, Envelope, Phase, RoomId, ServerEvent, UserId, PROTOCOL_VERSION,
    };
    pub use crushparty_room::{
        GameConfig, PointsTable, ProviderError, Question, QuestionProvider, RoomError, StaticQuestionBank,
    };
    pub use crushparty_session::{Authenticator, DevAuthenticator, Identity, SessionError};
}
