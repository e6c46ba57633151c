//! Wire protocol for Crush Party.
//!
//! - **Types**: ids ([`UserId`], [`RoomId`], [`CrushId`]), [`Phase`],
//!   [`Difficulty`], [`Recipient`] and the [`Envelope`] frame wrapper.
//! - **Events**: [`ClientEvent`] (browser → server) and [`ServerEvent`]
//!   (server → browser).
//! - **Views**: read-only snapshots of room state embedded in events.
//! - **Codec**: [`Codec`] / [`JsonCodec`].
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope<ClientEvent>) → Room actors
//! ```

mod codec;
mod error;
mod events;
mod types;
mod views;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use crushparty_transport::ConnectionId;
pub use error::ProtocolError;
pub use events::{ClientEvent, ServerEvent};
pub use types::{CrushId, Difficulty, Envelope, Phase, Recipient, RoomId, UserId};
pub use views::{ClientQuestion, CrushCard, RoomSummary, RoomView, Standing, UserView};

/// Protocol version a client must announce in its handshake.
pub const PROTOCOL_VERSION: u32 = 1;
