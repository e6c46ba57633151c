//! Who is connected, and as whom.
//!
//! 1. **Authentication**: the [`Authenticator`] seam turns a handshake
//!    token into an [`Identity`]. Issuing those tokens is somebody else's
//!    job (the web app's login flow).
//! 2. **Registry**: [`UserRegistry`] maps live connections to identities
//!    and back, enforcing one live connection per user.
//!
//! ```text
//! Room layer (above)      ← asks "which user is on this connection?"
//!     ↕
//! Session layer (here)    ← identity and connection bookkeeping
//!     ↕
//! Protocol layer (below)  ← UserId, ConnectionId
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod registry;
mod session;

pub use auth::{Authenticator, DevAuthenticator};
pub use error::SessionError;
pub use registry::UserRegistry;
pub use session::{Identity, RegisteredUser};
