//! Authentication seam.
//!
//! Login and cookie issuance live outside this server. The handshake hands
//! the opaque token it received to an [`Authenticator`], which answers with
//! the user's [`Identity`] or refuses.

use crushparty_protocol::UserId;

use crate::{Identity, SessionError};

/// Validates a handshake token and returns the user's identity.
///
/// ```rust
/// use crushparty_protocol::UserId;
/// use crushparty_session::{Authenticator, Identity, SessionError};
///
/// struct GuestAuthenticator;
///
/// impl Authenticator for GuestAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
///         let id: u64 = token
///             .parse()
///             .map_err(|_| SessionError::AuthFailed("guest token must be a number".into()))?;
///         Ok(Identity::new(UserId(id), format!("guest-{id}"), "default"))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send;
}

/// Development authenticator that trusts `"<id>:<username>:<avatar>"`
/// tokens verbatim. Never expose it to the internet.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevAuthenticator;

impl DevAuthenticator {
    fn parse(token: &str) -> Result<Identity, SessionError> {
        let mut parts = token.splitn(3, ':');
        let id = parts
            .next()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .ok_or_else(|| SessionError::AuthFailed("token must start with a numeric user id".into()))?;
        let username = parts
            .next()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| SessionError::AuthFailed("token is missing a username".into()))?;
        let avatar = parts
            .next()
            .map(str::trim)
            .filter(|avatar| !avatar.is_empty())
            .unwrap_or("default");
        Ok(Identity::new(UserId(id), username, avatar))
    }
}

impl Authenticator for DevAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
        Self::parse(token)
    }
}
