use std::fmt::{self, Display};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::error::AuthError;

/// Opaque, stable id handed out by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_anonymous(&self) -> Result<UserId, AuthError>;

    async fn sign_in_with_token(&self, token: &str) -> Result<UserId, AuthError>;

    fn sign_out(&self);

    /// Current user, `None` while signed out. Receivers see every later change.
    fn on_auth_change(&self) -> watch::Receiver<Option<UserId>>;
}

/// Provider that never leaves the process. Anonymous users get a fresh UUID,
/// tokens are taken as the user id itself.
pub struct LocalIdentity {
    current: watch::Sender<Option<UserId>>,
}

impl LocalIdentity {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);

        Self { current }
    }

    fn set(&self, user: UserId) -> UserId {
        self.current.send_replace(Some(user.clone()));

        user
    }
}

impl Default for LocalIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    async fn sign_in_anonymous(&self) -> Result<UserId, AuthError> {
        let user = UserId::new(Uuid::new_v4().simple().to_string());
        info!("Signed in anonymously as {user}");

        Ok(self.set(user))
    }

    async fn sign_in_with_token(&self, token: &str) -> Result<UserId, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Rejected("empty token".into()));
        }

        info!("Signed in with token as {token}");

        Ok(self.set(UserId::new(token)))
    }

    fn sign_out(&self) {
        self.current.send_replace(None);
    }

    fn on_auth_change(&self) -> watch::Receiver<Option<UserId>> {
        self.current.subscribe()
    }
}
