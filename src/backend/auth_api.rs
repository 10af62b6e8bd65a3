//! Auth service contract.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::broadcast;
use utoipa::ToSchema;

use crate::auth::session::{Session, SessionEvent};
use crate::errors::Result;

/// Email and password pair supplied by a login or signup request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Contract with the external authentication service.
///
/// The service owns credentials and token lifecycles. This process never
/// inspects token contents beyond what [`AuthApi::current_session`] returns,
/// and it learns about session transitions through the broadcast stream
/// returned by [`AuthApi::subscribe`].
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Resolve an access token to its session. Returns `Ok(None)` for
    /// tokens the service does not recognize (expired, revoked, garbage);
    /// errors are reserved for the service itself being unreachable.
    async fn current_session(&self, access_token: &str) -> Result<Option<Session>>;

    /// Subscribe to session lifecycle events. Every sign-in, token refresh,
    /// and sign-out processed by the service is broadcast to subscribers.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Authenticate with credentials and establish a session.
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session>;

    /// Register a new account and establish its first session.
    async fn sign_up(&self, credentials: &Credentials) -> Result<Session>;

    /// Terminate the session behind the token. Succeeds even if the token
    /// is already invalid; sign-out is idempotent.
    async fn sign_out(&self, access_token: &str) -> Result<()>;
}
