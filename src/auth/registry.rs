//! Per-session gate registry.
//!
//! Each client session token gets one [`AuthGate`]. The registry creates
//! gates lazily on first request, then feeds them session lifecycle events
//! from the auth service so state transitions reach the right gate. A
//! sign-out removes the gate entirely; a later request with the stale
//! cookie builds a fresh gate that settles anonymous.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::gate::AuthGate;
use crate::auth::session::SessionEvent;
use crate::backend::{AuthApi, ProfileApi};

pub struct SessionGates {
    auth: Arc<dyn AuthApi>,
    profiles: Arc<dyn ProfileApi>,
    lookup_timeout: Duration,
    gates: DashMap<String, Arc<AuthGate>>,
    shutdown: CancellationToken,
}

impl SessionGates {
    /// Build the registry and start its event dispatch loop. The loop runs
    /// until `shutdown` is cancelled.
    pub fn new(
        auth: Arc<dyn AuthApi>,
        profiles: Arc<dyn ProfileApi>,
        lookup_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let registry = Arc::new(Self {
            auth,
            profiles,
            lookup_timeout,
            gates: DashMap::new(),
            shutdown,
        });
        registry.spawn_event_loop();
        registry
    }

    /// The gate for an access token, created and initialized on first use.
    ///
    /// Concurrent requests with the same token share one gate; only the
    /// request that created it runs the initial session resolution, the
    /// rest observe the loading state through the gate's watch channel.
    pub async fn gate_for(&self, access_token: &str) -> Arc<AuthGate> {
        if let Some(gate) = self.gates.get(access_token) {
            return Arc::clone(gate.value());
        }

        let gate = AuthGate::new(Arc::clone(&self.auth), Arc::clone(&self.profiles), self.lookup_timeout);
        let created = match self.gates.entry(access_token.to_string()) {
            Entry::Occupied(existing) => return Arc::clone(existing.get()),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&gate));
                gate
            }
        };

        if let Err(e) = created.initialize(access_token).await {
            // The gate settled anonymous; the request proceeds as if the
            // token were unrecognized.
            warn!("session resolution failed, treating session as anonymous: {e}");
        }
        created
    }

    fn spawn_event_loop(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        let mut events = registry.auth.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = registry.shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => registry.dispatch(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // Dropped events can strand gates in stale state;
                            // clearing them forces re-resolution on next use.
                            warn!(skipped, "session event stream lagged, resetting all gates");
                            registry.gates.clear();
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            debug!("session event loop stopped");
        });
    }

    fn dispatch(&self, event: SessionEvent) {
        let token = event.access_token().to_string();
        match &event {
            SessionEvent::SignedOut { .. } => {
                if let Some((_, gate)) = self.gates.remove(&token) {
                    gate.on_session_changed(event);
                }
            }
            SessionEvent::SignedIn(_) | SessionEvent::TokenRefreshed(_) => {
                if let Some(gate) = self.gates.get(&token) {
                    gate.on_session_changed(event);
                }
            }
        }
    }

    /// Number of live gates, for observability.
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::gate::AccessDecision;
    use crate::auth::role::Role;
    use crate::backend::Credentials;
    use crate::backend::memory::{InMemoryAuthService, InMemoryProfileStore};

    const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

    struct Fixture {
        auth: Arc<InMemoryAuthService>,
        profiles: Arc<InMemoryProfileStore>,
        gates: Arc<SessionGates>,
        _shutdown: CancellationToken,
    }

    fn fixture() -> Fixture {
        let auth = Arc::new(InMemoryAuthService::new("test-secret".to_string(), Duration::from_secs(3600)));
        let profiles = Arc::new(InMemoryProfileStore::default());
        let shutdown = CancellationToken::new();
        let gates = SessionGates::new(
            Arc::clone(&auth) as Arc<dyn crate::backend::AuthApi>,
            Arc::clone(&profiles) as Arc<dyn crate::backend::ProfileApi>,
            LOOKUP_TIMEOUT,
            shutdown.clone(),
        );
        Fixture {
            auth,
            profiles,
            gates,
            _shutdown: shutdown,
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            email: "dev@example.com".to_string(),
            password: "hunter2hunter2".to_string(),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[test_log::test(tokio::test)]
    async fn test_gate_resolves_signed_in_session() {
        let f = fixture();
        let session = f.auth.sign_up(&credentials()).await.unwrap();
        f.profiles.assign_role(session.user_id, Role::Programmer).await.unwrap();

        let gate = f.gates.gate_for(&session.access_token).await;
        let state = gate.wait_ready(Duration::from_secs(1)).await;
        assert_eq!(state.role, Some(Role::Programmer));
        assert_eq!(gate.authorize(&[Role::Programmer]), AccessDecision::Allow);
        assert_eq!(f.gates.len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_same_token_shares_one_gate() {
        let f = fixture();
        let session = f.auth.sign_up(&credentials()).await.unwrap();
        f.profiles.assign_role(session.user_id, Role::Company).await.unwrap();

        let first = f.gates.gate_for(&session.access_token).await;
        let second = f.gates.gate_for(&session.access_token).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(f.gates.len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_unknown_token_settles_anonymous() {
        let f = fixture();
        let gate = f.gates.gate_for("garbage-token").await;
        let state = gate.wait_ready(Duration::from_secs(1)).await;
        assert!(state.session.is_none());
        assert_eq!(gate.authorize(&[]), AccessDecision::RedirectToLogin);
    }

    #[test_log::test(tokio::test)]
    async fn test_sign_out_clears_gate() {
        let f = fixture();
        let session = f.auth.sign_up(&credentials()).await.unwrap();
        f.profiles.assign_role(session.user_id, Role::Programmer).await.unwrap();

        let gate = f.gates.gate_for(&session.access_token).await;
        gate.wait_ready(Duration::from_secs(1)).await;

        f.auth.sign_out(&session.access_token).await.unwrap();
        settle().await;

        // The old gate saw the sign-out and the registry dropped it
        assert_eq!(gate.authorize(&[]), AccessDecision::RedirectToLogin);
        assert!(f.gates.is_empty());

        // A request still carrying the cookie gets a fresh anonymous gate
        let stale = f.gates.gate_for(&session.access_token).await;
        let state = stale.wait_ready(Duration::from_secs(1)).await;
        assert!(state.session.is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_refresh_event_reaches_existing_gate() {
        let f = fixture();
        let session = f.auth.sign_up(&credentials()).await.unwrap();
        f.profiles.assign_role(session.user_id, Role::Company).await.unwrap();

        let gate = f.gates.gate_for(&session.access_token).await;
        gate.wait_ready(Duration::from_secs(1)).await;

        let refreshed = f.auth.refresh(&session.access_token).unwrap();
        settle().await;

        let state = gate.snapshot();
        assert!(!state.loading);
        assert_eq!(state.role, Some(Role::Company));
        assert_eq!(state.session.as_ref().map(|s| s.expires_at), Some(refreshed.expires_at));
    }
}
