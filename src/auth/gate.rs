//! Session authorization gate.
//!
//! An [`AuthGate`] tracks the authorization state of one client session:
//! whether a session exists, what role its user holds, and whether a role
//! lookup is still in flight. Route guards ask the gate for an
//! [`AccessDecision`] instead of inspecting sessions themselves.
//!
//! Session lifecycle events arrive out of band from the auth service, and
//! role lookups run against the profile store, so transitions can overlap.
//! The gate orders them with a generation counter: every transition claims
//! the next generation synchronously, and a lookup result is applied only
//! if its generation is still current when it lands. Later events always
//! win; a stale result is discarded, never merged.
//!
//! A lookup that fails or exceeds its bounded wait settles the role as
//! [`Role::Unknown`], which satisfies no role requirement. Degraded
//! infrastructure can therefore never widen access.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::auth::role::Role;
use crate::auth::session::{Session, SessionEvent};
use crate::backend::{AuthApi, ProfileApi};
use crate::errors::Result;
use crate::types::{UserId, abbrev_uuid};

/// Authorization state of one client session.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationState {
    /// The authenticated session, if any. `None` means anonymous.
    pub session: Option<Session>,
    /// Role resolved from the profile store. Only meaningful alongside a
    /// session; settles to [`Role::Unknown`] when resolution fails.
    pub role: Option<Role>,
    /// A session resolution or role lookup is still in flight. No access
    /// is granted or denied until this clears.
    pub loading: bool,
}

impl AuthorizationState {
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

/// What a route guard should do with the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Let the request through.
    Allow,
    /// State is still loading; wait and ask again.
    Defer,
    /// No session. Send the client to the login page, preserving the
    /// requested path so login can resume it.
    RedirectToLogin,
    /// Authenticated but the role does not meet the requirement. Send the
    /// client to the default page with a notice.
    RedirectToDefaultWithNotice,
}

/// Authorization gate for a single session token.
pub struct AuthGate {
    auth: Arc<dyn AuthApi>,
    profiles: Arc<dyn ProfileApi>,
    state: watch::Sender<AuthorizationState>,
    /// Claimed synchronously by every transition; lookup results carry the
    /// generation they were started under and are discarded if it is no
    /// longer current.
    generation: AtomicU64,
    lookup_timeout: Duration,
}

impl AuthGate {
    pub fn new(auth: Arc<dyn AuthApi>, profiles: Arc<dyn ProfileApi>, lookup_timeout: Duration) -> Arc<Self> {
        // Born loading: until initialize settles, every authorization defers.
        let (state, _) = watch::channel(AuthorizationState {
            session: None,
            role: None,
            loading: true,
        });
        Arc::new(Self {
            auth,
            profiles,
            state,
            generation: AtomicU64::new(0),
            lookup_timeout,
        })
    }

    /// Resolve the token this gate was created for and settle the initial
    /// state. Runs once per gate; until it settles the state reports
    /// loading and every authorization defers.
    pub async fn initialize(self: &Arc<Self>, access_token: &str) -> Result<()> {
        match self.auth.current_session(access_token).await {
            Ok(Some(session)) => {
                self.apply_session(session);
                Ok(())
            }
            Ok(None) => {
                self.transition_to_anonymous();
                Ok(())
            }
            Err(e) => {
                // An unreachable auth service settles the gate anonymous
                // rather than leaving it deferring forever.
                self.transition_to_anonymous();
                Err(e)
            }
        }
    }

    /// Watch the state. Guards use this to wait out the loading phase.
    pub fn subscribe(&self) -> watch::Receiver<AuthorizationState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> AuthorizationState {
        self.state.borrow().clone()
    }

    /// Apply a session lifecycle event.
    ///
    /// A refresh that keeps the same user updates the stored session and
    /// nothing else: the resolved role stays, and no second role lookup is
    /// issued. Everything else is a full transition that supersedes any
    /// lookup still in flight.
    pub fn on_session_changed(self: &Arc<Self>, event: SessionEvent) {
        match event {
            SessionEvent::SignedOut { .. } => self.transition_to_anonymous(),
            SessionEvent::SignedIn(session) | SessionEvent::TokenRefreshed(session) => self.apply_session(session),
        }
    }

    /// Adopt a resolved session. If the stored session already belongs to
    /// the same user, only the session is replaced: the resolved role (or
    /// the lookup already in flight for it) stands, and no second lookup
    /// is issued. This also covers a session event landing while
    /// `initialize` is still resolving the same token.
    fn apply_session(self: &Arc<Self>, session: Session) {
        let same_user = self.state.borrow().session.as_ref().is_some_and(|s| s.user_id == session.user_id);
        if same_user {
            debug!(user_id = %abbrev_uuid(&session.user_id), "session updated in place, keeping resolved role");
            self.state.send_modify(|state| state.session = Some(session));
        } else {
            self.transition_to_session(session);
        }
    }

    /// Enter the authenticated-but-unresolved state and start the role
    /// lookup for it. The generation is claimed before the lookup is
    /// spawned, so a transition that arrives later always supersedes it.
    fn transition_to_session(self: &Arc<Self>, session: Session) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let user_id = session.user_id;
        self.state.send_replace(AuthorizationState {
            session: Some(session),
            role: None,
            loading: true,
        });

        let gate = Arc::clone(self);
        tokio::spawn(async move {
            let role = gate.resolve_role(user_id).await;
            gate.apply_role(generation, user_id, role);
        });
    }

    /// Enter the anonymous state, superseding any lookup in flight.
    fn transition_to_anonymous(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(AuthorizationState::default());
    }

    /// Resolve a user's role with a bounded wait. Never errors: a missing
    /// profile, a store failure, and a timeout all degrade to
    /// [`Role::Unknown`].
    async fn resolve_role(&self, user_id: UserId) -> Role {
        match tokio::time::timeout(self.lookup_timeout, self.profiles.role_of(user_id)).await {
            Ok(Ok(Some(role))) => role,
            Ok(Ok(None)) => {
                warn!(user_id = %abbrev_uuid(&user_id), "no profile record, treating role as unknown");
                Role::Unknown
            }
            Ok(Err(e)) => {
                warn!(user_id = %abbrev_uuid(&user_id), "role lookup failed, treating role as unknown: {e}");
                Role::Unknown
            }
            Err(_) => {
                warn!(
                    user_id = %abbrev_uuid(&user_id),
                    timeout = ?self.lookup_timeout,
                    "role lookup timed out, treating role as unknown"
                );
                Role::Unknown
            }
        }
    }

    /// Settle a lookup result, unless a later transition claimed the
    /// generation in the meantime.
    fn apply_role(&self, generation: u64, user_id: UserId, role: Role) {
        let applied = self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            state.role = Some(role);
            state.loading = false;
            true
        });
        if !applied {
            debug!(user_id = %abbrev_uuid(&user_id), generation, "discarding stale role lookup result");
        }
    }

    /// Wait until the state settles or the bound expires, then return
    /// whatever the state is. Callers see `loading` still set when the
    /// bound expired first.
    pub async fn wait_ready(&self, bound: Duration) -> AuthorizationState {
        let mut rx = self.state.subscribe();
        let deadline = tokio::time::Instant::now() + bound;
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if !snapshot.loading {
                return snapshot;
            }
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => continue,
                // Bound expired, or the gate was dropped
                _ => return self.state.borrow().clone(),
            }
        }
    }

    /// Decide access for a route requiring one of `required`. Rules apply
    /// in order:
    ///
    /// 1. loading state defers, it never allows or denies
    /// 2. no session, or an expired one, redirects to login
    /// 3. an empty requirement admits any authenticated user
    /// 4. otherwise the resolved role must be one of the required roles
    pub fn authorize(&self, required: &[Role]) -> AccessDecision {
        let state = self.state.borrow();
        if state.loading {
            return AccessDecision::Defer;
        }
        match &state.session {
            None => return AccessDecision::RedirectToLogin,
            // The auth service emits no event when a session merely
            // expires, so the stored expiry has to be checked here.
            Some(session) if session.expires_at <= Utc::now() => return AccessDecision::RedirectToLogin,
            Some(_) => {}
        }
        if required.is_empty() {
            return AccessDecision::Allow;
        }
        match state.role {
            Some(role) if required.contains(&role) => AccessDecision::Allow,
            _ => AccessDecision::RedirectToDefaultWithNotice,
        }
    }
}
