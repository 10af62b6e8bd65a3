//! Route guards.
//!
//! Guards sit in front of page routes and turn the gate's
//! [`AccessDecision`] into HTTP behavior: pass the request through with a
//! [`CurrentUser`] attached, or redirect. A deferring gate is waited out
//! with a bound slightly above the role lookup timeout, so the gate itself
//! always settles first unless session resolution is hanging outright.

use std::time::Duration;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::HeaderMap,
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, trace};

use crate::{
    AppState,
    auth::gate::AccessDecision,
    auth::role::Role,
    errors::Error,
    routes,
    types::UserId,
};

/// Extra wait on top of the role lookup timeout before a deferring gate is
/// treated as unavailable.
const GUARD_WAIT_MARGIN: Duration = Duration::from_secs(1);

const ANY_AUTHENTICATED: &[Role] = &[];
const PROGRAMMER_ONLY: &[Role] = &[Role::Programmer];
const COMPANY_ONLY: &[Role] = &[Role::Company];

/// The authenticated user attached to a request that passed a guard.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: UserId,
    pub email: String,
    /// Resolved role; [`Role::Unknown`] when resolution degraded.
    pub role: Role,
    pub access_token: String,
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(Error::Unauthenticated { message: None })
    }
}

/// Pull the session token out of the request cookies.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let cookies = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == cookie_name && !value.is_empty()).then(|| value.to_string())
    })
}

/// Guard for routes any authenticated user may reach.
pub async fn require_session(State(state): State<AppState>, request: Request, next: Next) -> Response {
    guard(state, ANY_AUTHENTICATED, request, next).await
}

/// Guard for programmer-only routes.
pub async fn require_programmer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    guard(state, PROGRAMMER_ONLY, request, next).await
}

/// Guard for company-only routes.
pub async fn require_company(State(state): State<AppState>, request: Request, next: Next) -> Response {
    guard(state, COMPANY_ONLY, request, next).await
}

async fn guard(state: AppState, required: &'static [Role], mut request: Request, next: Next) -> Response {
    let from = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();

    let Some(token) = session_token(request.headers(), &state.config.auth.session.cookie_name) else {
        trace!(%from, "no session cookie, redirecting to login");
        return routes::login_redirect(&from).into_response();
    };

    let gate = state.gates.gate_for(&token).await;
    let mut decision = gate.authorize(required);
    if decision == AccessDecision::Defer {
        let bound = state.config.auth.role_lookup_timeout + GUARD_WAIT_MARGIN;
        gate.wait_ready(bound).await;
        decision = gate.authorize(required);
    }

    match decision {
        AccessDecision::Allow => {
            let snapshot = gate.snapshot();
            match snapshot.session {
                Some(session) => {
                    request.extensions_mut().insert(CurrentUser {
                        user_id: session.user_id,
                        email: session.email,
                        role: snapshot.role.unwrap_or(Role::Unknown),
                        access_token: token,
                    });
                    next.run(request).await
                }
                // Signed out between the decision and the snapshot
                None => routes::login_redirect(&from).into_response(),
            }
        }
        AccessDecision::Defer => {
            // Still loading after the bounded wait; session resolution is
            // hanging, not just a slow role lookup
            Error::AuthServiceUnavailable {
                operation: "session resolution".to_string(),
            }
            .into_response()
        }
        AccessDecision::RedirectToLogin => {
            trace!(%from, "unrecognized session, redirecting to login");
            routes::login_redirect(&from).into_response()
        }
        AccessDecision::RedirectToDefaultWithNotice => {
            debug!(%from, ?required, "role requirement not met, redirecting with notice");
            routes::notice_redirect().into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_session_token_extraction() {
        let headers = headers_with_cookie("theme=dark; aiguild_session=tok123; lang=en");
        assert_eq!(session_token(&headers, "aiguild_session"), Some("tok123".to_string()));
        assert_eq!(session_token(&headers, "other_cookie"), None);
    }

    #[test]
    fn test_session_token_missing_or_empty() {
        assert_eq!(session_token(&HeaderMap::new(), "aiguild_session"), None);
        let headers = headers_with_cookie("aiguild_session=");
        assert_eq!(session_token(&headers, "aiguild_session"), None);
    }
}
