//! Login, signup, and logout.

use axum::{Json, extract::State, http::HeaderMap};
use tracing::{error, info};

use crate::{
    AppState,
    api::models::auth::{AuthResponse, LoginInfo, LoginRequest, SessionCleared, SessionEstablished, SignupRequest, UserInfo},
    auth::middleware::{CurrentUser, session_token},
    auth::role::Role,
    backend::Credentials,
    errors::Error,
    routes,
    types::abbrev_uuid,
};

/// The login page
#[utoipa::path(
    get,
    path = "/auth",
    tag = "auth",
    responses(
        (status = 200, description = "Login page info", body = LoginInfo),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login_info(State(state): State<AppState>) -> Json<LoginInfo> {
    Json(LoginInfo {
        registration_enabled: state.config.auth.allow_registration,
    })
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<SessionEstablished, Error> {
    let session = state
        .backend
        .auth
        .sign_in(&Credentials {
            email: request.email,
            password: request.password,
        })
        .await?;

    // The role only decorates the response here; the gate resolves it
    // independently. Login must not fail because the profile store is slow.
    let role = state
        .backend
        .profiles
        .role_of(session.user_id)
        .await
        .ok()
        .flatten()
        .unwrap_or(Role::Unknown);

    info!(user_id = %abbrev_uuid(&session.user_id), "user signed in");
    let cookie = create_session_cookie(&session.access_token, &state.config);
    Ok(SessionEstablished {
        auth_response: AuthResponse {
            user: UserInfo {
                user_id: session.user_id,
                email: session.email,
                role,
            },
            redirect_to: routes::resume_target(request.from.as_deref()),
        },
        cookie,
    })
}

/// Register a new account. The chosen role is recorded once, here, and
/// never changes afterwards.
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input or email already registered"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn signup(State(state): State<AppState>, Json(request): Json<SignupRequest>) -> Result<SessionEstablished, Error> {
    if !state.config.auth.allow_registration {
        return Err(Error::BadRequest {
            message: "Registration is disabled".to_string(),
        });
    }

    let password_config = &state.config.auth.password;
    if request.password.len() < password_config.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", password_config.min_length),
        });
    }
    if request.password.len() > password_config.max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be no more than {} characters", password_config.max_length),
        });
    }
    if !request.role.is_known() {
        return Err(Error::BadRequest {
            message: "Role must be one of: programmer, company".to_string(),
        });
    }

    let session = state
        .backend
        .auth
        .sign_up(&Credentials {
            email: request.email,
            password: request.password,
        })
        .await?;

    // The one place a role is ever written. If it fails the account exists
    // without a profile; tear the session down so the client retries signup
    // resolution through support rather than browsing with an unknown role.
    if let Err(e) = state.backend.profiles.assign_role(session.user_id, request.role).await {
        error!(user_id = %abbrev_uuid(&session.user_id), "failed to record role at signup: {e}");
        let _ = state.backend.auth.sign_out(&session.access_token).await;
        return Err(e);
    }

    info!(user_id = %abbrev_uuid(&session.user_id), role = %request.role, "user registered");
    let cookie = create_session_cookie(&session.access_token, &state.config);
    Ok(SessionEstablished {
        auth_response: AuthResponse {
            user: UserInfo {
                user_id: session.user_id,
                email: session.email,
                role: request.role,
            },
            redirect_to: routes::resume_target(request.from.as_deref()),
        },
        cookie,
    })
}

/// Logout and clear the session cookie. Safe to call without a session.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logout successful"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<SessionCleared, Error> {
    if let Some(token) = session_token(&headers, &state.config.auth.session.cookie_name) {
        state.backend.auth.sign_out(&token).await?;
    }
    Ok(SessionCleared {
        cookie: clear_session_cookie(&state.config),
    })
}

/// The authenticated user behind the current session
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserInfo),
        (status = 401, description = "Not authenticated"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn me(current_user: CurrentUser) -> Json<UserInfo> {
    Json(UserInfo {
        user_id: current_user.user_id,
        email: current_user.email,
        role: current_user.role,
    })
}

fn create_session_cookie(token: &str, config: &crate::config::Config) -> String {
    let session_config = &config.auth.session;
    let max_age = session_config.timeout.as_secs();

    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age={}",
        session_config.cookie_name, token, session_config.cookie_same_site, max_age
    );
    // Cookie parsers match Secure by attribute name alone; "Secure=false"
    // would still mark the cookie Secure, so the attribute must be omitted
    // entirely when disabled.
    if session_config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn clear_session_cookie(config: &crate::config::Config) -> String {
    let session_config = &config.auth.session;
    let mut cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite={}; Max-Age=0",
        session_config.cookie_name, session_config.cookie_same_site
    );
    if session_config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_session_cookie_secure_only_when_configured() {
        let mut config = Config::default();
        config.auth.session.cookie_secure = true;
        let cookie = create_session_cookie("tok123", &config);
        assert!(cookie.ends_with("; Secure"));

        config.auth.session.cookie_secure = false;
        let cookie = create_session_cookie("tok123", &config);
        assert!(!cookie.contains("Secure"));
        assert!(cookie.starts_with("aiguild_session=tok123; "));
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        let mut config = Config::default();
        config.auth.session.cookie_secure = false;
        let cookie = clear_session_cookie(&config);
        assert!(cookie.starts_with("aiguild_session=; "));
        assert!(cookie.contains("Max-Age=0"));
        assert!(!cookie.contains("Secure"));
    }
}
