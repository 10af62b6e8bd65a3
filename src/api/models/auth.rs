//! Login, signup, and session payloads.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::role::Role;
use crate::types::UserId;

/// What the login page needs to render itself.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginInfo {
    pub registration_enabled: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Path preserved by the login redirect; login resumes there on success
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    /// Capability class, fixed for the lifetime of the account
    pub role: Role,
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserInfo {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
}

/// Body returned by login and signup.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserInfo,
    /// Where the client should navigate next
    pub redirect_to: String,
}

/// Auth response plus the session cookie that carries it.
#[derive(Debug)]
pub struct SessionEstablished {
    pub auth_response: AuthResponse,
    pub cookie: String,
}

impl IntoResponse for SessionEstablished {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::OK, Json(self.auth_response)).into_response();
        if let Ok(value) = self.cookie.parse() {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        response
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutBody {
    pub message: String,
}

/// Logout confirmation plus the expired cookie that clears the session.
#[derive(Debug)]
pub struct SessionCleared {
    pub cookie: String,
}

impl IntoResponse for SessionCleared {
    fn into_response(self) -> Response {
        let body = LogoutBody {
            message: "Signed out".to_string(),
        };
        let mut response = (StatusCode::OK, Json(body)).into_response();
        if let Ok(value) = self.cookie.parse() {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        response
    }
}
