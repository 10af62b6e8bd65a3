//! Shared helpers for integration-style tests.
//!
//! Everything here runs against the in-memory backend with a fast role
//! lookup timeout so guard tests settle quickly.

use std::sync::Arc;

use axum_test::{TestResponse, TestServer};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::auth::registry::SessionGates;
use crate::auth::role::Role;
use crate::backend::Backend;
use crate::config::Config;
use crate::types::UserId;
use crate::{AppState, create_router};

pub const TEST_PASSWORD: &str = "correct horse battery staple";

/// Configuration for tests: in-memory backend, insecure cookies, and a
/// short role lookup timeout.
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.secret_key = Some("test-secret-key".to_string());
    config.auth.session.cookie_secure = false;
    config.auth.role_lookup_timeout = std::time::Duration::from_millis(500);
    config
}

/// Application state backed by fresh in-memory stores.
pub fn create_test_state() -> AppState {
    let config = create_test_config();
    let backend = Backend::in_memory(&config).expect("in-memory backend should build");
    let gates = SessionGates::new(
        Arc::clone(&backend.auth),
        Arc::clone(&backend.profiles),
        config.auth.role_lookup_timeout,
        CancellationToken::new(),
    );
    AppState::builder().config(config).backend(backend).gates(gates).build()
}

/// A test server plus the state behind it, for tests that want to reach
/// into the stores directly.
pub async fn create_test_app() -> (TestServer, AppState) {
    let state = create_test_state();
    let router = create_router(state.clone()).expect("router should build");
    let server = TestServer::new(router).expect("test server should start");
    (server, state)
}

/// A signed-up test account and the session cookie that identifies it.
pub struct TestUser {
    pub user_id: UserId,
    pub email: String,
    cookie: String,
}

impl TestUser {
    /// Value for the `Cookie` request header.
    pub fn cookie_header(&self) -> String {
        self.cookie.clone()
    }
}

/// Register an account through the signup endpoint and capture its
/// session cookie.
pub async fn signup(server: &TestServer, email: &str, role: Role) -> TestUser {
    let response = server
        .post("/auth/signup")
        .json(&json!({
            "email": email,
            "password": TEST_PASSWORD,
            "role": role,
        }))
        .await;
    assert_eq!(response.status_code(), axum::http::StatusCode::OK, "signup for {email} failed");

    let set_cookie = response
        .header(axum::http::header::SET_COOKIE)
        .to_str()
        .expect("cookie should be ascii")
        .to_string();
    let cookie = set_cookie.split(';').next().expect("cookie pair").to_string();

    let body: serde_json::Value = response.json();
    let user_id = body["user"]["user_id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("signup response should carry the user id");

    TestUser {
        user_id,
        email: email.to_string(),
        cookie,
    }
}

/// GET a path with the user's session cookie attached.
pub async fn get_as(server: &TestServer, user: &TestUser, path: &str) -> TestResponse {
    server
        .get(path)
        .add_header(axum::http::header::COOKIE, user.cookie_header())
        .await
}
