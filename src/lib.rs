//! # aiguild: backend for the AI Guild quest marketplace
//!
//! `aiguild` is the server behind a small job marketplace where companies
//! post "quests" (work postings), programmers apply to them, team up in
//! parties, and message each other. It serves page data as JSON to the web
//! client and owns every access decision the client used to guess at.
//!
//! ## Overview
//!
//! Accounts come in exactly two capability classes, fixed at signup:
//! `programmer` and `company`. Each page route has a guard: some pages are
//! public, some need any session, and some need a specific role. A client
//! that fails a guard is redirected rather than errored: to the login page
//! (preserving the requested path) when no session exists, or to the home
//! page with a notice when the role does not match.
//!
//! ## Architecture
//!
//! The HTTP layer is built on [Axum](https://github.com/tokio-rs/axum).
//! Identity and records live in external collaborators behind the trait
//! seams in [`backend`]: an auth service owning credentials and tokens, a
//! profile store holding the one-role-per-user mapping, and stores for
//! quests, party requests, and messages. They are served from process
//! memory in development and tests, or by a hosted GoTrue/PostgREST-style
//! backend in production.
//!
//! ### Session gates
//!
//! The heart of the crate is the authorization gate ([`auth::gate`]). Each
//! session token gets one gate that tracks the session, the resolved role,
//! and whether resolution is still in flight. Sign-ins, token refreshes,
//! and sign-outs arrive as events from the auth service; role lookups run
//! concurrently against the profile store. The gate serializes these with
//! a generation counter so the latest event always wins and a stale lookup
//! result is discarded, never merged. While a gate is loading, guards
//! defer instead of guessing; when a lookup fails or times out, the role
//! settles as unknown and grants nothing.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use aiguild::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = aiguild::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     aiguild::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod errors;
mod openapi;
pub mod routes;
pub mod telemetry;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::sync::Arc;

use axum::{
    Router,
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};
use bon::Builder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

use crate::auth::middleware::{require_company, require_programmer, require_session};
use crate::auth::registry::SessionGates;
use crate::backend::Backend;
use crate::openapi::ApiDoc;
pub use config::Config;
pub use types::{MessageId, PartyRequestId, QuestId, UserId};

/// Application state shared across all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub backend: Backend,
    pub gates: Arc<SessionGates>,
}

/// Create CORS layer from configuration. Returns `None` when no origins
/// are configured.
fn create_cors_layer(config: &Config) -> anyhow::Result<Option<CorsLayer>> {
    if config.cors.allowed_origins.is_empty() {
        return Ok(None);
    }

    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        origins.push(origin.parse::<HeaderValue>()?);
    }

    Ok(Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(config.cors.allow_credentials)
            .expose_headers(vec![axum::http::header::LOCATION]),
    ))
}

/// Build the application router: public routes, the three guarded route
/// groups, API docs, CORS, and tracing.
pub fn create_router(state: AppState) -> anyhow::Result<Router> {
    let public = Router::new()
        .route("/", get(api::handlers::dashboard::landing))
        .route("/healthz", get(|| async { "OK" }))
        .route("/auth", get(api::handlers::auth::login_info))
        .route("/auth/login", post(api::handlers::auth::login))
        .route("/auth/signup", post(api::handlers::auth::signup))
        .route("/auth/logout", post(api::handlers::auth::logout));

    // Any authenticated user
    let authenticated = Router::new()
        .route("/home", get(api::handlers::dashboard::home))
        .route("/auth/me", get(api::handlers::auth::me))
        .route("/quests/{id}", get(api::handlers::quests::quest_detail))
        .route(
            "/messages",
            get(api::handlers::messages::inbox).post(api::handlers::messages::send_message),
        )
        .route("/messages/{id}/read", post(api::handlers::messages::mark_message_read))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    let programmer = Router::new()
        .route("/accepted-jobs", get(api::handlers::dashboard::accepted_jobs))
        .route("/quests/{id}/applications", post(api::handlers::quests::apply_to_quest))
        .route(
            "/party-search/{quest_id}",
            get(api::handlers::parties::party_candidates).post(api::handlers::parties::invite_to_party),
        )
        .route("/party-requests", get(api::handlers::parties::incoming_party_requests))
        .route("/party-requests/{id}", patch(api::handlers::parties::respond_to_party_request))
        .route_layer(from_fn_with_state(state.clone(), require_programmer));

    let company = Router::new()
        .route("/company-dashboard", get(api::handlers::dashboard::company_dashboard))
        .route("/create-quest", post(api::handlers::quests::create_quest))
        .route(
            "/quests/{id}/applications/{applicant}",
            patch(api::handlers::quests::accept_application),
        )
        .route_layer(from_fn_with_state(state.clone(), require_company));

    let cors_layer = create_cors_layer(&state.config)?;

    let mut router = Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(programmer)
        .merge(company)
        .with_state(state)
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/docs"));

    if let Some(cors_layer) = cors_layer {
        router = router.layer(cors_layer);
    }

    Ok(router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    ))
}

/// Main application struct that owns all resources and lifecycle.
pub struct Application {
    router: Router,
    config: Config,
    shutdown_token: CancellationToken,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting with configuration: {:#?}", config);

        let backend = Backend::from_config(&config)?;
        let shutdown_token = CancellationToken::new();
        let gates = SessionGates::new(
            Arc::clone(&backend.auth),
            Arc::clone(&backend.profiles),
            config.auth.role_lookup_timeout,
            shutdown_token.clone(),
        );

        let state = AppState::builder().config(config.clone()).backend(backend).gates(gates).build();
        let router = create_router(state)?;

        Ok(Self {
            router,
            config,
            shutdown_token,
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "AI Guild backend listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Stop the session event loop
        self.shutdown_token.cancel();
        info!("Shut down cleanly");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::auth::role::Role;
    use crate::routes;
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_anonymous_guarded_route_redirects_to_login_with_from() {
        let (server, _state) = create_test_app().await;

        let response = server.get("/messages").await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/auth?from=%2Fmessages");
    }

    #[tokio::test]
    async fn test_anonymous_can_reach_public_routes() {
        let (server, _state) = create_test_app().await;

        assert_eq!(server.get("/").await.status_code(), StatusCode::OK);
        assert_eq!(server.get("/healthz").await.status_code(), StatusCode::OK);
        assert_eq!(server.get("/auth").await.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_signup_grants_access_to_role_routes() {
        let (server, _state) = create_test_app().await;

        let programmer = signup(&server, "dev@example.com", Role::Programmer).await;

        let home = get_as(&server, &programmer, "/home").await;
        assert_eq!(home.status_code(), StatusCode::OK);

        let jobs = get_as(&server, &programmer, "/accepted-jobs").await;
        assert_eq!(jobs.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_wrong_role_redirects_to_home_with_notice() {
        let (server, _state) = create_test_app().await;

        let programmer = signup(&server, "dev@example.com", Role::Programmer).await;
        let response = get_as(&server, &programmer, "/company-dashboard").await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/home?notice=not-permitted");

        let company = signup(&server, "corp@example.com", Role::Company).await;
        let response = get_as(&server, &company, "/party-requests").await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/home?notice=not-permitted");
    }

    #[tokio::test]
    async fn test_login_resumes_preserved_path() {
        let (server, _state) = create_test_app().await;
        signup(&server, "dev@example.com", Role::Programmer).await;

        let response = server
            .post("/auth/login")
            .json(&json!({
                "email": "dev@example.com",
                "password": TEST_PASSWORD,
                "from": "/messages",
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["redirect_to"], "/messages");
    }

    #[tokio::test]
    async fn test_login_rejects_external_resume_target() {
        let (server, _state) = create_test_app().await;
        signup(&server, "dev@example.com", Role::Programmer).await;

        let response = server
            .post("/auth/login")
            .json(&json!({
                "email": "dev@example.com",
                "password": TEST_PASSWORD,
                "from": "https://evil.example.com/phish",
            }))
            .await;
        let body: serde_json::Value = response.json();
        assert_eq!(body["redirect_to"], routes::DEFAULT_AUTHENTICATED_PATH);
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let (server, _state) = create_test_app().await;
        let user = signup(&server, "dev@example.com", Role::Programmer).await;

        assert_eq!(get_as(&server, &user, "/home").await.status_code(), StatusCode::OK);

        let response = server
            .post("/auth/logout")
            .add_header(axum::http::header::COOKIE, user.cookie_header())
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        // Give the session event a moment to reach the gate registry
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let response = get_as(&server, &user, "/home").await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/auth?from=%2Fhome");
    }

    #[tokio::test]
    async fn test_signup_rejects_unknown_role() {
        let (server, _state) = create_test_app().await;

        let response = server
            .post("/auth/signup")
            .json(&json!({
                "email": "dev@example.com",
                "password": TEST_PASSWORD,
                "role": "superuser",
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_marketplace_flow() {
        let (server, _state) = create_test_app().await;

        let company = signup(&server, "corp@example.com", Role::Company).await;
        let alice = signup(&server, "alice@example.com", Role::Programmer).await;
        let bob = signup(&server, "bob@example.com", Role::Programmer).await;

        // Company posts a quest
        let response = server
            .post("/create-quest")
            .add_header(axum::http::header::COOKIE, company.cookie_header())
            .json(&json!({
                "title": "Build a data pipeline",
                "detail": "Nightly ingestion into the warehouse",
                "skills": ["rust", "sql"],
                "compensation": 8000,
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let quest: serde_json::Value = response.json();
        let quest_id = quest["id"].as_str().expect("quest id").to_string();

        // Both programmers apply
        for user in [&alice, &bob] {
            let response = server
                .post(&format!("/quests/{quest_id}/applications"))
                .add_header(axum::http::header::COOKIE, user.cookie_header())
                .await;
            assert_eq!(response.status_code(), StatusCode::OK);
        }

        // The company sees both applications on its dashboard
        let dashboard = get_as(&server, &company, "/company-dashboard").await;
        let body: serde_json::Value = dashboard.json();
        assert_eq!(body["quests"][0]["applications"].as_array().map(Vec::len), Some(2));

        // Alice invites Bob to a party
        let response = server
            .post(&format!("/party-search/{quest_id}"))
            .add_header(axum::http::header::COOKIE, alice.cookie_header())
            .json(&json!({ "to_user": bob.user_id }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let invitation: serde_json::Value = response.json();
        let invitation_id = invitation["id"].as_str().expect("invitation id");

        // Bob accepts it
        let response = server
            .patch(&format!("/party-requests/{invitation_id}"))
            .add_header(axum::http::header::COOKIE, bob.cookie_header())
            .json(&json!({ "accept": true }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);

        // The company awards the quest to Alice
        let response = server
            .patch(&format!("/quests/{quest_id}/applications/{}", alice.user_id))
            .add_header(axum::http::header::COOKIE, company.cookie_header())
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);

        // Alice sees it under accepted jobs
        let jobs = get_as(&server, &alice, "/accepted-jobs").await;
        let body: serde_json::Value = jobs.json();
        assert_eq!(body["quests"].as_array().map(Vec::len), Some(1));

        // Bob messages Alice about the party
        let response = server
            .post("/messages")
            .add_header(axum::http::header::COOKIE, bob.cookie_header())
            .json(&json!({ "recipient": alice.user_id, "body": "ready when you are" }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let inbox = get_as(&server, &alice, "/messages").await;
        let body: serde_json::Value = inbox.json();
        assert_eq!(body["unread"], 1);
    }
}
