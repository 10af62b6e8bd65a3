//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for every page and action
//! - **[`models`]**: Request/response data structures
//!
//! Routes are guarded by the middleware in [`crate::auth::middleware`]
//! according to the route table assembled in [`crate::create_router`].
//! All endpoints carry `utoipa` annotations; the generated documentation
//! is served at `/docs`.

pub mod handlers;
pub mod models;
