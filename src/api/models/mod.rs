//! API request and response data models.
//!
//! These structures define the public API contract. They are distinct from
//! the backend record types so the wire format can evolve independently of
//! storage, and all of them carry `utoipa` annotations for the generated
//! API docs.

pub mod auth;
pub mod messages;
pub mod parties;
pub mod quests;
