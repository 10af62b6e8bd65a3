//! HTTP request handlers.

pub mod auth;
pub mod dashboard;
pub mod messages;
pub mod parties;
pub mod quests;
