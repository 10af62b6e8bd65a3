//! Common type definitions.
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`UserId`]: account identifier issued by the auth service
//! - [`QuestId`]: quest record identifier
//! - [`PartyRequestId`]: party request identifier
//! - [`MessageId`]: message identifier

use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type QuestId = Uuid;
pub type PartyRequestId = Uuid;
pub type MessageId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
