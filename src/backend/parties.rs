//! Party requests and store contract.
//!
//! Programmers working the same quest can team up. A party request is an
//! invitation from one programmer to another, scoped to a quest, that the
//! recipient accepts or declines.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::Result;
use crate::types::{PartyRequestId, QuestId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PartyRequestStatus {
    Pending,
    Accepted,
    Declined,
}

/// An invitation to form a party for a quest.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PartyRequest {
    #[schema(value_type = String, format = "uuid")]
    pub id: PartyRequestId,
    #[schema(value_type = String, format = "uuid")]
    pub quest_id: QuestId,
    #[schema(value_type = String, format = "uuid")]
    pub from_user: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub to_user: UserId,
    pub status: PartyRequestStatus,
    pub created_at: DateTime<Utc>,
}

/// Contract with the party request store.
#[async_trait]
pub trait PartyStore: Send + Sync {
    /// Send a party invitation. A pending invitation between the same pair
    /// for the same quest is returned as-is instead of duplicated.
    async fn create(&self, quest_id: QuestId, from_user: UserId, to_user: UserId) -> Result<PartyRequest>;

    /// Invitations addressed to a user, newest first.
    async fn incoming(&self, to_user: UserId) -> Result<Vec<PartyRequest>>;

    async fn get(&self, id: PartyRequestId) -> Result<Option<PartyRequest>>;

    /// Resolve a pending invitation. Fails if it was already resolved.
    async fn respond(&self, id: PartyRequestId, status: PartyRequestStatus) -> Result<PartyRequest>;
}
