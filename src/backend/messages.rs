//! Direct messages and store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::Result;
use crate::types::{MessageId, UserId};

/// A direct message between two users.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    #[schema(value_type = String, format = "uuid")]
    pub id: MessageId,
    #[schema(value_type = String, format = "uuid")]
    pub sender: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub recipient: UserId,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Contract with the message store.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn send(&self, sender: UserId, recipient: UserId, body: &str) -> Result<Message>;

    /// Messages received by a user, newest first.
    async fn inbox(&self, user_id: UserId) -> Result<Vec<Message>>;

    /// Mark a received message as read. Only the recipient may do this.
    async fn mark_read(&self, id: MessageId, recipient: UserId) -> Result<Message>;

    async fn unread_count(&self, user_id: UserId) -> Result<u64>;
}
