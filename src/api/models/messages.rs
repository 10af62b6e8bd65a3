//! Messaging payloads.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::backend::Message;
use crate::types::UserId;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    #[schema(value_type = String, format = "uuid")]
    pub recipient: UserId,
    pub body: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InboxResponse {
    pub messages: Vec<Message>,
    pub unread: u64,
}
