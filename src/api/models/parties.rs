//! Party search and party request payloads.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::backend::PartyRequest;
use crate::types::{QuestId, UserId};

/// Programmers who applied to a quest and can be invited to a party.
#[derive(Debug, Serialize, ToSchema)]
pub struct PartyCandidatesResponse {
    #[schema(value_type = String, format = "uuid")]
    pub quest_id: QuestId,
    #[schema(value_type = Vec<String>)]
    pub candidates: Vec<UserId>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PartyInviteRequest {
    #[schema(value_type = String, format = "uuid")]
    pub to_user: UserId,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PartyRespondRequest {
    pub accept: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IncomingPartyRequestsResponse {
    pub requests: Vec<PartyRequest>,
}
