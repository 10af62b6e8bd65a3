//! Party search and party requests.

use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

use crate::{
    AppState,
    api::models::parties::{IncomingPartyRequestsResponse, PartyCandidatesResponse, PartyInviteRequest, PartyRespondRequest},
    auth::middleware::CurrentUser,
    backend::{PartyRequest, PartyRequestStatus},
    errors::Error,
    types::{PartyRequestId, QuestId, abbrev_uuid},
};

/// Fellow applicants on a quest who can be invited to a party
#[utoipa::path(
    get,
    path = "/party-search/{quest_id}",
    tag = "parties",
    params(("quest_id" = Uuid, Path, description = "Quest ID")),
    responses(
        (status = 200, description = "Party candidates", body = PartyCandidatesResponse),
        (status = 404, description = "No such quest"),
    )
)]
#[tracing::instrument(skip_all, fields(quest_id = %abbrev_uuid(&quest_id)))]
pub async fn party_candidates(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(quest_id): Path<QuestId>,
) -> Result<Json<PartyCandidatesResponse>, Error> {
    if state.backend.quests.get(quest_id).await?.is_none() {
        return Err(Error::NotFound {
            resource: "quest".to_string(),
            id: quest_id.to_string(),
        });
    }

    let candidates = state
        .backend
        .quests
        .applications(quest_id)
        .await?
        .into_iter()
        .map(|a| a.applicant)
        .filter(|applicant| *applicant != current_user.user_id)
        .collect();

    Ok(Json(PartyCandidatesResponse { quest_id, candidates }))
}

/// Invite a fellow applicant to form a party for a quest
#[utoipa::path(
    post,
    path = "/party-search/{quest_id}",
    request_body = PartyInviteRequest,
    tag = "parties",
    params(("quest_id" = Uuid, Path, description = "Quest ID")),
    responses(
        (status = 200, description = "Invitation sent", body = PartyRequest),
        (status = 400, description = "Invitee has not applied to this quest"),
    )
)]
#[tracing::instrument(skip_all, fields(quest_id = %abbrev_uuid(&quest_id)))]
pub async fn invite_to_party(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(quest_id): Path<QuestId>,
    Json(request): Json<PartyInviteRequest>,
) -> Result<Json<PartyRequest>, Error> {
    let applications = state.backend.quests.applications(quest_id).await?;
    if !applications.iter().any(|a| a.applicant == request.to_user) {
        return Err(Error::BadRequest {
            message: "Party invitations can only go to applicants of the quest".to_string(),
        });
    }

    let invitation = state
        .backend
        .parties
        .create(quest_id, current_user.user_id, request.to_user)
        .await?;
    Ok(Json(invitation))
}

/// Party invitations addressed to the current user
#[utoipa::path(
    get,
    path = "/party-requests",
    tag = "parties",
    responses(
        (status = 200, description = "Incoming party requests", body = IncomingPartyRequestsResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn incoming_party_requests(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<IncomingPartyRequestsResponse>, Error> {
    let requests = state.backend.parties.incoming(current_user.user_id).await?;
    Ok(Json(IncomingPartyRequestsResponse { requests }))
}

/// Accept or decline a party invitation
#[utoipa::path(
    patch,
    path = "/party-requests/{id}",
    request_body = PartyRespondRequest,
    tag = "parties",
    params(("id" = Uuid, Path, description = "Party request ID")),
    responses(
        (status = 200, description = "Invitation resolved", body = PartyRequest),
        (status = 400, description = "Invitation already resolved"),
        (status = 404, description = "No such invitation"),
    )
)]
#[tracing::instrument(skip_all, fields(request_id = %abbrev_uuid(&id)))]
pub async fn respond_to_party_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<PartyRequestId>,
    Json(request): Json<PartyRespondRequest>,
) -> Result<Json<PartyRequest>, Error> {
    let invitation = state.backend.parties.get(id).await?.ok_or_else(|| Error::NotFound {
        resource: "party request".to_string(),
        id: id.to_string(),
    })?;
    // Only the invitee can respond; hide the invitation from everyone else
    if invitation.to_user != current_user.user_id {
        return Err(Error::NotFound {
            resource: "party request".to_string(),
            id: id.to_string(),
        });
    }

    let status = if request.accept {
        PartyRequestStatus::Accepted
    } else {
        PartyRequestStatus::Declined
    };
    let resolved = state.backend.parties.respond(id, status).await?;
    Ok(Json(resolved))
}
