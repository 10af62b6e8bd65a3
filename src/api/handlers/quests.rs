//! Quest posting, browsing, and applications.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::info;
use uuid::Uuid;

use crate::{
    AppState,
    api::models::quests::QuestDetailResponse,
    auth::middleware::CurrentUser,
    backend::{Quest, QuestApplication, QuestCreate},
    errors::Error,
    types::{QuestId, UserId, abbrev_uuid},
};

/// Quest detail page. The posting company also sees the applications;
/// other viewers see whether they already applied.
#[utoipa::path(
    get,
    path = "/quests/{id}",
    tag = "quests",
    params(("id" = Uuid, Path, description = "Quest ID")),
    responses(
        (status = 200, description = "Quest detail", body = QuestDetailResponse),
        (status = 404, description = "No such quest"),
    )
)]
#[tracing::instrument(skip_all, fields(quest_id = %abbrev_uuid(&id)))]
pub async fn quest_detail(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<QuestId>,
) -> Result<Json<QuestDetailResponse>, Error> {
    let quest = state.backend.quests.get(id).await?.ok_or_else(|| Error::NotFound {
        resource: "quest".to_string(),
        id: id.to_string(),
    })?;

    let applications = state.backend.quests.applications(id).await?;
    let has_applied = applications.iter().any(|a| a.applicant == current_user.user_id);
    let owner_view = quest.created_by == current_user.user_id;

    Ok(Json(QuestDetailResponse {
        quest,
        applications: owner_view.then_some(applications),
        has_applied,
    }))
}

/// Post a new quest
#[utoipa::path(
    post,
    path = "/create-quest",
    request_body = QuestCreate,
    tag = "quests",
    responses(
        (status = 200, description = "Quest created", body = Quest),
        (status = 400, description = "Invalid input"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_quest(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<QuestCreate>,
) -> Result<Json<Quest>, Error> {
    if request.title.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Quest title must not be empty".to_string(),
        });
    }
    if request.compensation < 0 {
        return Err(Error::BadRequest {
            message: "Compensation must not be negative".to_string(),
        });
    }

    let quest = state.backend.quests.create(current_user.user_id, &request).await?;
    info!(quest_id = %abbrev_uuid(&quest.id), "quest created");
    Ok(Json(quest))
}

/// Apply to an open quest
#[utoipa::path(
    post,
    path = "/quests/{id}/applications",
    tag = "quests",
    params(("id" = Uuid, Path, description = "Quest ID")),
    responses(
        (status = 200, description = "Application recorded", body = QuestApplication),
        (status = 400, description = "Quest not accepting applications"),
        (status = 404, description = "No such quest"),
    )
)]
#[tracing::instrument(skip_all, fields(quest_id = %abbrev_uuid(&id)))]
pub async fn apply_to_quest(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<QuestId>,
) -> Result<Json<QuestApplication>, Error> {
    let application = state.backend.quests.apply(id, current_user.user_id).await?;
    Ok(Json(application))
}

/// Accept an application, awarding the quest to the applicant
#[utoipa::path(
    patch,
    path = "/quests/{id}/applications/{applicant}",
    tag = "quests",
    params(
        ("id" = Uuid, Path, description = "Quest ID"),
        ("applicant" = Uuid, Path, description = "Applicant user ID"),
    ),
    responses(
        (status = 200, description = "Application accepted", body = Quest),
        (status = 400, description = "Quest already awarded"),
        (status = 404, description = "No such quest or application"),
    )
)]
#[tracing::instrument(skip_all, fields(quest_id = %abbrev_uuid(&id)))]
pub async fn accept_application(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((id, applicant)): Path<(QuestId, UserId)>,
) -> Result<Json<Quest>, Error> {
    let quest = state.backend.quests.get(id).await?.ok_or_else(|| Error::NotFound {
        resource: "quest".to_string(),
        id: id.to_string(),
    })?;
    // Only the posting company may award; respond as if the quest does not
    // exist for anyone else
    if quest.created_by != current_user.user_id {
        return Err(Error::NotFound {
            resource: "quest".to_string(),
            id: id.to_string(),
        });
    }

    let awarded = state.backend.quests.accept_application(id, applicant).await?;
    info!(
        quest_id = %abbrev_uuid(&id),
        applicant = %abbrev_uuid(&applicant),
        "quest awarded"
    );
    Ok(Json(awarded))
}
