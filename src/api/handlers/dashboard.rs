//! Landing, home, and role dashboards.

use axum::{Json, extract::State};
use futures::future::try_join_all;

use crate::{
    AppState,
    api::models::quests::{AcceptedJobsResponse, CompanyDashboardResponse, HomePageResponse, LandingResponse, QuestWithApplications},
    auth::middleware::CurrentUser,
    backend::{QuestFilter, QuestStatus},
    errors::Error,
};

/// Public landing page
#[utoipa::path(
    get,
    path = "/",
    tag = "pages",
    responses(
        (status = 200, description = "Landing page", body = LandingResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn landing(State(state): State<AppState>) -> Result<Json<LandingResponse>, Error> {
    let open = state
        .backend
        .quests
        .list(QuestFilter {
            status: Some(QuestStatus::Open),
            ..Default::default()
        })
        .await?;
    Ok(Json(LandingResponse {
        open_quest_count: open.len(),
    }))
}

/// Home page: the open quest board
#[utoipa::path(
    get,
    path = "/home",
    tag = "pages",
    responses(
        (status = 200, description = "Home page", body = HomePageResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn home(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<HomePageResponse>, Error> {
    let open_quests = state
        .backend
        .quests
        .list(QuestFilter {
            status: Some(QuestStatus::Open),
            ..Default::default()
        })
        .await?;
    let unread_messages = state.backend.messages.unread_count(current_user.user_id).await?;
    Ok(Json(HomePageResponse {
        open_quests,
        unread_messages,
    }))
}

/// Company dashboard: posted quests with their applications
#[utoipa::path(
    get,
    path = "/company-dashboard",
    tag = "pages",
    responses(
        (status = 200, description = "Company dashboard", body = CompanyDashboardResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn company_dashboard(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<CompanyDashboardResponse>, Error> {
    let quests = state
        .backend
        .quests
        .list(QuestFilter {
            created_by: Some(current_user.user_id),
            ..Default::default()
        })
        .await?;

    let quests = try_join_all(quests.into_iter().map(|quest| {
        let store = state.backend.quests.clone();
        async move {
            let applications = store.applications(quest.id).await?;
            Ok::<_, Error>(QuestWithApplications { quest, applications })
        }
    }))
    .await?;

    Ok(Json(CompanyDashboardResponse { quests }))
}

/// Quests awarded to the current programmer
#[utoipa::path(
    get,
    path = "/accepted-jobs",
    tag = "pages",
    responses(
        (status = 200, description = "Accepted jobs", body = AcceptedJobsResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn accepted_jobs(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<AcceptedJobsResponse>, Error> {
    let quests = state.backend.quests.assigned_to(current_user.user_id).await?;
    Ok(Json(AcceptedJobsResponse { quests }))
}
