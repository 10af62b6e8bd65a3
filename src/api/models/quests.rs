//! Quest page payloads.

use serde::Serialize;
use utoipa::ToSchema;

use crate::backend::{Quest, QuestApplication};

/// Landing page for anonymous visitors.
#[derive(Debug, Serialize, ToSchema)]
pub struct LandingResponse {
    pub open_quest_count: usize,
}

/// Home page: the open quest board plus the viewer's unread message count.
#[derive(Debug, Serialize, ToSchema)]
pub struct HomePageResponse {
    pub open_quests: Vec<Quest>,
    pub unread_messages: u64,
}

/// Quest detail. Applications are included only for the posting company;
/// programmers instead see whether they already applied.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuestDetailResponse {
    pub quest: Quest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applications: Option<Vec<QuestApplication>>,
    pub has_applied: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuestWithApplications {
    pub quest: Quest,
    pub applications: Vec<QuestApplication>,
}

/// Company dashboard: every quest the company posted, with applications.
#[derive(Debug, Serialize, ToSchema)]
pub struct CompanyDashboardResponse {
    pub quests: Vec<QuestWithApplications>,
}

/// Quests awarded to the viewing programmer.
#[derive(Debug, Serialize, ToSchema)]
pub struct AcceptedJobsResponse {
    pub quests: Vec<Quest>,
}
