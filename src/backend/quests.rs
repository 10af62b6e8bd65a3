//! Quest records and store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::Result;
use crate::types::{QuestId, UserId};

/// Lifecycle of a quest posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QuestStatus {
    /// Posted and accepting applications
    Open,
    /// A programmer has been accepted for the work
    Accepted,
    /// Work delivered and signed off
    Completed,
}

/// A job posting from a company.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Quest {
    #[schema(value_type = String, format = "uuid")]
    pub id: QuestId,
    pub title: String,
    pub detail: String,
    /// Required skills, free-form tags
    pub skills: Vec<String>,
    pub deadline: Option<DateTime<Utc>>,
    /// Offered compensation in whole currency units
    pub compensation: i64,
    pub status: QuestStatus,
    #[schema(value_type = String, format = "uuid")]
    pub created_by: UserId,
    /// Programmer the quest was awarded to, set when an application is
    /// accepted
    #[schema(value_type = Option<String>, format = "uuid")]
    pub assigned_to: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Fields a company supplies when posting a quest.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct QuestCreate {
    pub title: String,
    pub detail: String,
    #[serde(default)]
    pub skills: Vec<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub compensation: i64,
}

/// A programmer's application to an open quest.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestApplication {
    #[schema(value_type = String, format = "uuid")]
    pub quest_id: QuestId,
    #[schema(value_type = String, format = "uuid")]
    pub applicant: UserId,
    pub created_at: DateTime<Utc>,
}

/// Listing filter; `None` fields match everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestFilter {
    pub status: Option<QuestStatus>,
    pub created_by: Option<UserId>,
}

/// Contract with the quest store.
#[async_trait]
pub trait QuestStore: Send + Sync {
    /// List quests matching the filter, newest first.
    async fn list(&self, filter: QuestFilter) -> Result<Vec<Quest>>;

    async fn get(&self, id: QuestId) -> Result<Option<Quest>>;

    /// Post a new quest. It starts out [`QuestStatus::Open`].
    async fn create(&self, created_by: UserId, quest: &QuestCreate) -> Result<Quest>;

    /// Apply to an open quest. Applying twice to the same quest is a no-op
    /// returning the existing application.
    async fn apply(&self, quest_id: QuestId, applicant: UserId) -> Result<QuestApplication>;

    /// Applications received by a quest, oldest first.
    async fn applications(&self, quest_id: QuestId) -> Result<Vec<QuestApplication>>;

    /// Accept an application. Moves the quest to [`QuestStatus::Accepted`]
    /// and records the applicant as its assignee. Fails if the quest is not
    /// open or the applicant never applied.
    async fn accept_application(&self, quest_id: QuestId, applicant: UserId) -> Result<Quest>;

    /// Quests awarded to a programmer that are still in flight.
    async fn assigned_to(&self, user_id: UserId) -> Result<Vec<Quest>>;
}
