//! HTTP backend implementations.
//!
//! Talks to a hosted backend split into two surfaces: a GoTrue-style auth
//! API (`/token`, `/signup`, `/user`, `/logout`) and a PostgREST-style data
//! API where each store is a table addressed with query-string filters
//! (`quests?status=eq.open&order=created_at.desc`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, error};
use url::Url;

use crate::auth::role::Role;
use crate::auth::session::{Session, SessionEvent};
use crate::errors::{Error, Result};
use crate::types::{MessageId, PartyRequestId, QuestId, UserId};

use super::auth_api::{AuthApi, Credentials};
use super::memory::EVENT_CHANNEL_CAPACITY;
use super::messages::{Message, MessageStore};
use super::parties::{PartyRequest, PartyRequestStatus, PartyStore};
use super::profiles::ProfileApi;
use super::quests::{Quest, QuestApplication, QuestCreate, QuestFilter, QuestStatus, QuestStore};

/// Url::join drops the last path segment unless the base ends with a slash,
/// so normalize before joining.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut with_slash = url.clone();
        let mut path = with_slash.path().to_string();
        path.push('/');
        with_slash.set_path(&path);
        with_slash
    }
}

fn join(base: &Url, segment: &str) -> Result<Url> {
    ensure_slash(base).join(segment).map_err(|e| Error::Internal {
        operation: format!("construct backend URL for {segment}: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Auth API
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Token validity in seconds
    expires_in: i64,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: UserId,
    email: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: UserId,
    email: String,
    expires_at: DateTime<Utc>,
}

/// Auth service client.
pub struct RestAuthService {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
    events: broadcast::Sender<SessionEvent>,
}

impl RestAuthService {
    pub fn new(http: Client, base_url: Url, api_key: Option<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            http,
            base_url,
            api_key,
            events,
        }
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let mut request = self.http.request(method, url);
        if let Some(api_key) = &self.api_key {
            request = request.header("apikey", api_key);
        }
        request
    }

    async fn token_request(&self, operation: &str, url: Url, credentials: &Credentials) -> Result<Session> {
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&json!({ "email": credentials.email, "password": credentials.password }))
            .send()
            .await
            .map_err(|e| {
                error!("Auth service unreachable during {operation}: {e}");
                Error::AuthServiceUnavailable {
                    operation: operation.to_string(),
                }
            })?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(Error::InvalidCredentials);
        }
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BadRequest { message: body });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Auth service error during {operation}: {status} - {body}");
            return Err(Error::AuthServiceUnavailable {
                operation: operation.to_string(),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            error!("Failed to parse auth service response during {operation}: {e}");
            Error::AuthServiceUnavailable {
                operation: operation.to_string(),
            }
        })?;

        Ok(Session {
            access_token: token.access_token,
            user_id: token.user.id,
            email: token.user.email,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }
}

#[async_trait]
impl AuthApi for RestAuthService {
    async fn current_session(&self, access_token: &str) -> Result<Option<Session>> {
        let url = join(&self.base_url, "user")?;
        let response = self
            .request(reqwest::Method::GET, url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                error!("Auth service unreachable during session lookup: {e}");
                Error::AuthServiceUnavailable {
                    operation: "session lookup".to_string(),
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::AuthServiceUnavailable {
                operation: "session lookup".to_string(),
            });
        }

        let user: UserResponse = response.json().await.map_err(|e| {
            error!("Failed to parse session lookup response: {e}");
            Error::AuthServiceUnavailable {
                operation: "session lookup".to_string(),
            }
        })?;
        Ok(Some(Session {
            access_token: access_token.to_string(),
            user_id: user.id,
            email: user.email,
            expires_at: user.expires_at,
        }))
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let mut url = join(&self.base_url, "token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let session = self.token_request("sign in", url, credentials).await?;
        let _ = self.events.send(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Session> {
        let url = join(&self.base_url, "signup")?;
        let session = self.token_request("sign up", url, credentials).await?;
        let _ = self.events.send(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        // The event needs the user behind the token; an unrecognized token
        // means there is no session left to tear down.
        let session = match self.current_session(access_token).await? {
            Some(session) => session,
            None => return Ok(()),
        };

        let url = join(&self.base_url, "logout")?;
        let response = self
            .request(reqwest::Method::POST, url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                error!("Auth service unreachable during sign out: {e}");
                Error::AuthServiceUnavailable {
                    operation: "sign out".to_string(),
                }
            })?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::UNAUTHORIZED {
            return Err(Error::AuthServiceUnavailable {
                operation: "sign out".to_string(),
            });
        }

        let _ = self.events.send(SessionEvent::SignedOut {
            access_token: access_token.to_string(),
            user_id: session.user_id,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Data API
// ---------------------------------------------------------------------------

/// Shared client for the table-per-store data API.
#[derive(Clone)]
pub struct DataApiClient {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl DataApiClient {
    pub fn new(http: Client, base_url: Url, api_key: Option<String>) -> Self {
        Self { http, base_url, api_key }
    }

    fn request(&self, method: reqwest::Method, table: &str, query: &[(&str, String)]) -> Result<reqwest::RequestBuilder> {
        let mut url = join(&self.base_url, table)?;
        for (key, value) in query {
            url.query_pairs_mut().append_pair(key, value);
        }
        debug!("Data API request: {} {url}", method.as_str());
        let mut request = self.http.request(method, url);
        if let Some(api_key) = &self.api_key {
            request = request.header("apikey", api_key);
        }
        Ok(request)
    }

    async fn execute<T: serde::de::DeserializeOwned>(&self, operation: &str, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(|e| {
            error!("Data API unreachable during {operation}: {e}");
            Error::Internal {
                operation: operation.to_string(),
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Data API error during {operation}: {status} - {body}");
            if status == StatusCode::CONFLICT {
                return Err(Error::BadRequest { message: body });
            }
            return Err(Error::Internal {
                operation: operation.to_string(),
            });
        }
        response.json().await.map_err(|e| {
            error!("Failed to parse data API response during {operation}: {e}");
            Error::Internal {
                operation: operation.to_string(),
            }
        })
    }

    async fn select<T: serde::de::DeserializeOwned>(&self, operation: &str, table: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let request = self.request(reqwest::Method::GET, table, query)?;
        self.execute(operation, request).await
    }

    /// Insert one row and return it as stored.
    async fn insert<T: serde::de::DeserializeOwned>(&self, operation: &str, table: &str, body: serde_json::Value) -> Result<T> {
        let request = self
            .request(reqwest::Method::POST, table, &[])?
            .header("Prefer", "return=representation")
            .json(&body);
        let mut rows: Vec<T> = self.execute(operation, request).await?;
        rows.pop().ok_or_else(|| Error::Internal {
            operation: format!("{operation}: insert returned no rows"),
        })
    }

    /// Update rows matching the filter and return them as stored. An empty
    /// result means nothing matched.
    async fn update<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        table: &str,
        query: &[(&str, String)],
        body: serde_json::Value,
    ) -> Result<Vec<T>> {
        let request = self
            .request(reqwest::Method::PATCH, table, query)?
            .header("Prefer", "return=representation")
            .json(&body);
        self.execute(operation, request).await
    }
}

/// Profile store client.
pub struct RestProfileStore {
    data: DataApiClient,
}

impl RestProfileStore {
    pub fn new(data: DataApiClient) -> Self {
        Self { data }
    }
}

#[derive(Debug, Deserialize)]
struct RoleRow {
    role: String,
}

#[async_trait]
impl ProfileApi for RestProfileStore {
    async fn role_of(&self, user_id: UserId) -> Result<Option<Role>> {
        let rows: Vec<RoleRow> = self
            .data
            .select(
                "role lookup",
                "profiles",
                &[("id", format!("eq.{user_id}")), ("select", "role".to_string())],
            )
            .await
            .map_err(|_| Error::ProfileLookupFailed { user_id })?;
        // Stored strings outside the closed role set degrade to Unknown
        // rather than failing the lookup.
        Ok(rows.first().map(|row| row.role.parse().unwrap_or(Role::Unknown)))
    }

    async fn assign_role(&self, user_id: UserId, role: Role) -> Result<()> {
        #[derive(Deserialize)]
        struct ProfileRow {
            #[allow(dead_code)]
            id: UserId,
        }
        let _: ProfileRow = self
            .data
            .insert(
                "role assignment",
                "profiles",
                json!({ "id": user_id, "role": role.as_str() }),
            )
            .await?;
        Ok(())
    }
}

/// Quest store client.
pub struct RestQuestStore {
    data: DataApiClient,
}

impl RestQuestStore {
    pub fn new(data: DataApiClient) -> Self {
        Self { data }
    }
}

#[async_trait]
impl QuestStore for RestQuestStore {
    async fn list(&self, filter: QuestFilter) -> Result<Vec<Quest>> {
        let mut query = vec![("order", "created_at.desc".to_string())];
        if let Some(status) = filter.status {
            query.push(("status", format!("eq.{}", status_str(status))));
        }
        if let Some(created_by) = filter.created_by {
            query.push(("created_by", format!("eq.{created_by}")));
        }
        self.data.select("quest listing", "quests", &query).await
    }

    async fn get(&self, id: QuestId) -> Result<Option<Quest>> {
        let mut rows: Vec<Quest> = self
            .data
            .select("quest lookup", "quests", &[("id", format!("eq.{id}"))])
            .await?;
        Ok(rows.pop())
    }

    async fn create(&self, created_by: UserId, quest: &QuestCreate) -> Result<Quest> {
        self.data
            .insert(
                "quest creation",
                "quests",
                json!({
                    "title": quest.title,
                    "detail": quest.detail,
                    "skills": quest.skills,
                    "deadline": quest.deadline,
                    "compensation": quest.compensation,
                    "status": "open",
                    "created_by": created_by,
                }),
            )
            .await
    }

    async fn apply(&self, quest_id: QuestId, applicant: UserId) -> Result<QuestApplication> {
        let quest = self.get(quest_id).await?.ok_or_else(|| Error::NotFound {
            resource: "quest".to_string(),
            id: quest_id.to_string(),
        })?;
        if quest.status != QuestStatus::Open {
            return Err(Error::BadRequest {
                message: "quest is no longer accepting applications".to_string(),
            });
        }

        let existing: Vec<QuestApplication> = self
            .data
            .select(
                "application lookup",
                "quest_applications",
                &[
                    ("quest_id", format!("eq.{quest_id}")),
                    ("applicant", format!("eq.{applicant}")),
                ],
            )
            .await?;
        if let Some(application) = existing.into_iter().next() {
            return Ok(application);
        }

        self.data
            .insert(
                "quest application",
                "quest_applications",
                json!({ "quest_id": quest_id, "applicant": applicant }),
            )
            .await
    }

    async fn applications(&self, quest_id: QuestId) -> Result<Vec<QuestApplication>> {
        self.data
            .select(
                "application listing",
                "quest_applications",
                &[("quest_id", format!("eq.{quest_id}")), ("order", "created_at.asc".to_string())],
            )
            .await
    }

    async fn accept_application(&self, quest_id: QuestId, applicant: UserId) -> Result<Quest> {
        let applications: Vec<QuestApplication> = self
            .data
            .select(
                "application lookup",
                "quest_applications",
                &[
                    ("quest_id", format!("eq.{quest_id}")),
                    ("applicant", format!("eq.{applicant}")),
                ],
            )
            .await?;
        if applications.is_empty() {
            return Err(Error::NotFound {
                resource: "quest application".to_string(),
                id: format!("{quest_id}/{applicant}"),
            });
        }

        // Filter on status too so a concurrent accept cannot re-award the
        // quest; an empty update means we lost that race or the quest is gone.
        let mut updated: Vec<Quest> = self
            .data
            .update(
                "application acceptance",
                "quests",
                &[("id", format!("eq.{quest_id}")), ("status", "eq.open".to_string())],
                json!({ "status": "accepted", "assigned_to": applicant }),
            )
            .await?;
        updated.pop().ok_or_else(|| Error::BadRequest {
            message: "quest has already been awarded".to_string(),
        })
    }

    async fn assigned_to(&self, user_id: UserId) -> Result<Vec<Quest>> {
        self.data
            .select(
                "assigned quest listing",
                "quests",
                &[
                    ("assigned_to", format!("eq.{user_id}")),
                    ("status", "eq.accepted".to_string()),
                    ("order", "created_at.desc".to_string()),
                ],
            )
            .await
    }
}

fn status_str(status: QuestStatus) -> &'static str {
    match status {
        QuestStatus::Open => "open",
        QuestStatus::Accepted => "accepted",
        QuestStatus::Completed => "completed",
    }
}

/// Party request store client.
pub struct RestPartyStore {
    data: DataApiClient,
}

impl RestPartyStore {
    pub fn new(data: DataApiClient) -> Self {
        Self { data }
    }
}

#[async_trait]
impl PartyStore for RestPartyStore {
    async fn create(&self, quest_id: QuestId, from_user: UserId, to_user: UserId) -> Result<PartyRequest> {
        if from_user == to_user {
            return Err(Error::BadRequest {
                message: "cannot send a party request to yourself".to_string(),
            });
        }

        let pending: Vec<PartyRequest> = self
            .data
            .select(
                "party request lookup",
                "party_requests",
                &[
                    ("quest_id", format!("eq.{quest_id}")),
                    ("from_user", format!("eq.{from_user}")),
                    ("to_user", format!("eq.{to_user}")),
                    ("status", "eq.pending".to_string()),
                ],
            )
            .await?;
        if let Some(request) = pending.into_iter().next() {
            return Ok(request);
        }

        self.data
            .insert(
                "party request creation",
                "party_requests",
                json!({
                    "quest_id": quest_id,
                    "from_user": from_user,
                    "to_user": to_user,
                    "status": "pending",
                }),
            )
            .await
    }

    async fn incoming(&self, to_user: UserId) -> Result<Vec<PartyRequest>> {
        self.data
            .select(
                "party request listing",
                "party_requests",
                &[("to_user", format!("eq.{to_user}")), ("order", "created_at.desc".to_string())],
            )
            .await
    }

    async fn get(&self, id: PartyRequestId) -> Result<Option<PartyRequest>> {
        let mut rows: Vec<PartyRequest> = self
            .data
            .select("party request lookup", "party_requests", &[("id", format!("eq.{id}"))])
            .await?;
        Ok(rows.pop())
    }

    async fn respond(&self, id: PartyRequestId, status: PartyRequestStatus) -> Result<PartyRequest> {
        let status_value = match status {
            PartyRequestStatus::Pending => {
                return Err(Error::BadRequest {
                    message: "cannot resolve a party request back to pending".to_string(),
                });
            }
            PartyRequestStatus::Accepted => "accepted",
            PartyRequestStatus::Declined => "declined",
        };

        let mut updated: Vec<PartyRequest> = self
            .data
            .update(
                "party request resolution",
                "party_requests",
                &[("id", format!("eq.{id}")), ("status", "eq.pending".to_string())],
                json!({ "status": status_value }),
            )
            .await?;
        match updated.pop() {
            Some(request) => Ok(request),
            None => match self.get(id).await? {
                Some(_) => Err(Error::BadRequest {
                    message: "party request has already been resolved".to_string(),
                }),
                None => Err(Error::NotFound {
                    resource: "party request".to_string(),
                    id: id.to_string(),
                }),
            },
        }
    }
}

/// Message store client.
pub struct RestMessageStore {
    data: DataApiClient,
}

impl RestMessageStore {
    pub fn new(data: DataApiClient) -> Self {
        Self { data }
    }
}

#[async_trait]
impl MessageStore for RestMessageStore {
    async fn send(&self, sender: UserId, recipient: UserId, body: &str) -> Result<Message> {
        self.data
            .insert(
                "message send",
                "messages",
                json!({ "sender": sender, "recipient": recipient, "body": body, "read": false }),
            )
            .await
    }

    async fn inbox(&self, user_id: UserId) -> Result<Vec<Message>> {
        self.data
            .select(
                "inbox listing",
                "messages",
                &[("recipient", format!("eq.{user_id}")), ("order", "created_at.desc".to_string())],
            )
            .await
    }

    async fn mark_read(&self, id: MessageId, recipient: UserId) -> Result<Message> {
        let mut updated: Vec<Message> = self
            .data
            .update(
                "message read marker",
                "messages",
                &[("id", format!("eq.{id}")), ("recipient", format!("eq.{recipient}"))],
                json!({ "read": true }),
            )
            .await?;
        updated.pop().ok_or_else(|| Error::NotFound {
            resource: "message".to_string(),
            id: id.to_string(),
        })
    }

    async fn unread_count(&self, user_id: UserId) -> Result<u64> {
        #[derive(Deserialize)]
        struct IdRow {
            #[allow(dead_code)]
            id: MessageId,
        }
        let rows: Vec<IdRow> = self
            .data
            .select(
                "unread count",
                "messages",
                &[
                    ("recipient", format!("eq.{user_id}")),
                    ("read", "eq.false".to_string()),
                    ("select", "id".to_string()),
                ],
            )
            .await?;
        Ok(rows.len() as u64)
    }
}
