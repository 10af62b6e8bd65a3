//! In-process backend implementations.
//!
//! Everything lives behind `std::sync::Mutex` maps and disappears on
//! shutdown. Used by tests and by local development (`backend.type: memory`).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::auth::password;
use crate::auth::role::Role;
use crate::auth::session::{Session, SessionEvent, create_session_token};
use crate::errors::{Error, Result};
use crate::types::{MessageId, PartyRequestId, QuestId, UserId};

use super::auth_api::{AuthApi, Credentials};
use super::messages::{Message, MessageStore};
use super::parties::{PartyRequest, PartyRequestStatus, PartyStore};
use super::profiles::ProfileApi;
use super::quests::{Quest, QuestApplication, QuestCreate, QuestFilter, QuestStatus, QuestStore};

/// Capacity of the session event channel. Subscribers that lag this far
/// behind start losing events.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

// Poisoning means a panic mid-update; the data is still usable for these
// append-mostly maps, so recover the guard instead of propagating the panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
struct UserRecord {
    user_id: UserId,
    email: String,
    password_hash: String,
}

/// Auth service backed by process memory. Issues JWT access tokens signed
/// with the application secret and broadcasts session lifecycle events.
pub struct InMemoryAuthService {
    secret_key: String,
    session_ttl: Duration,
    /// Keyed by lowercased email
    users: Mutex<HashMap<String, UserRecord>>,
    /// Live sessions keyed by access token
    sessions: Mutex<HashMap<String, Session>>,
    events: broadcast::Sender<SessionEvent>,
}

impl InMemoryAuthService {
    pub fn new(secret_key: String, session_ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            secret_key,
            session_ttl,
            users: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn issue_session(&self, user: &UserRecord) -> Result<Session> {
        let token = create_session_token(user.user_id, &user.email, &self.secret_key, self.session_ttl)?;
        let session = Session {
            access_token: token.clone(),
            user_id: user.user_id,
            email: user.email.clone(),
            expires_at: Utc::now()
                + chrono::Duration::from_std(self.session_ttl).unwrap_or_else(|_| chrono::Duration::hours(24)),
        };
        lock(&self.sessions).insert(token, session.clone());
        Ok(session)
    }

    /// Extend a live session and notify subscribers. The access token and
    /// user are unchanged; only the expiry moves.
    pub fn refresh(&self, access_token: &str) -> Result<Session> {
        let mut sessions = lock(&self.sessions);
        let session = sessions
            .get_mut(access_token)
            .ok_or(Error::Unauthenticated { message: None })?;
        session.expires_at = Utc::now()
            + chrono::Duration::from_std(self.session_ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        let refreshed = session.clone();
        drop(sessions);
        let _ = self.events.send(SessionEvent::TokenRefreshed(refreshed.clone()));
        Ok(refreshed)
    }
}

#[async_trait]
impl AuthApi for InMemoryAuthService {
    async fn current_session(&self, access_token: &str) -> Result<Option<Session>> {
        let sessions = lock(&self.sessions);
        Ok(sessions
            .get(access_token)
            .filter(|session| session.expires_at > Utc::now())
            .cloned())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let user = lock(&self.users).get(&credentials.email.to_lowercase()).cloned();
        // Verify even when the user is unknown would leak nothing here; the
        // map lookup already told us. Keep the error indistinguishable.
        let user = user.ok_or(Error::InvalidCredentials)?;

        let password = credentials.password.clone();
        let hash = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || password::verify_string(&password, &hash))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("password verification task: {e}"),
            })??;
        if !valid {
            return Err(Error::InvalidCredentials);
        }

        let session = self.issue_session(&user)?;
        let _ = self.events.send(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Session> {
        let email = credentials.email.to_lowercase();
        if lock(&self.users).contains_key(&email) {
            return Err(Error::BadRequest {
                message: "an account with this email already exists".to_string(),
            });
        }

        let password = credentials.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || password::hash_string(&password))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("password hashing task: {e}"),
            })??;

        let user = UserRecord {
            user_id: Uuid::new_v4(),
            email: email.clone(),
            password_hash,
        };
        // Re-check under the lock; a concurrent signup may have won.
        {
            let mut users = lock(&self.users);
            if users.contains_key(&email) {
                return Err(Error::BadRequest {
                    message: "an account with this email already exists".to_string(),
                });
            }
            users.insert(email, user.clone());
        }

        let session = self.issue_session(&user)?;
        let _ = self.events.send(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let removed = lock(&self.sessions).remove(access_token);
        if let Some(session) = removed {
            let _ = self.events.send(SessionEvent::SignedOut {
                access_token: session.access_token,
                user_id: session.user_id,
            });
        }
        Ok(())
    }
}

/// Profile store backed by process memory.
#[derive(Default)]
pub struct InMemoryProfileStore {
    roles: Mutex<HashMap<UserId, Role>>,
}

#[async_trait]
impl ProfileApi for InMemoryProfileStore {
    async fn role_of(&self, user_id: UserId) -> Result<Option<Role>> {
        Ok(lock(&self.roles).get(&user_id).copied())
    }

    async fn assign_role(&self, user_id: UserId, role: Role) -> Result<()> {
        let mut roles = lock(&self.roles);
        if roles.contains_key(&user_id) {
            return Err(Error::BadRequest {
                message: "profile already exists; roles are fixed at signup".to_string(),
            });
        }
        roles.insert(user_id, role);
        Ok(())
    }
}

/// Quest store backed by process memory.
#[derive(Default)]
pub struct InMemoryQuestStore {
    quests: Mutex<HashMap<QuestId, Quest>>,
    applications: Mutex<Vec<QuestApplication>>,
}

#[async_trait]
impl QuestStore for InMemoryQuestStore {
    async fn list(&self, filter: QuestFilter) -> Result<Vec<Quest>> {
        let quests = lock(&self.quests);
        let mut matching: Vec<Quest> = quests
            .values()
            .filter(|q| filter.status.is_none_or(|s| q.status == s))
            .filter(|q| filter.created_by.is_none_or(|u| q.created_by == u))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn get(&self, id: QuestId) -> Result<Option<Quest>> {
        Ok(lock(&self.quests).get(&id).cloned())
    }

    async fn create(&self, created_by: UserId, quest: &QuestCreate) -> Result<Quest> {
        let record = Quest {
            id: Uuid::new_v4(),
            title: quest.title.clone(),
            detail: quest.detail.clone(),
            skills: quest.skills.clone(),
            deadline: quest.deadline,
            compensation: quest.compensation,
            status: QuestStatus::Open,
            created_by,
            assigned_to: None,
            created_at: Utc::now(),
        };
        lock(&self.quests).insert(record.id, record.clone());
        Ok(record)
    }

    async fn apply(&self, quest_id: QuestId, applicant: UserId) -> Result<QuestApplication> {
        let quest = lock(&self.quests).get(&quest_id).cloned().ok_or_else(|| Error::NotFound {
            resource: "quest".to_string(),
            id: quest_id.to_string(),
        })?;
        if quest.status != QuestStatus::Open {
            return Err(Error::BadRequest {
                message: "quest is no longer accepting applications".to_string(),
            });
        }

        let mut applications = lock(&self.applications);
        if let Some(existing) = applications
            .iter()
            .find(|a| a.quest_id == quest_id && a.applicant == applicant)
        {
            return Ok(existing.clone());
        }
        let application = QuestApplication {
            quest_id,
            applicant,
            created_at: Utc::now(),
        };
        applications.push(application.clone());
        Ok(application)
    }

    async fn applications(&self, quest_id: QuestId) -> Result<Vec<QuestApplication>> {
        let applications = lock(&self.applications);
        let mut matching: Vec<QuestApplication> = applications.iter().filter(|a| a.quest_id == quest_id).cloned().collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }

    async fn accept_application(&self, quest_id: QuestId, applicant: UserId) -> Result<Quest> {
        let applied = lock(&self.applications)
            .iter()
            .any(|a| a.quest_id == quest_id && a.applicant == applicant);
        if !applied {
            return Err(Error::NotFound {
                resource: "quest application".to_string(),
                id: format!("{quest_id}/{applicant}"),
            });
        }

        let mut quests = lock(&self.quests);
        let quest = quests.get_mut(&quest_id).ok_or_else(|| Error::NotFound {
            resource: "quest".to_string(),
            id: quest_id.to_string(),
        })?;
        if quest.status != QuestStatus::Open {
            return Err(Error::BadRequest {
                message: "quest has already been awarded".to_string(),
            });
        }
        quest.status = QuestStatus::Accepted;
        quest.assigned_to = Some(applicant);
        Ok(quest.clone())
    }

    async fn assigned_to(&self, user_id: UserId) -> Result<Vec<Quest>> {
        let quests = lock(&self.quests);
        let mut matching: Vec<Quest> = quests
            .values()
            .filter(|q| q.assigned_to == Some(user_id) && q.status == QuestStatus::Accepted)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}

/// Party request store backed by process memory.
#[derive(Default)]
pub struct InMemoryPartyStore {
    requests: Mutex<HashMap<PartyRequestId, PartyRequest>>,
}

#[async_trait]
impl PartyStore for InMemoryPartyStore {
    async fn create(&self, quest_id: QuestId, from_user: UserId, to_user: UserId) -> Result<PartyRequest> {
        if from_user == to_user {
            return Err(Error::BadRequest {
                message: "cannot send a party request to yourself".to_string(),
            });
        }
        let mut requests = lock(&self.requests);
        if let Some(existing) = requests.values().find(|r| {
            r.quest_id == quest_id
                && r.from_user == from_user
                && r.to_user == to_user
                && r.status == PartyRequestStatus::Pending
        }) {
            return Ok(existing.clone());
        }
        let request = PartyRequest {
            id: Uuid::new_v4(),
            quest_id,
            from_user,
            to_user,
            status: PartyRequestStatus::Pending,
            created_at: Utc::now(),
        };
        requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn incoming(&self, to_user: UserId) -> Result<Vec<PartyRequest>> {
        let requests = lock(&self.requests);
        let mut matching: Vec<PartyRequest> = requests.values().filter(|r| r.to_user == to_user).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn get(&self, id: PartyRequestId) -> Result<Option<PartyRequest>> {
        Ok(lock(&self.requests).get(&id).cloned())
    }

    async fn respond(&self, id: PartyRequestId, status: PartyRequestStatus) -> Result<PartyRequest> {
        let mut requests = lock(&self.requests);
        let request = requests.get_mut(&id).ok_or_else(|| Error::NotFound {
            resource: "party request".to_string(),
            id: id.to_string(),
        })?;
        if request.status != PartyRequestStatus::Pending {
            return Err(Error::BadRequest {
                message: "party request has already been resolved".to_string(),
            });
        }
        request.status = status;
        Ok(request.clone())
    }
}

/// Message store backed by process memory.
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: Mutex<Vec<Message>>,
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn send(&self, sender: UserId, recipient: UserId, body: &str) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            sender,
            recipient,
            body: body.to_string(),
            read: false,
            created_at: Utc::now(),
        };
        lock(&self.messages).push(message.clone());
        Ok(message)
    }

    async fn inbox(&self, user_id: UserId) -> Result<Vec<Message>> {
        let messages = lock(&self.messages);
        let mut matching: Vec<Message> = messages.iter().filter(|m| m.recipient == user_id).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn mark_read(&self, id: MessageId, recipient: UserId) -> Result<Message> {
        let mut messages = lock(&self.messages);
        let message = messages
            .iter_mut()
            .find(|m| m.id == id && m.recipient == recipient)
            .ok_or_else(|| Error::NotFound {
                resource: "message".to_string(),
                id: id.to_string(),
            })?;
        message.read = true;
        Ok(message.clone())
    }

    async fn unread_count(&self, user_id: UserId) -> Result<u64> {
        let messages = lock(&self.messages);
        Ok(messages.iter().filter(|m| m.recipient == user_id && !m.read).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn auth_service() -> InMemoryAuthService {
        InMemoryAuthService::new("test-secret".to_string(), Duration::from_secs(3600))
    }

    fn credentials(email: &str) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: "hunter2hunter2".to_string(),
        }
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let auth = auth_service();
        let signup = auth.sign_up(&credentials("dev@example.com")).await.unwrap();
        assert_eq!(signup.email, "dev@example.com");

        let login = auth.sign_in(&credentials("dev@example.com")).await.unwrap();
        assert_eq!(login.user_id, signup.user_id);
        assert_ne!(login.access_token, "");

        let resolved = auth.current_session(&login.access_token).await.unwrap();
        assert_eq!(resolved.map(|s| s.user_id), Some(signup.user_id));
    }

    #[tokio::test]
    async fn test_sign_in_wrong_password() {
        let auth = auth_service();
        auth.sign_up(&credentials("dev@example.com")).await.unwrap();

        let mut bad = credentials("dev@example.com");
        bad.password = "wrong-password".to_string();
        let result = auth.sign_in(&bad).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_sign_in_unknown_user_same_error_as_wrong_password() {
        let auth = auth_service();
        let result = auth.sign_in(&credentials("nobody@example.com")).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_rejected() {
        let auth = auth_service();
        auth.sign_up(&credentials("dev@example.com")).await.unwrap();
        let result = auth.sign_up(&credentials("DEV@example.com")).await;
        assert!(matches!(result.unwrap_err(), Error::BadRequest { .. }));
    }

    #[tokio::test]
    async fn test_sign_out_invalidates_token_and_broadcasts() {
        let auth = auth_service();
        let mut events = auth.subscribe();

        let session = auth.sign_up(&credentials("dev@example.com")).await.unwrap();
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::SignedIn(_)));

        auth.sign_out(&session.access_token).await.unwrap();
        match events.recv().await.unwrap() {
            SessionEvent::SignedOut { access_token, user_id } => {
                assert_eq!(access_token, session.access_token);
                assert_eq!(user_id, session.user_id);
            }
            other => panic!("expected SignedOut, got {other:?}"),
        }

        assert!(auth.current_session(&session.access_token).await.unwrap().is_none());
        // Idempotent, and no second event
        auth.sign_out(&session.access_token).await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_keeps_token_and_user() {
        let auth = auth_service();
        let session = auth.sign_up(&credentials("dev@example.com")).await.unwrap();
        let mut events = auth.subscribe();

        let refreshed = auth.refresh(&session.access_token).unwrap();
        assert_eq!(refreshed.access_token, session.access_token);
        assert_eq!(refreshed.user_id, session.user_id);
        assert!(refreshed.expires_at >= session.expires_at);
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::TokenRefreshed(_)));
    }

    #[tokio::test]
    async fn test_role_assigned_exactly_once() {
        let profiles = InMemoryProfileStore::default();
        let user_id = Uuid::new_v4();

        assert_eq!(profiles.role_of(user_id).await.unwrap(), None);
        profiles.assign_role(user_id, Role::Programmer).await.unwrap();
        assert_eq!(profiles.role_of(user_id).await.unwrap(), Some(Role::Programmer));

        let result = profiles.assign_role(user_id, Role::Company).await;
        assert!(matches!(result.unwrap_err(), Error::BadRequest { .. }));
        assert_eq!(profiles.role_of(user_id).await.unwrap(), Some(Role::Programmer));
    }

    fn quest_create(title: &str) -> QuestCreate {
        QuestCreate {
            title: title.to_string(),
            detail: "build the thing".to_string(),
            skills: vec!["rust".to_string()],
            deadline: None,
            compensation: 5000,
        }
    }

    #[tokio::test]
    async fn test_quest_lifecycle() {
        let store = InMemoryQuestStore::default();
        let company = Uuid::new_v4();
        let programmer = Uuid::new_v4();

        let quest = store.create(company, &quest_create("API integration")).await.unwrap();
        assert_eq!(quest.status, QuestStatus::Open);

        store.apply(quest.id, programmer).await.unwrap();
        // Applying twice stays a single application
        store.apply(quest.id, programmer).await.unwrap();
        assert_eq!(store.applications(quest.id).await.unwrap().len(), 1);

        let awarded = store.accept_application(quest.id, programmer).await.unwrap();
        assert_eq!(awarded.status, QuestStatus::Accepted);
        assert_eq!(awarded.assigned_to, Some(programmer));

        let assigned = store.assigned_to(programmer).await.unwrap();
        assert_eq!(assigned.len(), 1);

        // No further applications once awarded
        let late = store.apply(quest.id, Uuid::new_v4()).await;
        assert!(matches!(late.unwrap_err(), Error::BadRequest { .. }));
    }

    #[tokio::test]
    async fn test_accept_requires_prior_application() {
        let store = InMemoryQuestStore::default();
        let quest = store.create(Uuid::new_v4(), &quest_create("Data pipeline")).await.unwrap();
        let result = store.accept_application(quest.id, Uuid::new_v4()).await;
        assert!(matches!(result.unwrap_err(), Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_owner() {
        let store = InMemoryQuestStore::default();
        let company_a = Uuid::new_v4();
        let company_b = Uuid::new_v4();
        store.create(company_a, &quest_create("one")).await.unwrap();
        store.create(company_b, &quest_create("two")).await.unwrap();

        let all = store.list(QuestFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let mine = store
            .list(QuestFilter {
                created_by: Some(company_a),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].created_by, company_a);

        let accepted = store
            .list(QuestFilter {
                status: Some(QuestStatus::Accepted),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(accepted.is_empty());
    }

    #[tokio::test]
    async fn test_party_request_flow() {
        let store = InMemoryPartyStore::default();
        let quest_id = Uuid::new_v4();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let request = store.create(quest_id, alice, bob).await.unwrap();
        // Re-sending while pending returns the same invitation
        let duplicate = store.create(quest_id, alice, bob).await.unwrap();
        assert_eq!(duplicate.id, request.id);

        let incoming = store.incoming(bob).await.unwrap();
        assert_eq!(incoming.len(), 1);

        let resolved = store.respond(request.id, PartyRequestStatus::Accepted).await.unwrap();
        assert_eq!(resolved.status, PartyRequestStatus::Accepted);

        let again = store.respond(request.id, PartyRequestStatus::Declined).await;
        assert!(matches!(again.unwrap_err(), Error::BadRequest { .. }));
    }

    #[tokio::test]
    async fn test_party_request_to_self_rejected() {
        let store = InMemoryPartyStore::default();
        let user = Uuid::new_v4();
        let result = store.create(Uuid::new_v4(), user, user).await;
        assert!(matches!(result.unwrap_err(), Error::BadRequest { .. }));
    }

    #[tokio::test]
    async fn test_messages_inbox_and_unread() {
        let store = InMemoryMessageStore::default();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let first = store.send(alice, bob, "hello").await.unwrap();
        store.send(alice, bob, "are you there?").await.unwrap();
        store.send(bob, alice, "yes").await.unwrap();

        assert_eq!(store.inbox(bob).await.unwrap().len(), 2);
        assert_eq!(store.unread_count(bob).await.unwrap(), 2);

        store.mark_read(first.id, bob).await.unwrap();
        assert_eq!(store.unread_count(bob).await.unwrap(), 1);

        // Only the recipient can mark a message read
        let result = store.mark_read(first.id, alice).await;
        assert!(matches!(result.unwrap_err(), Error::NotFound { .. }));
    }
}
