//! External backend collaborators.
//!
//! Authentication, profile records, and domain records (quests, party
//! requests, messages) live outside this process. Each collaborator is a
//! trait seam with two implementations:
//!
//! - [`memory`]: in-process stores for tests and local development
//! - [`rest`]: reqwest clients against a hosted backend exposing a
//!   GoTrue-style auth API and a PostgREST-style data API
//!
//! The [`Backend`] aggregate bundles one implementation of each seam and is
//! carried in the application state.

pub mod auth_api;
pub mod memory;
pub mod messages;
pub mod parties;
pub mod profiles;
pub mod quests;
pub mod rest;

use std::sync::Arc;

use crate::config::{BackendConfig, Config};
pub use auth_api::{AuthApi, Credentials};
pub use messages::{Message, MessageStore};
pub use parties::{PartyRequest, PartyRequestStatus, PartyStore};
pub use profiles::ProfileApi;
pub use quests::{Quest, QuestApplication, QuestCreate, QuestFilter, QuestStatus, QuestStore};

/// One implementation of every collaborator seam.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthApi>,
    pub profiles: Arc<dyn ProfileApi>,
    pub quests: Arc<dyn QuestStore>,
    pub parties: Arc<dyn PartyStore>,
    pub messages: Arc<dyn MessageStore>,
}

impl Backend {
    /// In-process backend, lost on shutdown. The session token secret and
    /// timeout come from the application config.
    pub fn in_memory(config: &Config) -> anyhow::Result<Self> {
        let secret = config
            .secret_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("secret_key is required for the in-memory backend"))?;
        Ok(Self {
            auth: Arc::new(memory::InMemoryAuthService::new(secret, config.auth.session.timeout)),
            profiles: Arc::new(memory::InMemoryProfileStore::default()),
            quests: Arc::new(memory::InMemoryQuestStore::default()),
            parties: Arc::new(memory::InMemoryPartyStore::default()),
            messages: Arc::new(memory::InMemoryMessageStore::default()),
        })
    }

    /// Build the backend selected by the configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        match &config.backend {
            BackendConfig::Memory => Self::in_memory(config),
            BackendConfig::Rest {
                auth_url,
                data_url,
                api_key,
                request_timeout,
            } => {
                let http = reqwest::Client::builder().timeout(*request_timeout).build()?;
                let data = rest::DataApiClient::new(http.clone(), data_url.clone(), api_key.clone());
                Ok(Self {
                    auth: Arc::new(rest::RestAuthService::new(http, auth_url.clone(), api_key.clone())),
                    profiles: Arc::new(rest::RestProfileStore::new(data.clone())),
                    quests: Arc::new(rest::RestQuestStore::new(data.clone())),
                    parties: Arc::new(rest::RestPartyStore::new(data.clone())),
                    messages: Arc::new(rest::RestMessageStore::new(data)),
                })
            }
        }
    }
}
