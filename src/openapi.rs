//! OpenAPI documentation configuration.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::api;
use crate::api::models;
use crate::auth::role::Role;
use crate::backend;

/// Session cookie security scheme.
struct SessionCookieAddon;

impl Modify for SessionCookieAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "SessionCookie".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("aiguild_session"))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::auth::login_info,
        api::handlers::auth::login,
        api::handlers::auth::signup,
        api::handlers::auth::logout,
        api::handlers::auth::me,
        api::handlers::dashboard::landing,
        api::handlers::dashboard::home,
        api::handlers::dashboard::company_dashboard,
        api::handlers::dashboard::accepted_jobs,
        api::handlers::quests::quest_detail,
        api::handlers::quests::create_quest,
        api::handlers::quests::apply_to_quest,
        api::handlers::quests::accept_application,
        api::handlers::parties::party_candidates,
        api::handlers::parties::invite_to_party,
        api::handlers::parties::incoming_party_requests,
        api::handlers::parties::respond_to_party_request,
        api::handlers::messages::inbox,
        api::handlers::messages::send_message,
        api::handlers::messages::mark_message_read,
    ),
    components(schemas(
        Role,
        models::auth::LoginInfo,
        models::auth::LoginRequest,
        models::auth::SignupRequest,
        models::auth::AuthResponse,
        models::auth::UserInfo,
        models::auth::LogoutBody,
        models::quests::LandingResponse,
        models::quests::HomePageResponse,
        models::quests::QuestDetailResponse,
        models::quests::QuestWithApplications,
        models::quests::CompanyDashboardResponse,
        models::quests::AcceptedJobsResponse,
        models::parties::PartyCandidatesResponse,
        models::parties::PartyInviteRequest,
        models::parties::PartyRespondRequest,
        models::parties::IncomingPartyRequestsResponse,
        models::messages::SendMessageRequest,
        models::messages::InboxResponse,
        backend::Quest,
        backend::QuestStatus,
        backend::QuestCreate,
        backend::QuestApplication,
        backend::PartyRequest,
        backend::PartyRequestStatus,
        backend::Message,
    )),
    modifiers(&SessionCookieAddon),
    tags(
        (name = "auth", description = "Login, signup, and session management"),
        (name = "pages", description = "Page data for the client"),
        (name = "quests", description = "Quest postings and applications"),
        (name = "parties", description = "Party search and invitations"),
        (name = "messages", description = "Direct messages"),
    ),
    info(
        title = "AI Guild API",
        description = "Backend for the AI Guild quest marketplace: companies post quests, programmers apply, form parties, and message each other.",
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates() {
        let spec = ApiDoc::openapi();
        let json = spec.to_json().expect("spec should serialize");
        assert!(json.contains("/auth/login"));
        assert!(json.contains("/party-requests/{id}"));
        // ID fields and path params serialize as uuid-formatted strings
        assert!(json.contains("\"format\":\"uuid\""));
    }
}
