//! Direct messages.

use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

use crate::{
    AppState,
    api::models::messages::{InboxResponse, SendMessageRequest},
    auth::middleware::CurrentUser,
    backend::Message,
    errors::Error,
    types::{MessageId, abbrev_uuid},
};

/// The current user's inbox
#[utoipa::path(
    get,
    path = "/messages",
    tag = "messages",
    responses(
        (status = 200, description = "Inbox", body = InboxResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn inbox(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<InboxResponse>, Error> {
    let messages = state.backend.messages.inbox(current_user.user_id).await?;
    let unread = state.backend.messages.unread_count(current_user.user_id).await?;
    Ok(Json(InboxResponse { messages, unread }))
}

/// Send a direct message
#[utoipa::path(
    post,
    path = "/messages",
    request_body = SendMessageRequest,
    tag = "messages",
    responses(
        (status = 200, description = "Message sent", body = Message),
        (status = 400, description = "Invalid input"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn send_message(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<Message>, Error> {
    if request.body.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Message body must not be empty".to_string(),
        });
    }
    if request.recipient == current_user.user_id {
        return Err(Error::BadRequest {
            message: "Cannot message yourself".to_string(),
        });
    }

    let message = state
        .backend
        .messages
        .send(current_user.user_id, request.recipient, &request.body)
        .await?;
    Ok(Json(message))
}

/// Mark a received message as read
#[utoipa::path(
    post,
    path = "/messages/{id}/read",
    tag = "messages",
    params(("id" = Uuid, Path, description = "Message ID")),
    responses(
        (status = 200, description = "Message marked read", body = Message),
        (status = 404, description = "No such message in this inbox"),
    )
)]
#[tracing::instrument(skip_all, fields(message_id = %abbrev_uuid(&id)))]
pub async fn mark_message_read(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<MessageId>,
) -> Result<Json<Message>, Error> {
    let message = state.backend.messages.mark_read(id, current_user.user_id).await?;
    Ok(Json(message))
}
