use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::messaging::{HistoryResponse, SendMessageRequest, SendMessageResponse};
use crate::domain::event::MessagePayload;
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

/// Returns the full history of a chat, oldest first.
///
/// `chat_ref` is a conversation id or the id of the counterpart user. Asking
/// for a counterpart with no conversation yet creates an empty one.
///
/// # Errors
/// Returns `AppError::InvalidReference` if the reference is malformed.
/// Returns a persistence error if the store is unavailable.
pub async fn get_history(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(chat_ref): Path<String>,
) -> Result<Json<HistoryResponse>> {
    let (conversation, messages) = state.message_service.history(auth_user.user_id, &chat_ref).await?;

    Ok(Json(HistoryResponse {
        conversation_id: conversation.id,
        conversation,
        messages: messages.iter().map(MessagePayload::from).collect(),
    }))
}

/// Persists a message and delivers it to everyone joined to its conversation.
///
/// # Errors
/// Returns `AppError::BadRequest` if the target or content is invalid.
/// Returns `AppError::NotFound` if `chatId` names a conversation the caller is not part of.
/// Returns a persistence error if the store is unavailable.
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    let target = request.target()?;
    let message = state.message_service.send_to(auth_user.user_id, target, request.content, request.kind).await?;

    Ok((StatusCode::CREATED, Json(SendMessageResponse { message: MessagePayload::from(&message) })))
}
