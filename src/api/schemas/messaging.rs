use crate::domain::chat::ChatTarget;
use crate::domain::conversation::Conversation;
use crate::domain::event::MessagePayload;
use crate::domain::message::MessageKind;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /v1/messages`. Exactly one of `receiverId` and `chatId` is set.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub receiver_id: Option<Uuid>,
    #[serde(default)]
    pub chat_id: Option<Uuid>,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
}

impl SendMessageRequest {
    /// # Errors
    /// Returns `AppError::BadRequest` unless exactly one target field is set.
    pub fn target(&self) -> Result<ChatTarget, AppError> {
        match (self.chat_id, self.receiver_id) {
            (Some(chat_id), None) => Ok(ChatTarget::Conversation(chat_id)),
            (None, Some(receiver_id)) => Ok(ChatTarget::Counterpart(receiver_id)),
            _ => Err(AppError::BadRequest("Exactly one of receiverId and chatId is required".into())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message: MessagePayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub conversation_id: Uuid,
    pub conversation: Conversation,
    pub messages: Vec<MessagePayload>,
}
