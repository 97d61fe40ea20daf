//! Events exchanged over the live channel.
//!
//! Frames are JSON objects of the form `{"event": "<name>", "data": <payload>}`.

use crate::domain::message::{Message, MessageKind};
use crate::domain::presence::PresenceStatus;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Authenticate(AuthenticatePayload),
    /// Chat reference of the room to join.
    JoinChat(String),
    LeaveChat(String),
    SendMessage(SendMessagePayload),
    SetStatus(SetStatusPayload),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatePayload {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub chat_id: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    /// Display hint from the client. The bound session identity is used instead.
    #[serde(default)]
    pub sender: Option<String>,
    /// Display hint from the client. The server assigns the stored timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SetStatusPayload {
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    AuthenticationSuccess,
    AuthenticationError(String),
    ChatJoined(ChatJoinedPayload),
    ReceiveMessage(MessagePayload),
    MessageSent(MessagePayload),
    UserStatusChange(StatusChangePayload),
    Error(String),
}

impl ServerEvent {
    /// Short name used in logs and metrics labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AuthenticationSuccess => "authentication_success",
            Self::AuthenticationError(_) => "authentication_error",
            Self::ChatJoined(_) => "chat_joined",
            Self::ReceiveMessage(_) => "receive_message",
            Self::MessageSent(_) => "message_sent",
            Self::UserStatusChange(_) => "user_status_change",
            Self::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatJoinedPayload {
    pub chat_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender: Uuid,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl From<&Message> for MessagePayload {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            chat_id: message.conversation_id,
            sender: message.sender_id,
            content: message.content.clone(),
            kind: message.kind,
            timestamp: message.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangePayload {
    pub user_id: Uuid,
    pub status: PresenceStatus,
}
