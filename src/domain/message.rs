use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Conversation summary shown in place of an image URL.
pub const IMAGE_SUMMARY: &str = "📷 Image";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    /// Content is the URL returned by asset storage.
    Image,
}

impl MessageKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }

    /// The `lastMessage` text a conversation shows for a message of this kind.
    #[must_use]
    pub fn summarize(self, content: &str) -> String {
        match self {
            Self::Text => content.to_string(),
            Self::Image => IMAGE_SUMMARY.to_string(),
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub created_at: OffsetDateTime,
}

/// A message accepted by the pipeline but not yet persisted.
///
/// The sender always comes from the bound session and the timestamp is
/// assigned here, never taken from client input.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub created_at: OffsetDateTime,
}

impl NewMessage {
    #[must_use]
    pub fn new(conversation_id: Uuid, sender_id: Uuid, content: String, kind: MessageKind) -> Self {
        Self {
            id: Uuid::now_v7(),
            conversation_id,
            sender_id,
            content,
            kind,
            created_at: truncate_to_micros(OffsetDateTime::now_utc()),
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        self.kind.summarize(&self.content)
    }

    /// Moves the timestamp past `floor` if the clock has not.
    ///
    /// Stores call this with the conversation's current `last_message_time`
    /// so a wall clock stepping backwards cannot reorder history.
    pub fn not_before(&mut self, floor: OffsetDateTime) {
        if self.created_at <= floor {
            self.created_at = truncate_to_micros(floor) + Duration::microseconds(1);
        }
    }
}

impl From<NewMessage> for Message {
    fn from(new: NewMessage) -> Self {
        Self {
            id: new.id,
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            content: new.content,
            kind: new.kind,
            created_at: new.created_at,
        }
    }
}

/// Postgres stores microseconds; truncating up front keeps the in-memory copy
/// identical to what a later read returns.
fn truncate_to_micros(ts: OffsetDateTime) -> OffsetDateTime {
    let micros = ts.microsecond();
    ts.replace_microsecond(micros).unwrap_or(ts)
}
