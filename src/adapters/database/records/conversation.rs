use crate::domain::conversation::{Conversation, ParticipantPair};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct ConversationRecord {
    pub(crate) id: Uuid,
    pub(crate) participant_low: Uuid,
    pub(crate) participant_high: Uuid,
    pub(crate) last_message: String,
    pub(crate) last_message_time: OffsetDateTime,
    pub(crate) created_at: OffsetDateTime,
}

impl From<ConversationRecord> for Conversation {
    fn from(record: ConversationRecord) -> Self {
        Self {
            id: record.id,
            participants: ParticipantPair::from_sorted(record.participant_low, record.participant_high),
            last_message: record.last_message,
            last_message_time: record.last_message_time,
            created_at: record.created_at,
        }
    }
}
