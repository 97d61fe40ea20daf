use crate::error::{AppError, Result};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// The unordered pair of users taking part in a conversation.
///
/// Stored sorted so `{a, b}` and `{b, a}` map to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantPair {
    low: Uuid,
    high: Uuid,
}

impl ParticipantPair {
    /// Builds the canonical pair for two distinct users.
    ///
    /// # Errors
    /// Returns `AppError::InvalidReference` if both ids are the same user.
    pub fn new(a: Uuid, b: Uuid) -> Result<Self> {
        if a == b {
            return Err(AppError::InvalidReference("cannot open a conversation with yourself".into()));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { low, high })
    }

    /// Rebuilds a pair from columns already stored in sorted order.
    #[must_use]
    pub(crate) const fn from_sorted(low: Uuid, high: Uuid) -> Self {
        Self { low, high }
    }

    #[must_use]
    pub const fn low(&self) -> Uuid {
        self.low
    }

    #[must_use]
    pub const fn high(&self) -> Uuid {
        self.high
    }

    #[must_use]
    pub fn contains(&self, user_id: Uuid) -> bool {
        self.low == user_id || self.high == user_id
    }


    #[must_use]
    pub const fn as_array(&self) -> [Uuid; 2] {
        [self.low, self.high]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    #[serde(serialize_with = "serialize_pair")]
    pub participants: ParticipantPair,
    pub last_message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_message_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Conversation {
    /// A freshly created conversation with empty summary fields.
    #[must_use]
    pub fn new(participants: ParticipantPair, now: OffsetDateTime) -> Self {
        Self { id: Uuid::now_v7(), participants, last_message: String::new(), last_message_time: now, created_at: now }
    }
}

fn serialize_pair<S: serde::Serializer>(pair: &ParticipantPair, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    pair.as_array().serialize(serializer)
}
