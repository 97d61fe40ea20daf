use crate::error::{AppError, Result};
use uuid::Uuid;

/// What a client-supplied chat reference turned out to denote.
///
/// Clients send one opaque value that is either a conversation id or the id of
/// the user they want to talk to. The two identifier spaces never mix in
/// storage; resolution tries the conversation space first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTarget {
    Conversation(Uuid),
    Counterpart(Uuid),
}

/// A syntactically valid but not yet resolved chat reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatReference(Uuid);

impl ChatReference {
    /// Parses the raw value sent by a client.
    ///
    /// # Errors
    /// Returns `AppError::InvalidReference` if the value is not an identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| AppError::InvalidReference(format!("'{raw}' is not a valid identifier")))
    }

    #[must_use]
    pub const fn id(self) -> Uuid {
        self.0
    }

    /// Reading of the reference as a conversation id, tried first.
    #[must_use]
    pub const fn as_conversation(self) -> ChatTarget {
        ChatTarget::Conversation(self.0)
    }

    /// Fallback reading as the counterpart's user id.
    #[must_use]
    pub const fn as_counterpart(self) -> ChatTarget {
        ChatTarget::Counterpart(self.0)
    }
}
