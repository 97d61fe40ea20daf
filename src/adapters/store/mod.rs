use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::domain::message::{Message, NewMessage};
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryConversationStore;
pub use postgres::PgConversationStore;

/// Persistence backend for conversations and their messages.
///
/// Implementations must enforce at most one conversation per participant pair
/// and report a losing concurrent insert as `AppError::DuplicateConversation`.
#[async_trait]
pub trait ConversationStore: Send + Sync + std::fmt::Debug + 'static {
    async fn find_by_participants(&self, pair: ParticipantPair) -> Result<Option<Conversation>>;

    async fn find_for_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<Option<Conversation>>;

    async fn get(&self, conversation_id: Uuid) -> Result<Option<Conversation>>;

    async fn insert(&self, conversation: Conversation) -> Result<Conversation>;

    /// Stores the message and updates the parent's summary fields as one unit.
    async fn append_message(&self, message: NewMessage) -> Result<Message>;

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;

    async fn ping(&self) -> Result<()>;
}
