use crate::adapters::database::DbPool;
use crate::adapters::database::conversation_repo::ConversationRepository;
use crate::adapters::database::message_repo::MessageRepository;
use crate::adapters::store::ConversationStore;
use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::domain::message::{Message, NewMessage};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct PgConversationStore {
    pool: DbPool,
    conversation_repo: ConversationRepository,
    message_repo: MessageRepository,
}

impl PgConversationStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool, conversation_repo: ConversationRepository::new(), message_repo: MessageRepository::new() }
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn find_by_participants(&self, pair: ParticipantPair) -> Result<Option<Conversation>> {
        let mut conn = self.pool.acquire().await?;
        self.conversation_repo.find_by_participants(&mut conn, pair).await
    }

    async fn find_for_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<Option<Conversation>> {
        let mut conn = self.pool.acquire().await?;
        self.conversation_repo.find_for_participant(&mut conn, conversation_id, user_id).await
    }

    async fn get(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        let mut conn = self.pool.acquire().await?;
        self.conversation_repo.find_by_id(&mut conn, conversation_id).await
    }

    async fn insert(&self, conversation: Conversation) -> Result<Conversation> {
        let mut conn = self.pool.acquire().await?;
        self.conversation_repo.create(&mut conn, &conversation).await
    }

    async fn append_message(&self, mut message: NewMessage) -> Result<Message> {
        let summary = message.summary();

        let mut tx = self.pool.begin().await?;
        let last_message_time = self
            .conversation_repo
            .lock_last_message_time(&mut tx, message.conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        message.not_before(last_message_time);
        let stored = self.message_repo.create(&mut tx, &message).await?;
        self.conversation_repo.update_summary(&mut tx, stored.conversation_id, &summary, stored.created_at).await?;
        tx.commit().await?;

        Ok(stored)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let mut conn = self.pool.acquire().await?;
        self.message_repo.list_for_conversation(&mut conn, conversation_id).await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
