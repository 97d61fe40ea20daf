use crate::adapters::database::records::ConversationRecord;
use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct ConversationRepository {}

impl ConversationRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Finds the conversation for a participant pair.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_by_participants(
        &self,
        conn: &mut PgConnection,
        pair: ParticipantPair,
    ) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT id, participant_low, participant_high, last_message, last_message_time, created_at
            FROM conversations
            WHERE participant_low = $1 AND participant_high = $2
            "#,
        )
        .bind(pair.low())
        .bind(pair.high())
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }

    /// Finds a conversation by id, only if `user_id` takes part in it.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_for_participant(
        &self,
        conn: &mut PgConnection,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT id, participant_low, participant_high, last_message, last_message_time, created_at
            FROM conversations
            WHERE id = $1 AND (participant_low = $2 OR participant_high = $2)
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }

    /// Loads a conversation by id.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_by_id(&self, conn: &mut PgConnection, conversation_id: Uuid) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT id, participant_low, participant_high, last_message, last_message_time, created_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }

    /// Inserts a new conversation.
    ///
    /// # Errors
    /// Returns `AppError::DuplicateConversation` if the pair already has one.
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, conversation), fields(conversation_id = %conversation.id))]
    pub(crate) async fn create(&self, conn: &mut PgConnection, conversation: &Conversation) -> Result<Conversation> {
        let result = sqlx::query_as::<_, ConversationRecord>(
            r#"
            INSERT INTO conversations (id, participant_low, participant_high, last_message, last_message_time, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, participant_low, participant_high, last_message, last_message_time, created_at
            "#,
        )
        .bind(conversation.id)
        .bind(conversation.participants.low())
        .bind(conversation.participants.high())
        .bind(&conversation.last_message)
        .bind(conversation.last_message_time)
        .bind(conversation.created_at)
        .fetch_one(conn)
        .await;

        match result {
            Ok(record) => Ok(record.into()),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23505") => {
                // Unique violation on (participant_low, participant_high)
                Err(AppError::DuplicateConversation)
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// Row-locks a conversation for the rest of the transaction and returns
    /// its current `last_message_time`.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn lock_last_message_time(
        &self,
        conn: &mut PgConnection,
        conversation_id: Uuid,
    ) -> Result<Option<OffsetDateTime>> {
        let last_message_time = sqlx::query_scalar::<_, OffsetDateTime>(
            r#"
            SELECT last_message_time
            FROM conversations
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(conn)
        .await?;

        Ok(last_message_time)
    }

    /// Updates the denormalized summary fields.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn, last_message))]
    pub(crate) async fn update_summary(
        &self,
        conn: &mut PgConnection,
        conversation_id: Uuid,
        last_message: &str,
        last_message_time: OffsetDateTime,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET last_message = $2, last_message_time = $3
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .bind(last_message)
        .bind(last_message_time)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
