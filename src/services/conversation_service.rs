use crate::adapters::store::ConversationStore;
use crate::config::MessagingConfig;
use crate::domain::chat::{ChatReference, ChatTarget};
use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::domain::message::{Message, MessageKind, NewMessage};
use crate::error::{AppError, Result};
use backon::{ConstantBuilder, Retryable};
use opentelemetry::{global, metrics::Counter};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    created_total: Counter<u64>,
    create_conflicts_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("duet-server");
        Self {
            created_total: meter
                .u64_counter("duet_conversations_created_total")
                .with_description("Total conversations created on first contact")
                .build(),
            create_conflicts_total: meter
                .u64_counter("duet_conversation_create_conflicts_total")
                .with_description("Concurrent first contacts resolved by re-reading the winning conversation")
                .build(),
        }
    }
}

/// Conversation and message persistence rules on top of a [`ConversationStore`].
#[derive(Clone, Debug)]
pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    create_attempts: usize,
    metrics: Metrics,
}

impl ConversationService {
    #[must_use]
    pub fn new(store: Arc<dyn ConversationStore>, config: &MessagingConfig) -> Self {
        Self { store, create_attempts: config.conversation_create_attempts.max(1), metrics: Metrics::new() }
    }

    /// Returns the single conversation between two users, creating it on first contact.
    ///
    /// Order of the arguments does not matter. Two callers racing on the same
    /// new pair both end up with the conversation that won the insert.
    ///
    /// # Errors
    /// Returns `AppError::InvalidReference` if both ids are the same user.
    /// Returns a persistence error if the store is unavailable.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn get_or_create_by_participants(&self, user_a: Uuid, user_b: Uuid) -> Result<Conversation> {
        let pair = ParticipantPair::new(user_a, user_b)?;

        let backoff = ConstantBuilder::default()
            .with_delay(Duration::from_millis(5))
            .with_max_times(self.create_attempts);

        let result = (|| self.find_or_insert(pair))
            .retry(backoff)
            .when(|e| matches!(e, AppError::DuplicateConversation))
            .notify(|_, _| {
                self.metrics.create_conflicts_total.add(1, &[]);
                tracing::debug!("Concurrent first contact detected, re-reading conversation");
            })
            .await;

        match result {
            Err(AppError::DuplicateConversation) => {
                tracing::error!("Could not converge on a conversation for participant pair");
                Err(AppError::Internal)
            }
            other => other,
        }
    }

    async fn find_or_insert(&self, pair: ParticipantPair) -> Result<Conversation> {
        if let Some(existing) = self.store.find_by_participants(pair).await? {
            return Ok(existing);
        }

        let created = self.store.insert(Conversation::new(pair, OffsetDateTime::now_utc())).await?;
        self.metrics.created_total.add(1, &[]);
        tracing::info!(conversation_id = %created.id, "Conversation created");
        Ok(created)
    }

    /// The conversation between two users if one exists. Never creates.
    ///
    /// # Errors
    /// Returns `AppError::InvalidReference` if both ids are the same user.
    /// Returns a persistence error if the store is unavailable.
    pub async fn find_between(&self, user_a: Uuid, user_b: Uuid) -> Result<Option<Conversation>> {
        self.store.find_by_participants(ParticipantPair::new(user_a, user_b)?).await
    }

    /// Resolves a raw chat reference sent by `requester_id`.
    ///
    /// The value is first read as a conversation id the requester takes part
    /// in, then as the id of the counterpart user.
    ///
    /// # Errors
    /// Returns `AppError::InvalidReference` if the value is not an identifier.
    /// Returns a persistence error if the store is unavailable.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn resolve_chat_reference(&self, requester_id: Uuid, raw: &str) -> Result<Conversation> {
        self.resolve_reference(requester_id, ChatReference::parse(raw)?).await
    }

    /// Resolves an already parsed chat reference. See [`ConversationService::resolve_chat_reference`].
    ///
    /// # Errors
    /// Returns a persistence error if the store is unavailable.
    pub async fn resolve_reference(&self, requester_id: Uuid, reference: ChatReference) -> Result<Conversation> {
        match self.resolve_target(requester_id, reference.as_conversation()).await {
            Err(AppError::NotFound) => self.resolve_target(requester_id, reference.as_counterpart()).await,
            resolved => resolved,
        }
    }

    /// Resolves a reference whose meaning the caller already knows.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` for a conversation the requester is not part of.
    /// Returns `AppError::InvalidReference` if the counterpart is the requester.
    pub async fn resolve_target(&self, requester_id: Uuid, target: ChatTarget) -> Result<Conversation> {
        match target {
            ChatTarget::Conversation(id) => {
                self.store.find_for_participant(id, requester_id).await?.ok_or(AppError::NotFound)
            }
            ChatTarget::Counterpart(user_id) => self.get_or_create_by_participants(requester_id, user_id).await,
        }
    }

    /// Persists a message in a conversation the sender takes part in.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist for the sender.
    /// Returns a persistence error if the store is unavailable.
    #[tracing::instrument(err(level = "warn"), skip(self, content))]
    pub async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: String,
        kind: MessageKind,
    ) -> Result<Message> {
        let conversation =
            self.store.find_for_participant(conversation_id, sender_id).await?.ok_or(AppError::NotFound)?;
        self.append_to(&conversation, sender_id, content, kind).await
    }

    pub(crate) async fn append_to(
        &self,
        conversation: &Conversation,
        sender_id: Uuid,
        content: String,
        kind: MessageKind,
    ) -> Result<Message> {
        if !conversation.participants.contains(sender_id) {
            return Err(AppError::NotFound);
        }
        self.store.append_message(NewMessage::new(conversation.id, sender_id, content, kind)).await
    }

    /// Every message of a conversation, oldest first.
    ///
    /// # Errors
    /// Returns a persistence error if the store is unavailable.
    pub async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.store.list_messages(conversation_id).await
    }

    /// Loads a conversation by id without a participant check.
    ///
    /// # Errors
    /// Returns a persistence error if the store is unavailable.
    pub async fn get(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        self.store.get(conversation_id).await
    }
}
