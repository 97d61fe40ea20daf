use crate::config::MessagingConfig;
use crate::domain::chat::{ChatReference, ChatTarget};
use crate::domain::conversation::Conversation;
use crate::domain::event::{MessagePayload, ServerEvent};
use crate::domain::message::{Message, MessageKind};
use crate::domain::session::LiveSession;
use crate::error::{AppError, Result};
use crate::services::conversation_service::ConversationService;
use crate::services::room_router::RoomRouter;
use dashmap::DashMap;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    sent_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("duet-server");
        Self {
            sent_total: meter
                .u64_counter("duet_messages_sent_total")
                .with_description("Messages accepted for persistence, by outcome")
                .build(),
        }
    }
}

/// Ingress and egress of chat messages: persist first, then fan out to the room.
#[derive(Clone, Debug)]
pub struct MessageService {
    conversations: ConversationService,
    rooms: Arc<RoomRouter>,
    // One gate per conversation with a send in flight. Holding it across
    // append and publish keeps live delivery in persistence order.
    send_gates: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    config: MessagingConfig,
    metrics: Metrics,
}

impl MessageService {
    #[must_use]
    pub fn new(conversations: ConversationService, rooms: Arc<RoomRouter>, config: MessagingConfig) -> Self {
        Self { conversations, rooms, send_gates: Arc::new(DashMap::new()), config, metrics: Metrics::new() }
    }

    /// Sends a message from a live session to whatever `chat_ref` resolves to.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the content is empty or too large.
    /// Returns `AppError::InvalidReference` if the reference is malformed.
    /// Returns a persistence error if the message could not be stored. Nothing is published then.
    pub async fn handle_send(
        &self,
        session: &LiveSession,
        chat_ref: &str,
        content: String,
        kind: MessageKind,
    ) -> Result<Message> {
        let reference = ChatReference::parse(chat_ref)?;
        self.send(session.user_id(), Resolve::Reference(reference), content, kind).await
    }

    /// Sends a message whose target the caller already classified.
    ///
    /// # Errors
    /// Same as [`MessageService::handle_send`], plus `AppError::NotFound` for a
    /// conversation the sender is not part of.
    pub async fn send_to(
        &self,
        sender_id: Uuid,
        target: ChatTarget,
        content: String,
        kind: MessageKind,
    ) -> Result<Message> {
        self.send(sender_id, Resolve::Target(target), content, kind).await
    }

    #[tracing::instrument(
        err(level = "warn"),
        skip(self, content),
        fields(conversation_id = tracing::field::Empty, message_id = tracing::field::Empty)
    )]
    async fn send(&self, sender_id: Uuid, target: Resolve, content: String, kind: MessageKind) -> Result<Message> {
        self.validate(&content)?;

        let conversation = match target {
            Resolve::Reference(reference) => self.conversations.resolve_reference(sender_id, reference).await?,
            Resolve::Target(target) => self.conversations.resolve_target(sender_id, target).await?,
        };
        tracing::Span::current().record("conversation_id", tracing::field::display(conversation.id));

        let result = self.append_and_publish(&conversation, sender_id, content, kind).await;

        let status = if result.is_ok() { "success" } else { "failure" };
        self.metrics.sent_total.add(1, &[KeyValue::new("status", status)]);
        result
    }

    async fn append_and_publish(
        &self,
        conversation: &Conversation,
        sender_id: Uuid,
        content: String,
        kind: MessageKind,
    ) -> Result<Message> {
        let gate = Arc::clone(&self.send_gates.entry(conversation.id).or_default());
        let guard = gate.lock().await;
        let result = self.conversations.append_to(conversation, sender_id, content, kind).await;
        if let Ok(message) = &result {
            tracing::Span::current().record("message_id", tracing::field::display(message.id));
            let event = ServerEvent::ReceiveMessage(MessagePayload::from(message));
            let delivered = self.rooms.publish(conversation.id, &event);
            tracing::debug!(delivered, "Message published to room");
        }
        drop(guard);
        drop(gate);
        self.send_gates.remove_if(&conversation.id, |_, gate| Arc::strong_count(gate) == 1);
        result
    }

    fn validate(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(AppError::BadRequest("Message content is empty".into()));
        }
        if content.len() > self.config.max_content_bytes {
            return Err(AppError::BadRequest(format!(
                "Message content exceeds {} bytes",
                self.config.max_content_bytes
            )));
        }
        Ok(())
    }

    /// Resolves a chat reference and returns its full history, oldest first.
    ///
    /// A counterpart id with no conversation yet creates an empty one.
    ///
    /// # Errors
    /// Returns `AppError::InvalidReference` if the reference is malformed.
    /// Returns a persistence error if the store is unavailable.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn history(&self, requester_id: Uuid, chat_ref: &str) -> Result<(Conversation, Vec<Message>)> {
        let conversation = self.conversations.resolve_chat_reference(requester_id, chat_ref).await?;
        let messages = self.conversations.list_messages(conversation.id).await?;
        Ok((conversation, messages))
    }

    #[must_use]
    pub fn conversations(&self) -> &ConversationService {
        &self.conversations
    }
}

#[derive(Debug)]
enum Resolve {
    Reference(ChatReference),
    Target(ChatTarget),
}
