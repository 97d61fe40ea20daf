use crate::adapters::store::ConversationStore;
use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::domain::message::{Message, NewMessage};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    conversations: HashMap<Uuid, Conversation>,
    by_pair: HashMap<ParticipantPair, Uuid>,
    messages: HashMap<Uuid, Vec<Message>>,
}

/// Process-local store for single-node and development deployments.
///
/// Data lives only as long as the process. Uniqueness of the participant pair
/// is enforced the same way the Postgres schema does.
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    state: Mutex<State>,
}

impl MemoryConversationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored conversations.
    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.state().conversations.len()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn find_by_participants(&self, pair: ParticipantPair) -> Result<Option<Conversation>> {
        let state = self.state();
        Ok(state.by_pair.get(&pair).and_then(|id| state.conversations.get(id)).cloned())
    }

    async fn find_for_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<Option<Conversation>> {
        let state = self.state();
        Ok(state.conversations.get(&conversation_id).filter(|c| c.participants.contains(user_id)).cloned())
    }

    async fn get(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.state().conversations.get(&conversation_id).cloned())
    }

    async fn insert(&self, conversation: Conversation) -> Result<Conversation> {
        let mut state = self.state();
        if state.by_pair.contains_key(&conversation.participants) {
            return Err(AppError::DuplicateConversation);
        }
        state.by_pair.insert(conversation.participants, conversation.id);
        state.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn append_message(&self, mut message: NewMessage) -> Result<Message> {
        let summary = message.summary();
        let mut state = self.state();

        let conversation = state.conversations.get_mut(&message.conversation_id).ok_or(AppError::NotFound)?;
        message.not_before(conversation.last_message_time);
        conversation.last_message = summary;
        conversation.last_message_time = message.created_at;

        let stored = Message::from(message);
        state.messages.entry(stored.conversation_id).or_default().push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let mut messages = self.state().messages.get(&conversation_id).cloned().unwrap_or_default();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
