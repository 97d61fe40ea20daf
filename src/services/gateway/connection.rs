use crate::domain::event::{AuthenticatePayload, ChatJoinedPayload, ClientEvent, MessagePayload, ServerEvent};
use crate::domain::session::{ConnectionId, LiveSession};
use crate::error::{AppError, Result};
use crate::services::gateway::Hub;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Unauthenticated,
    Authenticated(LiveSession),
    Closed,
}

/// Protocol state of one live connection, independent of the transport.
///
/// Every inbound event is answered with the events to write back to this
/// connection. Fan-out to other connections goes through the shared hub.
#[derive(Debug)]
pub(crate) struct Connection {
    id: ConnectionId,
    state: ConnectionState,
    hub: Arc<Hub>,
}

impl Connection {
    pub(crate) const fn new(id: ConnectionId, hub: Arc<Hub>) -> Self {
        Self { id, state: ConnectionState::Unauthenticated, hub }
    }

    pub(crate) const fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) const fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) const fn session(&self) -> Option<LiveSession> {
        match self.state {
            ConnectionState::Authenticated(session) => Some(session),
            ConnectionState::Unauthenticated | ConnectionState::Closed => None,
        }
    }

    pub(crate) const fn is_authenticated(&self) -> bool {
        matches!(self.state, ConnectionState::Authenticated(_))
    }

    pub(crate) async fn handle(&mut self, event: ClientEvent) -> Vec<ServerEvent> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }

        if let ClientEvent::Authenticate(payload) = event {
            return vec![self.authenticate(&payload)];
        }

        let Some(session) = self.session() else {
            tracing::debug!("Rejected event before authentication");
            return vec![ServerEvent::Error(AppError::NotAuthenticated.client_reason())];
        };

        let result = match event {
            // Answered above.
            ClientEvent::Authenticate(_) => Ok(Vec::new()),
            ClientEvent::JoinChat(chat_ref) => self.join(&session, &chat_ref).await,
            ClientEvent::LeaveChat(chat_ref) => self.leave(&session, &chat_ref).await,
            ClientEvent::SendMessage(payload) => {
                return match self
                    .hub
                    .messages
                    .handle_send(&session, &payload.chat_id, payload.content, payload.kind)
                    .await
                {
                    Ok(message) => vec![ServerEvent::MessageSent(MessagePayload::from(&message))],
                    Err(e) => vec![ServerEvent::Error(e.send_failure_reason())],
                };
            }
            ClientEvent::SetStatus(payload) => {
                self.hub.presence.set_status(&session, payload.status);
                Ok(Vec::new())
            }
        };

        result.unwrap_or_else(|e| vec![ServerEvent::Error(e.client_reason())])
    }

    fn authenticate(&mut self, payload: &AuthenticatePayload) -> ServerEvent {
        let requested = match self.hub.identity.authenticate(self.id, payload) {
            Ok(session) => session,
            Err(e) => {
                tracing::info!(error = %e, "Authentication failed");
                return ServerEvent::AuthenticationError(e.client_reason());
            }
        };

        if let ConnectionState::Authenticated(current) = self.state {
            if current.user_id() == requested.user_id() {
                return ServerEvent::AuthenticationSuccess;
            }
            tracing::warn!(requested_user = %requested.user_id(), "Connection already bound to another user");
            return ServerEvent::AuthenticationError("Already authenticated as another user".into());
        }

        self.state = ConnectionState::Authenticated(requested);
        self.hub.metrics.authenticated_sessions.add(1, &[]);
        self.hub.presence.session_opened(&requested);
        tracing::Span::current().record("user_id", tracing::field::display(requested.user_id()));
        tracing::info!(user_id = %requested.user_id(), "Connection authenticated");
        ServerEvent::AuthenticationSuccess
    }

    async fn join(&self, session: &LiveSession, chat_ref: &str) -> Result<Vec<ServerEvent>> {
        let conversation =
            self.hub.messages.conversations().resolve_chat_reference(session.user_id(), chat_ref).await?;
        self.hub.rooms.join(session, conversation.id);
        Ok(vec![ServerEvent::ChatJoined(ChatJoinedPayload { chat_id: conversation.id })])
    }

    async fn leave(&self, session: &LiveSession, chat_ref: &str) -> Result<Vec<ServerEvent>> {
        let id = Uuid::parse_str(chat_ref.trim())
            .map_err(|_| AppError::InvalidReference(format!("'{chat_ref}' is not a valid identifier")))?;

        if self.hub.rooms.leave(self.id, id) || id == session.user_id() {
            return Ok(Vec::new());
        }

        // The client may name the room by its counterpart.
        if let Some(conversation) = self.hub.messages.conversations().find_between(session.user_id(), id).await? {
            self.hub.rooms.leave(self.id, conversation.id);
        }
        Ok(Vec::new())
    }

    /// Tears the connection down. Safe to call more than once.
    pub(crate) fn close(&mut self) {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Closed);

        self.hub.connections.unregister(self.id);
        self.hub.rooms.leave_all(self.id);

        if let ConnectionState::Authenticated(session) = previous {
            self.hub.presence.session_closed(&session);
            self.hub.metrics.authenticated_sessions.add(-1, &[]);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.state != ConnectionState::Closed {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::{ConversationStore, MemoryConversationStore};
    use crate::domain::conversation::{Conversation, ParticipantPair};
    use crate::domain::message::{Message, NewMessage};
    use crate::config::Config;
    use crate::domain::event::{SendMessagePayload, SetStatusPayload};
    use crate::domain::message::MessageKind;
    use crate::domain::presence::PresenceStatus;
    use crate::services::gateway::GatewayService;
    use tokio::sync::mpsc;

    fn gateway() -> GatewayService {
        let config = Config::default();
        GatewayService::from_config(&config, Arc::new(MemoryConversationStore::new()))
    }

    #[derive(Debug)]
    struct UnavailableStore;

    #[async_trait::async_trait]
    impl ConversationStore for UnavailableStore {
        async fn find_by_participants(&self, _pair: ParticipantPair) -> Result<Option<Conversation>> {
            Err(AppError::Storage("connection refused".into()))
        }

        async fn find_for_participant(&self, _id: Uuid, _user_id: Uuid) -> Result<Option<Conversation>> {
            Err(AppError::Storage("connection refused".into()))
        }

        async fn get(&self, _id: Uuid) -> Result<Option<Conversation>> {
            Err(AppError::Storage("connection refused".into()))
        }

        async fn insert(&self, _conversation: Conversation) -> Result<Conversation> {
            Err(AppError::Storage("connection refused".into()))
        }

        async fn append_message(&self, _message: NewMessage) -> Result<Message> {
            Err(AppError::Storage("connection refused".into()))
        }

        async fn list_messages(&self, _id: Uuid) -> Result<Vec<Message>> {
            Err(AppError::Storage("connection refused".into()))
        }

        async fn ping(&self) -> Result<()> {
            Err(AppError::Storage("connection refused".into()))
        }
    }

    fn open(gateway: &GatewayService) -> (Connection, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(32);
        (gateway.open_connection(tx), rx)
    }

    fn auth(user_id: Uuid) -> ClientEvent {
        ClientEvent::Authenticate(AuthenticatePayload { user_id: Some(user_id.to_string()), token: None })
    }

    fn send(chat_id: &str, content: &str) -> ClientEvent {
        ClientEvent::SendMessage(SendMessagePayload {
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            kind: MessageKind::Text,
            sender: None,
            timestamp: None,
        })
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_actions_before_auth_are_rejected_without_side_effects() {
        let gateway = gateway();
        let (mut observer, mut observer_rx) = open(&gateway);
        observer.handle(auth(Uuid::new_v4())).await;
        let (mut conn, _rx) = open(&gateway);
        let peer = Uuid::new_v4().to_string();

        for event in [
            ClientEvent::JoinChat(peer.clone()),
            send(&peer, "hi"),
            ClientEvent::SetStatus(SetStatusPayload { status: PresenceStatus::online() }),
        ] {
            assert_eq!(conn.handle(event).await, vec![ServerEvent::Error("Not authenticated".into())]);
        }

        assert_eq!(conn.state(), ConnectionState::Unauthenticated);
        assert_eq!(gateway.hub.rooms.room_count(), 0);
        assert!(drain(&mut observer_rx).is_empty());
        assert_eq!(gateway.hub.presence.online_users().len(), 1);
    }

    #[tokio::test]
    async fn test_authenticate_without_user_id_stays_unauthenticated() {
        let gateway = gateway();
        let (mut conn, _rx) = open(&gateway);

        let replies = conn.handle(ClientEvent::Authenticate(AuthenticatePayload::default())).await;

        assert_eq!(replies, vec![ServerEvent::AuthenticationError("No userId provided".into())]);
        assert!(!conn.is_authenticated());
    }

    #[tokio::test]
    async fn test_reauthentication_rules() {
        let gateway = gateway();
        let (mut conn, _rx) = open(&gateway);
        let user = Uuid::new_v4();

        assert_eq!(conn.handle(auth(user)).await, vec![ServerEvent::AuthenticationSuccess]);
        assert_eq!(conn.handle(auth(user)).await, vec![ServerEvent::AuthenticationSuccess]);
        assert!(matches!(conn.handle(auth(Uuid::new_v4())).await.as_slice(), [ServerEvent::AuthenticationError(_)]));
        assert_eq!(conn.session().map(|s| s.user_id()), Some(user));
        assert_eq!(gateway.hub.presence.online_users(), vec![user]);
    }

    #[tokio::test]
    async fn test_join_send_and_echo() {
        let gateway = gateway();
        let (mut alice, mut alice_rx) = open(&gateway);
        let (mut bob, mut bob_rx) = open(&gateway);
        let alice_id = Uuid::new_v4();
        let bob_id = Uuid::new_v4();
        alice.handle(auth(alice_id)).await;
        bob.handle(auth(bob_id)).await;

        let joined = alice.handle(ClientEvent::JoinChat(bob_id.to_string())).await;
        let [ServerEvent::ChatJoined(ChatJoinedPayload { chat_id })] = joined.as_slice() else {
            panic!("unexpected join reply {joined:?}");
        };
        let again = bob.handle(ClientEvent::JoinChat(chat_id.to_string())).await;
        assert_eq!(again, joined, "both ends resolve to the same room");
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let replies = alice.handle(send(&chat_id.to_string(), "hi")).await;
        let [ServerEvent::MessageSent(sent)] = replies.as_slice() else { panic!("unexpected {replies:?}") };
        assert_eq!(sent.sender, alice_id);
        assert_eq!(sent.chat_id, *chat_id);

        assert_eq!(drain(&mut alice_rx), vec![ServerEvent::ReceiveMessage(sent.clone())]);
        assert_eq!(drain(&mut bob_rx), vec![ServerEvent::ReceiveMessage(sent.clone())]);
    }

    #[tokio::test]
    async fn test_join_is_idempotent_and_leave_stops_delivery() {
        let gateway = gateway();
        let (mut alice, mut alice_rx) = open(&gateway);
        let (mut bob, _bob_rx) = open(&gateway);
        let bob_id = Uuid::new_v4();
        alice.handle(auth(Uuid::new_v4())).await;
        bob.handle(auth(bob_id)).await;

        alice.handle(ClientEvent::JoinChat(bob_id.to_string())).await;
        let replies = alice.handle(ClientEvent::JoinChat(bob_id.to_string())).await;
        let [ServerEvent::ChatJoined(ChatJoinedPayload { chat_id })] = replies.as_slice() else {
            panic!("unexpected {replies:?}")
        };
        assert_eq!(gateway.hub.rooms.members(*chat_id).len(), 1);

        assert!(alice.handle(ClientEvent::LeaveChat(bob_id.to_string())).await.is_empty());
        assert!(alice.handle(ClientEvent::LeaveChat(chat_id.to_string())).await.is_empty());
        drain(&mut alice_rx);

        bob.handle(send(&chat_id.to_string(), "anyone?")).await;
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn test_join_foreign_conversation_is_refused() {
        let gateway = gateway();
        let (mut alice, _a) = open(&gateway);
        let (mut bob, _b) = open(&gateway);
        let (mut mallory, _m) = open(&gateway);
        let bob_id = Uuid::new_v4();
        alice.handle(auth(Uuid::new_v4())).await;
        bob.handle(auth(bob_id)).await;
        mallory.handle(auth(Uuid::new_v4())).await;

        let replies = alice.handle(ClientEvent::JoinChat(bob_id.to_string())).await;
        let [ServerEvent::ChatJoined(ChatJoinedPayload { chat_id })] = replies.as_slice() else {
            panic!("unexpected {replies:?}")
        };

        // The id is not a conversation of mallory's, so it is read as a user id.
        let replies = mallory.handle(ClientEvent::JoinChat(chat_id.to_string())).await;
        let [ServerEvent::ChatJoined(ChatJoinedPayload { chat_id: other })] = replies.as_slice() else {
            panic!("unexpected {replies:?}")
        };
        assert_ne!(other, chat_id);
        assert!(!gateway.hub.rooms.is_member(mallory.id(), *chat_id));
    }

    #[tokio::test]
    async fn test_close_cleans_up_and_broadcasts_offline() {
        let gateway = gateway();
        let (mut observer, mut observer_rx) = open(&gateway);
        observer.handle(auth(Uuid::new_v4())).await;
        let (mut conn, _rx) = open(&gateway);
        let user = Uuid::new_v4();
        conn.handle(auth(user)).await;
        conn.handle(ClientEvent::JoinChat(Uuid::new_v4().to_string())).await;
        let id = conn.id();

        conn.close();
        conn.close();

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!gateway.hub.connections.is_registered(id));
        assert_eq!(gateway.hub.rooms.room_count(), 0);
        let statuses: Vec<String> = drain(&mut observer_rx)
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::UserStatusChange(p) if p.user_id == user => Some(p.status.as_str().to_owned()),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, ["online", "offline"]);
    }

    #[tokio::test]
    async fn test_dropped_connection_is_cleaned_up() {
        let gateway = gateway();
        let user = Uuid::new_v4();
        {
            let (mut conn, _rx) = open(&gateway);
            conn.handle(auth(user)).await;
        }
        assert!(!gateway.hub.presence.is_online(user));
        assert!(gateway.hub.connections.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_send_reference_reports_error() {
        let gateway = gateway();
        let (mut conn, _rx) = open(&gateway);
        conn.handle(auth(Uuid::new_v4())).await;

        let replies = conn.handle(send("not-a-uuid", "hi")).await;
        assert!(matches!(replies.as_slice(), [ServerEvent::Error(reason)] if reason.starts_with("Invalid chat reference")));
    }

    #[tokio::test]
    async fn test_store_outage_reasons_match_the_action() {
        let gateway = GatewayService::from_config(&Config::default(), Arc::new(UnavailableStore));
        let (mut conn, _rx) = open(&gateway);
        conn.handle(auth(Uuid::new_v4())).await;
        let peer = Uuid::new_v4().to_string();

        assert_eq!(
            conn.handle(ClientEvent::JoinChat(peer.clone())).await,
            vec![ServerEvent::Error("Storage unavailable".into())]
        );
        assert_eq!(
            conn.handle(ClientEvent::LeaveChat(peer.clone())).await,
            vec![ServerEvent::Error("Storage unavailable".into())]
        );
        assert_eq!(conn.handle(send(&peer, "hi")).await, vec![ServerEvent::Error("Failed to store message".into())]);
    }
}
