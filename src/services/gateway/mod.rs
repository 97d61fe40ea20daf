pub(crate) mod connection;
pub(crate) mod session;

use crate::adapters::store::ConversationStore;
use crate::config::{Config, WsConfig};
use crate::domain::event::ServerEvent;
use crate::domain::session::ConnectionId;
use crate::services::connection_registry::ConnectionRegistry;
use crate::services::conversation_service::ConversationService;
use crate::services::gateway::connection::Connection;
use crate::services::gateway::session::Session;
use crate::services::identity_service::IdentityService;
use crate::services::message_service::MessageService;
use crate::services::presence_service::PresenceService;
use crate::services::room_router::RoomRouter;
use axum::extract::ws::WebSocket;
use opentelemetry::{
    global,
    metrics::{Counter, UpDownCounter},
};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) active_connections: UpDownCounter<i64>,
    pub(crate) authenticated_sessions: UpDownCounter<i64>,
    pub(crate) auth_timeouts_total: Counter<u64>,
    pub(crate) malformed_frames_total: Counter<u64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("duet-server");
        Self {
            active_connections: meter
                .i64_up_down_counter("duet_websocket_active_connections")
                .with_description("Number of open WebSocket connections")
                .build(),
            authenticated_sessions: meter
                .i64_up_down_counter("duet_websocket_authenticated_sessions")
                .with_description("Number of connections bound to a user")
                .build(),
            auth_timeouts_total: meter
                .u64_counter("duet_websocket_auth_timeouts_total")
                .with_description("Connections closed for not authenticating in time")
                .build(),
            malformed_frames_total: meter
                .u64_counter("duet_websocket_malformed_frames_total")
                .with_description("Inbound frames that were not a known event")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide state shared by every live connection.
#[derive(Debug)]
pub(crate) struct Hub {
    pub(crate) connections: Arc<ConnectionRegistry>,
    pub(crate) rooms: Arc<RoomRouter>,
    pub(crate) presence: Arc<PresenceService>,
    pub(crate) identity: IdentityService,
    pub(crate) messages: MessageService,
    pub(crate) metrics: Metrics,
}

#[derive(Clone, Debug)]
pub struct GatewayService {
    pub(crate) hub: Arc<Hub>,
    config: WsConfig,
}

impl GatewayService {
    /// Wires the live-connection core on top of a conversation store.
    #[must_use]
    pub fn from_config(config: &Config, store: Arc<dyn ConversationStore>) -> Self {
        let connections = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomRouter::new(Arc::clone(&connections)));
        let presence = Arc::new(PresenceService::new(Arc::clone(&connections)));
        let conversations = ConversationService::new(store, &config.messaging);
        let messages = MessageService::new(conversations, Arc::clone(&rooms), config.messaging.clone());

        let hub = Hub {
            connections,
            rooms,
            presence,
            identity: IdentityService::new(&config.auth),
            messages,
            metrics: Metrics::new(),
        };

        Self { hub: Arc::new(hub), config: config.websocket.clone() }
    }

    #[must_use]
    pub fn message_service(&self) -> &MessageService {
        &self.hub.messages
    }

    #[must_use]
    pub fn identity_service(&self) -> &IdentityService {
        &self.hub.identity
    }

    #[must_use]
    pub fn presence_service(&self) -> &PresenceService {
        &self.hub.presence
    }

    pub(crate) fn open_connection(&self, outbound: mpsc::Sender<ServerEvent>) -> Connection {
        let id = ConnectionId::generate();
        self.hub.connections.register(id, outbound);
        Connection::new(id, Arc::clone(&self.hub))
    }

    pub async fn handle_socket(
        &self,
        socket: WebSocket,
        request_id: String,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_buffer_size.max(1));
        let connection = self.open_connection(outbound_tx);

        let session = Session {
            connection,
            request_id,
            socket,
            outbound_rx,
            metrics: self.hub.metrics.clone(),
            config: self.config.clone(),
            shutdown_rx,
        };

        session.run().await;
    }
}
