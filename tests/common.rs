#![allow(dead_code)]

use duet_server::adapters::store::ConversationStore;
use duet_server::api::MgmtState;
use duet_server::config::Config;
use duet_server::{AppBuilder, api};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("duet_server=debug".parse().unwrap())
            .add_directive("sqlx=warn".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap())
            .add_directive("tungstenite=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().init();
    });
}

pub fn get_test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.mgmt_port = 0;
    config.websocket.ping_interval_secs = 30;
    config
}

pub struct TestApp {
    pub server_url: String,
    pub mgmt_url: String,
    pub ws_url: String,
    pub client: reqwest::Client,
    pub config: Config,
    pub shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(get_test_config()).await
    }

    pub async fn spawn_with_config(config: Config) -> Self {
        Self::spawn_with(config, None).await
    }

    pub async fn spawn_with(config: Config, store: Option<Arc<dyn ConversationStore>>) -> Self {
        setup_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mgmt_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_addr = mgmt_listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut builder = AppBuilder::new(config.clone());
        if let Some(store) = store {
            builder = builder.with_store(store);
        }
        let app = builder.build();

        let app_router = api::app_router(&config, app.services, shutdown_rx.clone());
        let mgmt_router = api::mgmt_router(MgmtState { health_service: app.health_service });

        let mut api_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(listener, app_router.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let _ = api_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        let mut mgmt_rx = shutdown_rx;
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt_router.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let _ = mgmt_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        Self {
            server_url: format!("http://{addr}"),
            mgmt_url: format!("http://{mgmt_addr}"),
            ws_url: format!("ws://{addr}/v1/gateway"),
            client: reqwest::Client::new(),
            config,
            shutdown_tx,
        }
    }

    pub async fn connect_ws(&self) -> TestWsClient {
        let (stream, _) = tokio_tungstenite::connect_async(&self.ws_url).await.expect("Failed to connect");
        TestWsClient { stream }
    }

    /// Connects and completes the authenticate handshake.
    pub async fn connect_as(&self, user_id: Uuid) -> TestWsClient {
        let mut client = self.connect_ws().await;
        client.authenticate(user_id).await;
        client
    }

    pub async fn get_history(&self, as_user: Uuid, chat_ref: &str) -> reqwest::Response {
        self.client
            .get(format!("{}/v1/messages/{chat_ref}", self.server_url))
            .header("x-user-id", as_user.to_string())
            .send()
            .await
            .unwrap()
    }

    pub async fn post_message(&self, as_user: Uuid, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/v1/messages", self.server_url))
            .header("x-user-id", as_user.to_string())
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

pub struct TestWsClient {
    pub stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestWsClient {
    pub async fn send_event(&mut self, event: &str, data: Value) {
        let frame = json!({"event": event, "data": data}).to_string();
        self.stream.send(Message::Text(frame.into())).await.unwrap();
    }

    pub async fn send_raw(&mut self, message: Message) {
        self.stream.send(message).await.unwrap();
    }

    pub async fn authenticate(&mut self, user_id: Uuid) {
        self.send_event("authenticate", json!({"userId": user_id})).await;
        self.expect_event("authentication_success").await;
    }

    /// Next JSON event, skipping control frames. `None` on timeout or close.
    pub async fn receive_event_timeout(&mut self, timeout: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, self.stream.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => return Some(serde_json::from_str(text.as_str()).unwrap()),
                Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
                Ok(Some(Ok(Message::Close(_)) | Err(_)) | None) | Err(_) => return None,
                Ok(Some(Ok(other))) => panic!("unexpected frame {other:?}"),
            }
        }
    }

    pub async fn receive_event(&mut self) -> Value {
        self.receive_event_timeout(Duration::from_secs(5)).await.expect("Timed out waiting for an event")
    }

    /// Reads until an event with the given name arrives, discarding others.
    pub async fn expect_event(&mut self, name: &str) -> Value {
        loop {
            let event = self.receive_event().await;
            if event["event"] == name {
                return event;
            }
        }
    }

    pub async fn receive_raw_timeout(
        &mut self,
        timeout: Duration,
    ) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
        tokio::time::timeout(timeout, self.stream.next()).await.ok().flatten()
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

pub async fn join_chat(client: &mut TestWsClient, chat_ref: impl ToString) -> Uuid {
    client.send_event("join_chat", Value::String(chat_ref.to_string())).await;
    let joined = client.expect_event("chat_joined").await;
    Uuid::parse_str(joined["data"]["chatId"].as_str().unwrap()).unwrap()
}
