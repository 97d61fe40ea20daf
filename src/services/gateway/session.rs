use crate::config::WsConfig;
use crate::domain::event::{ClientEvent, ServerEvent};
use crate::services::gateway::Metrics;
use crate::services::gateway::connection::Connection;
use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, close_code};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

pub(crate) const AUTH_TIMEOUT_REASON: &str = "authentication timed out";
pub(crate) const HEARTBEAT_TIMEOUT_REASON: &str = "heartbeat timed out";

type WsSink = SplitSink<WebSocket, WsMessage>;

pub(crate) struct Session {
    pub(crate) connection: Connection,
    pub(crate) request_id: String,
    pub(crate) socket: WebSocket,
    pub(crate) outbound_rx: mpsc::Receiver<ServerEvent>,
    pub(crate) metrics: Metrics,
    pub(crate) config: WsConfig,
    pub(crate) shutdown_rx: watch::Receiver<bool>,
}

impl Session {
    #[tracing::instrument(
        name = "websocket_session",
        skip(self),
        fields(
            connection_id = %self.connection.id(),
            request_id = %self.request_id,
            user_id = tracing::field::Empty,
            otel.kind = "server"
        )
    )]
    pub(crate) async fn run(self) {
        let Self { mut connection, socket, mut outbound_rx, metrics, config, mut shutdown_rx, .. } = self;

        metrics.active_connections.add(1, &[]);
        tracing::info!("WebSocket connected");

        let (mut ws_sink, mut ws_stream) = socket.split();

        let auth_deadline = tokio::time::sleep(Duration::from_secs(config.auth_timeout_secs));
        tokio::pin!(auth_deadline);

        let ping_interval = Duration::from_secs(config.ping_interval_secs.max(1));
        let silence_limit = ping_interval + Duration::from_secs(config.ping_timeout_secs);
        let mut heartbeat = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen = Instant::now();

        loop {
            if *shutdown_rx.borrow() {
                tracing::info!("Shutdown signal received, closing WebSocket");
                close_with(&mut ws_sink, close_code::AWAY, "Server shutting down").await;
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {}

                () = &mut auth_deadline, if !connection.is_authenticated() => {
                    tracing::info!("Connection did not authenticate in time");
                    metrics.auth_timeouts_total.add(1, &[]);
                    let reply = ServerEvent::AuthenticationError(AUTH_TIMEOUT_REASON.to_string());
                    let _ = send_event(&mut ws_sink, &reply).await;
                    close_with(&mut ws_sink, close_code::POLICY, AUTH_TIMEOUT_REASON).await;
                    break;
                }

                _ = heartbeat.tick() => {
                    if last_seen.elapsed() > silence_limit {
                        tracing::info!("Heartbeat timed out, closing WebSocket");
                        close_with(&mut ws_sink, close_code::POLICY, HEARTBEAT_TIMEOUT_REASON).await;
                        break;
                    }
                    if ws_sink.send(WsMessage::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }

                msg = ws_stream.next() => {
                    last_seen = Instant::now();
                    let event = match msg {
                        Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                            Ok(event) => event,
                            Err(e) => {
                                tracing::debug!(error = %e, "Failed to decode client event");
                                metrics.malformed_frames_total.add(1, &[]);
                                let reply = ServerEvent::Error("Malformed event".to_string());
                                if !send_event(&mut ws_sink, &reply).await { break; }
                                continue;
                            }
                        },
                        Some(Ok(WsMessage::Binary(_))) => {
                            tracing::warn!("Received unexpected binary message");
                            metrics.malformed_frames_total.add(1, &[]);
                            let reply = ServerEvent::Error("Binary frames are not supported".to_string());
                            if !send_event(&mut ws_sink, &reply).await { break; }
                            continue;
                        }
                        Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                            tracing::trace!("Heartbeat from client");
                            continue;
                        }
                        Some(Ok(WsMessage::Close(_)) | Err(_)) | None => break,
                    };

                    let mut open = true;
                    for reply in connection.handle(event).await {
                        if !send_event(&mut ws_sink, &reply).await {
                            open = false;
                            break;
                        }
                    }
                    if !open { break; }
                }

                event = outbound_rx.recv() => {
                    match event {
                        Some(event) => {
                            if !send_event(&mut ws_sink, &event).await { break; }
                        }
                        None => break,
                    }
                }
            }
        }

        // Unregister before the socket goes away.
        connection.close();
        let _ = ws_sink.close().await;

        metrics.active_connections.add(-1, &[]);
        tracing::info!("WebSocket disconnected");
    }
}

async fn send_event(sink: &mut WsSink, event: &ServerEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, event = event.name(), "Failed to encode server event");
            return true;
        }
    };
    sink.send(WsMessage::Text(text.into())).await.is_ok()
}

async fn close_with(sink: &mut WsSink, code: u16, reason: &'static str) {
    let _ = sink.send(WsMessage::Close(Some(CloseFrame { code, reason: reason.into() }))).await;
}
