use crate::api::AppState;
use axum::{
    extract::{State, WebSocketUpgrade},
    http::Extensions,
    response::IntoResponse,
};
use tower_http::request_id::RequestId;

/// Upgrades to the live channel. Identity is established in-band by the
/// `authenticate` event, within the configured timeout.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    extensions: Extensions,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let request_id = extensions
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    ws.on_upgrade(move |socket| async move {
        state.gateway_service.handle_socket(socket, request_id, state.shutdown_rx.clone()).await;
    })
}
