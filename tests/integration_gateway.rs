#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::todo,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    clippy::clone_on_ref_ptr,
    clippy::items_after_statements,
    unreachable_pub,
    clippy::print_stdout,
    clippy::similar_names
)]
mod common;

use common::{TestApp, join_chat};
use serde_json::{Value, json};
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::Message;
use uuid::Uuid;

#[tokio::test]
async fn test_authenticate_requires_user_id() {
    let app = TestApp::spawn().await;
    let mut client = app.connect_ws().await;

    client.send_event("authenticate", json!({})).await;
    let reply = client.receive_event().await;
    assert_eq!(reply, json!({"event": "authentication_error", "data": "No userId provided"}));

    client.authenticate(Uuid::new_v4()).await;
}

#[tokio::test]
async fn test_actions_before_authentication_are_rejected() {
    let app = TestApp::spawn().await;
    let mut client = app.connect_ws().await;
    let peer = Uuid::new_v4();

    client.send_event("join_chat", json!(peer)).await;
    assert_eq!(client.receive_event().await, json!({"event": "error", "data": "Not authenticated"}));

    client.send_event("send_message", json!({"chatId": peer, "content": "hi", "type": "text"})).await;
    assert_eq!(client.receive_event().await, json!({"event": "error", "data": "Not authenticated"}));

    client.send_event("set_status", json!({"status": "online"})).await;
    assert_eq!(client.receive_event().await, json!({"event": "error", "data": "Not authenticated"}));

    let online: Value = app
        .client
        .get(format!("{}/v1/presence", app.server_url))
        .header("x-user-id", peer.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(online["online"], json!([]));
}

#[tokio::test]
async fn test_first_contact_send_and_receive() {
    let app = TestApp::spawn().await;
    let alice_id = Uuid::new_v4();
    let bob_id = Uuid::new_v4();
    let mut alice = app.connect_as(alice_id).await;
    let mut bob = app.connect_as(bob_id).await;

    let chat_id = join_chat(&mut alice, bob_id).await;
    assert_eq!(join_chat(&mut bob, alice_id).await, chat_id, "both sides land in the same room");

    alice
        .send_event(
            "send_message",
            json!({"chatId": chat_id, "content": "hi", "type": "text", "sender": Uuid::new_v4(), "timestamp": "x"}),
        )
        .await;

    let ack = alice.expect_event("message_sent").await;
    let delivered = bob.expect_event("receive_message").await;
    let echo = alice.expect_event("receive_message").await;

    assert_eq!(delivered["data"], ack["data"]);
    assert_eq!(echo["data"], ack["data"]);
    assert_eq!(delivered["data"]["sender"], json!(alice_id), "sender comes from the session");
    assert_eq!(delivered["data"]["chatId"], json!(chat_id));
    assert_eq!(delivered["data"]["content"], "hi");
    assert_eq!(delivered["data"]["type"], "text");

    let history: Value = app.get_history(bob_id, &alice_id.to_string()).await.json().await.unwrap();
    assert_eq!(history["conversationId"], json!(chat_id));
    assert_eq!(history["conversation"]["lastMessage"], "hi");
    assert_eq!(history["messages"].as_array().unwrap().len(), 1);
    assert_eq!(history["messages"][0]["id"], delivered["data"]["id"]);
}

#[tokio::test]
async fn test_send_by_counterpart_without_join_is_persisted() {
    let app = TestApp::spawn().await;
    let alice_id = Uuid::new_v4();
    let bob_id = Uuid::new_v4();
    let mut alice = app.connect_as(alice_id).await;
    let mut bob = app.connect_as(bob_id).await;

    alice.send_event("send_message", json!({"chatId": bob_id, "content": "are you there?"})).await;
    let ack = alice.expect_event("message_sent").await;

    // Bob never joined, so there is no live delivery. History has it.
    assert!(bob.receive_event_timeout(Duration::from_millis(300)).await.is_none());
    let history: Value = app.get_history(bob_id, &alice_id.to_string()).await.json().await.unwrap();
    assert_eq!(history["messages"][0]["id"], ack["data"]["id"]);
}

#[tokio::test]
async fn test_image_message_uses_summary_marker() {
    let app = TestApp::spawn().await;
    let alice_id = Uuid::new_v4();
    let bob_id = Uuid::new_v4();
    let mut alice = app.connect_as(alice_id).await;
    let chat_id = join_chat(&mut alice, bob_id).await;

    let url = "https://cdn.example.com/photos/cat.jpg";
    alice.send_event("send_message", json!({"chatId": chat_id, "content": url, "type": "image"})).await;
    let received = alice.expect_event("receive_message").await;
    assert_eq!(received["data"]["content"], url);
    assert_eq!(received["data"]["type"], "image");

    let history: Value = app.get_history(alice_id, &chat_id.to_string()).await.json().await.unwrap();
    assert_eq!(history["conversation"]["lastMessage"], "📷 Image");
}

#[tokio::test]
async fn test_leave_chat_stops_live_delivery() {
    let app = TestApp::spawn().await;
    let alice_id = Uuid::new_v4();
    let bob_id = Uuid::new_v4();
    let mut alice = app.connect_as(alice_id).await;
    let mut bob = app.connect_as(bob_id).await;
    let chat_id = join_chat(&mut alice, bob_id).await;
    join_chat(&mut bob, chat_id).await;

    bob.send_event("leave_chat", json!(chat_id)).await;
    // Round trip so the leave is processed before alice sends.
    bob.send_event("join_chat", json!("sync")).await;
    bob.expect_event("error").await;

    alice.send_event("send_message", json!({"chatId": chat_id, "content": "still here?"})).await;
    alice.expect_event("message_sent").await;

    assert!(bob.receive_event_timeout(Duration::from_millis(300)).await.is_none());
}

async fn next_status(observer: &mut common::TestWsClient, user_id: Uuid) -> String {
    loop {
        let event = observer.expect_event("user_status_change").await;
        if event["data"]["userId"] == json!(user_id) {
            return event["data"]["status"].as_str().unwrap().to_string();
        }
    }
}

#[tokio::test]
async fn test_presence_offline_then_online_on_reconnect() {
    let app = TestApp::spawn().await;
    let mut observer = app.connect_as(Uuid::new_v4()).await;
    let user_id = Uuid::new_v4();

    let first = app.connect_as(user_id).await;
    assert_eq!(next_status(&mut observer, user_id).await, "online");

    first.close().await;
    assert_eq!(next_status(&mut observer, user_id).await, "offline");

    let second = app.connect_as(user_id).await;
    assert_eq!(next_status(&mut observer, user_id).await, "online");

    let online: Value = app
        .client
        .get(format!("{}/v1/presence", app.server_url))
        .header("x-user-id", Uuid::new_v4().to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(online["online"].as_array().unwrap().contains(&json!(user_id)));
    second.close().await;
}

#[tokio::test]
async fn test_second_device_does_not_flap_presence() {
    let app = TestApp::spawn().await;
    let mut observer = app.connect_as(Uuid::new_v4()).await;
    let user_id = Uuid::new_v4();

    let phone = app.connect_as(user_id).await;
    assert_eq!(next_status(&mut observer, user_id).await, "online");
    let laptop = app.connect_as(user_id).await;

    phone.close().await;
    laptop.close().await;

    // The only transition after the first online is the final offline.
    assert_eq!(next_status(&mut observer, user_id).await, "offline");
    assert!(observer.receive_event_timeout(Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn test_set_status_is_broadcast_to_others() {
    let app = TestApp::spawn().await;
    let mut observer = app.connect_as(Uuid::new_v4()).await;
    let user_id = Uuid::new_v4();
    let mut client = app.connect_as(user_id).await;
    observer.expect_event("user_status_change").await;

    client.send_event("set_status", json!({"status": "away"})).await;

    let event = observer.expect_event("user_status_change").await;
    assert_eq!(event["data"], json!({"userId": user_id, "status": "away"}));
}

#[tokio::test]
async fn test_unauthenticated_connection_times_out() {
    let mut config = common::get_test_config();
    config.websocket.auth_timeout_secs = 1;
    let app = TestApp::spawn_with_config(config).await;
    let mut client = app.connect_ws().await;

    let event = client.receive_event_timeout(Duration::from_secs(5)).await.unwrap();
    assert_eq!(event, json!({"event": "authentication_error", "data": "authentication timed out"}));
    assert!(client.receive_event_timeout(Duration::from_secs(2)).await.is_none(), "connection should close");
}

#[tokio::test]
async fn test_authenticated_connection_outlives_auth_timeout() {
    let mut config = common::get_test_config();
    config.websocket.auth_timeout_secs = 1;
    let app = TestApp::spawn_with_config(config).await;
    let user_id = Uuid::new_v4();
    let mut client = app.connect_as(user_id).await;

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let chat_id = join_chat(&mut client, Uuid::new_v4()).await;
    assert_ne!(chat_id, user_id);
}

#[tokio::test]
async fn test_malformed_frames_yield_error_events() {
    let app = TestApp::spawn().await;
    let mut client = app.connect_ws().await;

    client.send_raw(Message::Text("not json".into())).await;
    assert_eq!(client.receive_event().await, json!({"event": "error", "data": "Malformed event"}));

    client.send_event("delete_message", json!({"id": 1})).await;
    assert_eq!(client.receive_event().await, json!({"event": "error", "data": "Malformed event"}));

    client.authenticate(Uuid::new_v4()).await;
    client.send_event("join_chat", json!("general")).await;
    let reply = client.expect_event("error").await;
    assert!(reply["data"].as_str().unwrap().starts_with("Invalid chat reference"));
}

#[tokio::test]
async fn test_server_sends_ping() {
    let mut config = common::get_test_config();
    config.websocket.ping_interval_secs = 1;
    config.websocket.ping_timeout_secs = 1;

    let app = TestApp::spawn_with_config(config).await;
    let mut client = app.connect_as(Uuid::new_v4()).await;

    let mut received_ping = false;
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        if let Some(Ok(msg)) = client.receive_raw_timeout(Duration::from_millis(500)).await
            && matches!(msg, Message::Ping(_))
        {
            received_ping = true;
            break;
        }
    }

    assert!(received_ping, "Server did not send a Ping within the expected interval");
}

#[tokio::test]
async fn test_silent_connection_is_closed_and_goes_offline() {
    let mut config = common::get_test_config();
    config.websocket.ping_interval_secs = 1;
    config.websocket.ping_timeout_secs = 1;

    let app = TestApp::spawn_with_config(config).await;
    let mut observer = app.connect_as(Uuid::new_v4()).await;
    let user_id = Uuid::new_v4();

    // Never polled after the handshake, so the server's pings go unanswered.
    let mut silent = app.connect_as(user_id).await;
    assert_eq!(next_status(&mut observer, user_id).await, "online");
    assert_eq!(next_status(&mut observer, user_id).await, "offline");

    let mut close_frame = None;
    while let Some(Ok(msg)) = silent.receive_raw_timeout(Duration::from_secs(2)).await {
        if let Message::Close(frame) = msg {
            close_frame = frame;
            break;
        }
    }
    let frame = close_frame.expect("No close frame after the heartbeat timeout");
    assert_eq!(u16::from(frame.code), 1008);
    assert_eq!(frame.reason.as_str(), "heartbeat timed out");
    assert!(silent.receive_raw_timeout(Duration::from_secs(2)).await.is_none_or(|r| r.is_err()));
}

#[tokio::test]
async fn test_shutdown_closes_connections_with_away() {
    let app = TestApp::spawn().await;
    let mut client = app.connect_as(Uuid::new_v4()).await;

    app.shutdown_tx.send(true).unwrap();

    let mut close_code = None;
    while let Some(Ok(msg)) = client.receive_raw_timeout(Duration::from_secs(2)).await {
        if let Message::Close(frame) = msg {
            close_code = frame.map(|f| u16::from(f.code));
            break;
        }
    }
    assert_eq!(close_code, Some(1001));
}
