//! Integration tests for WebSocket auth, the event protocol, and typing
//! indicators.

mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

use common::{connect_ws, http, seed_user, spawn};

#[tokio::test]
async fn invalid_token_closes_with_policy_violation() {
    let server = spawn().await;

    let url = format!("ws://{}/ws?token=not_a_jwt", server.addr);
    let (stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("upgrade should succeed even with a bad token");
    let (_write, mut read) = stream.split();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("expected close frame within timeout");

    match msg {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(u16::from(frame.code), 1008, "expected policy violation");
        }
        Some(Ok(Message::Close(None))) | None => {}
        other => panic!("expected close, got: {:?}", other),
    }
}

#[tokio::test]
async fn authenticated_event_carries_user_id() {
    let server = spawn().await;
    let (alice_id, token) = seed_user(&server, "alice").await;

    let url = format!("ws://{}/ws?token={}", server.addr, token);
    let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (_write, mut read) = stream.split();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let Message::Text(text) = msg else {
        panic!("expected text frame");
    };
    let event: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(event["type"], "authenticated");
    assert_eq!(event["user_id"], alice_id);
}

#[tokio::test]
async fn protocol_ping_gets_pong() {
    let server = spawn().await;
    let (_alice_id, token) = seed_user(&server, "alice").await;
    let mut ws = connect_ws(&server, &token).await;

    ws.send_json(&json!({"type": "ping"})).await;
    let event = ws.next_event().await;
    assert_eq!(event["type"], "pong");
    assert!(event["timestamp"].is_string());
}

#[tokio::test]
async fn unknown_event_gets_error_and_connection_survives() {
    let server = spawn().await;
    let (_alice_id, token) = seed_user(&server, "alice").await;
    let mut ws = connect_ws(&server, &token).await;

    ws.send_json(&json!({"type": "teleport", "to": "mars"})).await;
    let event = ws.next_event().await;
    assert_eq!(event["type"], "error");

    // Still usable afterwards.
    ws.send_json(&json!({"type": "ping"})).await;
    assert_eq!(ws.next_event().await["type"], "pong");
}

#[tokio::test]
async fn malformed_frame_gets_error() {
    let server = spawn().await;
    let (_alice_id, token) = seed_user(&server, "alice").await;
    let mut ws = connect_ws(&server, &token).await;

    ws.write
        .send(Message::Text("this is not json".into()))
        .await
        .unwrap();
    assert_eq!(ws.next_event().await["type"], "error");
}

#[tokio::test]
async fn typing_indicator_reaches_peer_but_not_sender() {
    let server = spawn().await;
    let (alice_id, alice_token) = seed_user(&server, "alice").await;
    let (bob_id, bob_token) = seed_user(&server, "bob").await;

    let resp = http()
        .post(format!("{}/api/conversations", server.base_url))
        .bearer_auth(&alice_token)
        .json(&json!({"participant_id": bob_id}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let conversation: serde_json::Value = resp.json().await.unwrap();
    let conversation_id = conversation["id"].as_str().unwrap();

    let mut alice = connect_ws(&server, &alice_token).await;
    let mut bob = connect_ws(&server, &bob_token).await;

    alice
        .send_json(&json!({"type": "typing_start", "conversation_id": conversation_id}))
        .await;

    let event = bob.next_event().await;
    assert_eq!(event["type"], "typing_indicator");
    assert_eq!(event["conversation_id"], *conversation_id);
    assert_eq!(event["user_id"], alice_id);
    assert_eq!(event["is_typing"], true);

    alice
        .send_json(&json!({"type": "typing_stop", "conversation_id": conversation_id}))
        .await;
    let event = bob.next_event().await;
    assert_eq!(event["type"], "typing_indicator");
    assert_eq!(event["is_typing"], false);

    // The sender's own connection hears nothing.
    alice.expect_silence(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn typing_in_unknown_conversation_is_ignored() {
    let server = spawn().await;
    let (_alice_id, token) = seed_user(&server, "alice").await;
    let mut ws = connect_ws(&server, &token).await;

    ws.send_json(&json!({"type": "typing_start", "conversation_id": "nope"}))
        .await;
    ws.expect_silence(Duration::from_millis(300)).await;
}
