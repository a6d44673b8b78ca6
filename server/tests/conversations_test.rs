//! Conversation REST: pair uniqueness, listing, unread counts,
//! archiving, access control.

mod common;

use serde_json::json;

use common::{http, seed_user, spawn, TestServer};

async fn create_conversation(
    server: &TestServer,
    token: &str,
    participant_id: &str,
) -> (u16, serde_json::Value) {
    let resp = http()
        .post(format!("{}/api/conversations", server.base_url))
        .bearer_auth(token)
        .json(&json!({"participant_id": participant_id}))
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn send_message(server: &TestServer, token: &str, conversation_id: &str, content: &str) {
    let resp = http()
        .post(format!("{}/api/messages", server.base_url))
        .bearer_auth(token)
        .json(&json!({
            "conversation_id": conversation_id,
            "encrypted_content": content,
            "content_type": "text",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
}

#[tokio::test]
async fn one_conversation_per_pair_regardless_of_direction() {
    let server = spawn().await;
    let (alice_id, alice_token) = seed_user(&server, "alice").await;
    let (bob_id, bob_token) = seed_user(&server, "bob").await;

    let (status, first) = create_conversation(&server, &alice_token, &bob_id).await;
    assert_eq!(status, 201);

    let (status, second) = create_conversation(&server, &bob_token, &alice_id).await;
    assert_eq!(status, 200, "second create returns the existing conversation");
    assert_eq!(first["id"], second["id"]);

    let (status, third) = create_conversation(&server, &alice_token, &bob_id).await;
    assert_eq!(status, 200);
    assert_eq!(first["id"], third["id"]);
}

#[tokio::test]
async fn cannot_converse_with_yourself_or_ghosts() {
    let server = spawn().await;
    let (alice_id, alice_token) = seed_user(&server, "alice").await;

    let resp = http()
        .post(format!("{}/api/conversations", server.base_url))
        .bearer_auth(&alice_token)
        .json(&json!({"participant_id": alice_id}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = http()
        .post(format!("{}/api/conversations", server.base_url))
        .bearer_auth(&alice_token)
        .json(&json!({"participant_id": "nobody"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn unread_count_tracks_read_marker() {
    let server = spawn().await;
    let (_alice_id, alice_token) = seed_user(&server, "alice").await;
    let (bob_id, bob_token) = seed_user(&server, "bob").await;

    let (_, conversation) = create_conversation(&server, &alice_token, &bob_id).await;
    let conversation_id = conversation["id"].as_str().unwrap();

    send_message(&server, &alice_token, conversation_id, "one").await;
    send_message(&server, &alice_token, conversation_id, "two").await;

    // Bob has two unread; alice (the sender) has none.
    let list: serde_json::Value = http()
        .get(format!("{}/api/conversations", server.base_url))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["conversations"][0]["unread_count"], 2);

    let list: serde_json::Value = http()
        .get(format!("{}/api/conversations", server.base_url))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["conversations"][0]["unread_count"], 0);

    // Bob reads the latest message; his marker catches up.
    let last_id = list["conversations"][0]["last_message"]["message_id"]
        .as_str()
        .unwrap()
        .to_string();
    let resp = http()
        .post(format!("{}/api/messages/{}/read", server.base_url, last_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let list: serde_json::Value = http()
        .get(format!("{}/api/conversations", server.base_url))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["conversations"][0]["unread_count"], 0);
}

#[tokio::test]
async fn archive_hides_only_the_callers_view() {
    let server = spawn().await;
    let (_alice_id, alice_token) = seed_user(&server, "alice").await;
    let (bob_id, bob_token) = seed_user(&server, "bob").await;

    let (_, conversation) = create_conversation(&server, &alice_token, &bob_id).await;
    let conversation_id = conversation["id"].as_str().unwrap();

    let resp = http()
        .delete(format!(
            "{}/api/conversations/{}",
            server.base_url, conversation_id
        ))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let list: serde_json::Value = http()
        .get(format!("{}/api/conversations", server.base_url))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["total"], 0);

    let list: serde_json::Value = http()
        .get(format!("{}/api/conversations", server.base_url))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["total"], 1);
}

#[tokio::test]
async fn outsiders_cannot_read_a_conversation() {
    let server = spawn().await;
    let (_alice_id, alice_token) = seed_user(&server, "alice").await;
    let (bob_id, _bob_token) = seed_user(&server, "bob").await;
    let (_carol_id, carol_token) = seed_user(&server, "carol").await;

    let (_, conversation) = create_conversation(&server, &alice_token, &bob_id).await;
    let conversation_id = conversation["id"].as_str().unwrap();

    let resp = http()
        .get(format!(
            "{}/api/conversations/{}",
            server.base_url, conversation_id
        ))
        .bearer_auth(&carol_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = http()
        .get(format!("{}/api/conversations/{}", server.base_url, "missing"))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let server = spawn().await;

    let resp = http()
        .get(format!("{}/api/conversations", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}
