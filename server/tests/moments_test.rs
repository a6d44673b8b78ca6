//! Moments: posting, friend-only visibility, view dedup, expiry, and
//! owner deletion.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use uuid::Uuid;

use pigeon_server::store::{Moment, Store};

use common::{befriend, connect_ws, http, seed_user, spawn, TestServer};

async fn post_moment(server: &TestServer, token: &str, content: &str) -> serde_json::Value {
    let resp = http()
        .post(format!("{}/api/moments", server.base_url))
        .bearer_auth(token)
        .json(&json!({"encrypted_content": content}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    resp.json().await.unwrap()
}

async fn feed(server: &TestServer, token: &str) -> serde_json::Value {
    http()
        .get(format!("{}/api/moments", server.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn posting_notifies_online_friends() {
    let server = spawn().await;
    let (alice_id, alice_token) = seed_user(&server, "alice").await;
    let (bob_id, bob_token) = seed_user(&server, "bob").await;
    befriend(&server, &alice_id, &bob_id).await;

    let mut bob = connect_ws(&server, &bob_token).await;

    let posted = post_moment(&server, &alice_token, "sunset").await;

    let event = bob.next_event().await;
    assert_eq!(event["type"], "moment_posted");
    assert_eq!(event["moment"]["id"], posted["id"]);
    assert_eq!(event["moment"]["owner_id"], alice_id);
}

#[tokio::test]
async fn feed_is_own_plus_friends_only() {
    let server = spawn().await;
    let (alice_id, alice_token) = seed_user(&server, "alice").await;
    let (bob_id, bob_token) = seed_user(&server, "bob").await;
    let (_carol_id, carol_token) = seed_user(&server, "carol").await;
    befriend(&server, &alice_id, &bob_id).await;

    post_moment(&server, &alice_token, "from alice").await;
    post_moment(&server, &bob_token, "from bob").await;
    post_moment(&server, &carol_token, "from carol").await;

    let bob_feed = feed(&server, &bob_token).await;
    assert_eq!(bob_feed["total"], 2);

    let carol_feed = feed(&server, &carol_token).await;
    assert_eq!(carol_feed["total"], 1);
    assert_eq!(carol_feed["moments"][0]["encrypted_content"], "from carol");
}

#[tokio::test]
async fn views_are_friend_only_and_deduplicated() {
    let server = spawn().await;
    let (alice_id, alice_token) = seed_user(&server, "alice").await;
    let (bob_id, bob_token) = seed_user(&server, "bob").await;
    let (_carol_id, carol_token) = seed_user(&server, "carol").await;
    befriend(&server, &alice_id, &bob_id).await;

    let posted = post_moment(&server, &alice_token, "sunset").await;
    let moment_id = posted["id"].as_str().unwrap();

    let resp = http()
        .post(format!("{}/api/moments/{}/view", server.base_url, moment_id))
        .bearer_auth(&carol_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    for _ in 0..2 {
        let resp = http()
            .post(format!("{}/api/moments/{}/view", server.base_url, moment_id))
            .bearer_auth(&bob_token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
    let body: serde_json::Value = http()
        .post(format!("{}/api/moments/{}/view", server.base_url, moment_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["view_count"], 1);
    assert_eq!(body["viewed"], true);

    // The owner looking at their own moment is not a view.
    let body: serde_json::Value = http()
        .post(format!("{}/api/moments/{}/view", server.base_url, moment_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["view_count"], 1);
    assert_eq!(body["viewed"], false);
}

#[tokio::test]
async fn expired_moments_leave_the_feed() {
    let server = spawn().await;
    let (alice_id, alice_token) = seed_user(&server, "alice").await;

    let now = Utc::now();
    server
        .state
        .store
        .insert_moment(Moment {
            id: Uuid::now_v7().to_string(),
            owner_id: alice_id.clone(),
            encrypted_content: "yesterday".into(),
            media_url: None,
            created_at: now - ChronoDuration::hours(25),
            expires_at: now - ChronoDuration::hours(1),
            views: vec![],
            deleted: false,
        })
        .await
        .unwrap();
    post_moment(&server, &alice_token, "today").await;

    let my_feed = feed(&server, &alice_token).await;
    assert_eq!(my_feed["total"], 1);
    assert_eq!(my_feed["moments"][0]["encrypted_content"], "today");
}

#[tokio::test]
async fn only_the_owner_deletes() {
    let server = spawn().await;
    let (alice_id, alice_token) = seed_user(&server, "alice").await;
    let (bob_id, bob_token) = seed_user(&server, "bob").await;
    befriend(&server, &alice_id, &bob_id).await;

    let posted = post_moment(&server, &alice_token, "regret").await;
    let moment_id = posted["id"].as_str().unwrap();

    let resp = http()
        .delete(format!("{}/api/moments/{}", server.base_url, moment_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = http()
        .delete(format!("{}/api/moments/{}", server.base_url, moment_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    assert_eq!(feed(&server, &alice_token).await["total"], 0);

    // Viewing a deleted moment is a 404, not a leak.
    let resp = http()
        .post(format!("{}/api/moments/{}/view", server.base_url, moment_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
