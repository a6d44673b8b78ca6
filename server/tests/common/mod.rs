//! Shared helpers: spin a real server on a random port and drive it
//! over HTTP and WebSocket.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use pigeon_server::auth::jwt;
use pigeon_server::routes;
use pigeon_server::state::AppState;
use pigeon_server::store::memory::MemoryStore;
use pigeon_server::store::{Friendship, FriendshipStatus, Store, User, UserStatus};

pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    pub state: AppState,
}

/// Start the server on 127.0.0.1:0 with an in-memory store and a fixed
/// JWT secret.
pub async fn spawn() -> TestServer {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store, vec![7u8; 32]);

    let app = routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        addr,
        state,
    }
}

/// Seed a user directly in the store and mint a token for them.
/// Returns (user_id, access_token).
pub async fn seed_user(server: &TestServer, username: &str) -> (String, String) {
    let id = Uuid::now_v7().to_string();
    server
        .state
        .store
        .insert_user(User {
            id: id.clone(),
            username: username.to_string(),
            display_name: username.to_string(),
            avatar_url: None,
            status: UserStatus::default(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let token = jwt::issue_access_token(&server.state.jwt_secret, &id).unwrap();
    (id, token)
}

/// Seed an accepted friendship between two users.
pub async fn befriend(server: &TestServer, a: &str, b: &str) -> String {
    let now = Utc::now();
    let id = Uuid::now_v7().to_string();
    server
        .state
        .store
        .insert_friendship(Friendship {
            id: id.clone(),
            requester_id: a.to_string(),
            addressee_id: b.to_string(),
            status: FriendshipStatus::Accepted,
            blocked_by: None,
            requested_at: now,
            responded_at: Some(now),
            updated_at: now,
        })
        .await
        .unwrap();
    id
}

pub struct WsClient {
    pub write: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    pub read: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl WsClient {
    pub async fn send_json(&mut self, value: &serde_json::Value) {
        self.write
            .send(Message::Text(value.to_string().into()))
            .await
            .unwrap();
    }

    /// Next JSON event frame, skipping transport ping/pong. Panics
    /// after two seconds of silence.
    pub async fn next_event(&mut self) -> serde_json::Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), self.read.next())
                .await
                .expect("timed out waiting for event")
                .expect("websocket stream ended")
                .expect("websocket error");
            match msg {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame: {:?}", other),
            }
        }
    }

    /// Assert no event frame arrives within the window.
    pub async fn expect_silence(&mut self, window: Duration) {
        let result = tokio::time::timeout(window, self.read.next()).await;
        if let Ok(Some(Ok(Message::Text(text)))) = result {
            panic!("expected silence, got event: {}", text);
        }
    }
}

/// Connect to /ws with a token and consume the `authenticated` event.
pub async fn connect_ws(server: &TestServer, token: &str) -> WsClient {
    let url = format!("ws://{}/ws?token={}", server.addr, token);
    let (stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("websocket connect failed");
    let (write, read) = stream.split();
    let mut client = WsClient { write, read };

    let hello = client.next_event().await;
    assert_eq!(hello["type"], "authenticated");
    client
}

pub fn http() -> reqwest::Client {
    reqwest::Client::new()
}
