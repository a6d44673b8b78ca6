use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::presence;
use crate::state::AppState;
use crate::ws::protocol::{self, ServerEvent};
use crate::ws::registry::ConnectionHandle;

/// Server sends a WebSocket ping every 30 seconds.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// If no pong arrives within 10 seconds of a ping, the connection is
/// considered dead and closed.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the socket into reader and writer halves:
/// - Writer task: owns the sink, drains an mpsc channel
/// - Reader loop: parses incoming frames, dispatches to protocol handlers
///
/// The mpsc sender is what the session registry hands out, so any part
/// of the system can push events to this client.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let handle = ConnectionHandle::new(tx.clone());
    let conn_id = handle.id;
    let came_online = state.registry.register(&user_id, handle);

    protocol::send_event(
        &tx,
        &ServerEvent::Authenticated {
            user_id: user_id.clone(),
            connected_at: Utc::now(),
        },
    );

    if came_online {
        presence::user_came_online(&state, &user_id).await;
    }

    tracing::info!(
        user_id = %user_id,
        conn_id = %conn_id,
        connections = state.registry.connection_count(&user_id),
        "WebSocket actor started"
    );

    // Writer task: forwards mpsc messages to the WebSocket sink.
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception for the keepalive task.
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket frames.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_frame(&state, &user_id, &tx, &text).await;
                }
                Message::Binary(_) => {
                    tracing::debug!(
                        user_id = %user_id,
                        "ignoring binary frame on JSON protocol"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();
    ping_handle.abort();

    // A failed delivery may already have unregistered this connection;
    // the registry reports the offline transition at most once.
    let went_offline = state.registry.unregister(&user_id, conn_id);
    if went_offline {
        presence::user_went_offline(&state, &user_id).await;
    }

    tracing::info!(
        user_id = %user_id,
        conn_id = %conn_id,
        "WebSocket actor stopped"
    );
}

/// Writer task: receives frames from the mpsc channel and forwards them
/// to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}
