use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversations;
use crate::error::ApiError;
use crate::friends::UserSummary;
use crate::messages::{self, MessageResponse};
use crate::moments::MomentResponse;
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::ConnectionSender;

/// Client-to-server events. Closed set: any frame whose `type` tag is
/// not listed here fails to parse and is answered with an error event,
/// leaving the connection open.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    TypingStart { conversation_id: String },
    TypingStop { conversation_id: String },
    MessageDelivered { message_id: String },
    MessageRead { message_id: String },
    Ping,
}

/// Server-to-client events. Also a closed set; clients rely on the
/// `type` tag for dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Authenticated {
        user_id: String,
        connected_at: DateTime<Utc>,
    },
    NewMessage {
        message: MessageResponse,
    },
    MessageStatusUpdate {
        message_id: String,
        status: String,
        user_id: String,
        timestamp: DateTime<Utc>,
    },
    TypingIndicator {
        conversation_id: String,
        user_id: String,
        is_typing: bool,
    },
    MessageDeleted {
        message_id: String,
        deleted_for_everyone: bool,
    },
    UserOnline {
        user_id: String,
        timestamp: DateTime<Utc>,
    },
    UserOffline {
        user_id: String,
        timestamp: DateTime<Utc>,
    },
    FriendRequestReceived {
        friendship_id: String,
        requester: UserSummary,
    },
    FriendRequestAccepted {
        friendship_id: String,
        user_id: String,
    },
    MomentPosted {
        moment: MomentResponse,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

/// Serialize an event onto one connection's channel. Send failures are
/// the actor's problem; the caller never sees them.
pub fn send_event(tx: &ConnectionSender, event: &ServerEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            let _ = tx.send(axum::extract::ws::Message::Text(json.into()));
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize server event"),
    }
}

/// Parse one text frame and dispatch it. Malformed frames and unknown
/// event types get an error event back; the connection stays open.
pub async fn handle_text_frame(state: &AppState, user_id: &str, tx: &ConnectionSender, text: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(user_id = %user_id, error = %e, "unparseable client event");
            send_event(
                tx,
                &ServerEvent::Error {
                    message: format!("unrecognized event: {e}"),
                },
            );
            return;
        }
    };

    match event {
        ClientEvent::TypingStart { conversation_id } => {
            forward_typing(state, user_id, &conversation_id, true).await;
        }
        ClientEvent::TypingStop { conversation_id } => {
            forward_typing(state, user_id, &conversation_id, false).await;
        }
        ClientEvent::MessageDelivered { message_id } => {
            if let Err(e) = messages::mark_delivered(state, user_id, &message_id).await {
                send_event(tx, &ServerEvent::Error { message: e.to_string() });
            }
        }
        ClientEvent::MessageRead { message_id } => {
            if let Err(e) = messages::mark_read(state, user_id, &message_id).await {
                send_event(tx, &ServerEvent::Error { message: e.to_string() });
            }
        }
        ClientEvent::Ping => {
            send_event(
                tx,
                &ServerEvent::Pong {
                    timestamp: Utc::now(),
                },
            );
        }
    }
}

/// Typing indicators are transient; a stale or foreign conversation id
/// is dropped without an error frame.
async fn forward_typing(state: &AppState, user_id: &str, conversation_id: &str, is_typing: bool) {
    let participants = match conversations::participants_of(state, conversation_id).await {
        Ok(participants) => participants,
        Err(ApiError::NotFound(_)) => return,
        Err(e) => {
            tracing::warn!(error = %e, "typing indicator lookup failed");
            return;
        }
    };
    if !participants.iter().any(|p| p == user_id) {
        return;
    }

    let event = ServerEvent::TypingIndicator {
        conversation_id: conversation_id.to_string(),
        user_id: user_id.to_string(),
        is_typing,
    };
    broadcast::dispatch(state, &event, &participants, Some(user_id)).await;
}
