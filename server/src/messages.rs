//! Message lifecycle: send, delivery/read receipts, deletion, expiry.
//!
//! The REST handlers and the WS protocol dispatch share the same core
//! functions, so both paths persist identical state and trigger
//! identical broadcasts. Persist-before-broadcast on the send path: the
//! sender's success response depends only on the store write, never on
//! fan-out.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{
    ContentType, LastMessage, Message, MessageMetadata, Receipt, RecipientKey, Store,
};
use crate::ws::broadcast;
use crate::ws::protocol::ServerEvent;

/// Delete-for-everyone is only allowed within one hour of sending.
const DELETE_WINDOW_SECS: i64 = 3600;

/// Upper bound on client-supplied ephemeral TTLs (30 days). Also keeps
/// the computed expiry safely inside chrono's datetime range.
const MAX_EPHEMERAL_TTL_SECS: u64 = 2_592_000;

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 100;

/// Truncation length for the denormalized conversation preview.
const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub encrypted_content: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub recipient_keys: Vec<RecipientKey>,
    pub media_url: Option<String>,
    pub media_thumbnail: Option<String>,
    pub file_size: Option<u64>,
    pub duration_secs: Option<u32>,
    pub reply_to: Option<String>,
    #[serde(default)]
    pub is_ephemeral: bool,
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub view_once: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub encrypted_content: String,
    pub content_type: ContentType,
    pub recipient_keys: Vec<RecipientKey>,
    pub metadata: MessageMetadata,
    pub sequence: u64,
    pub delivered_to: Vec<Receipt>,
    pub read_by: Vec<Receipt>,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessageResponse {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id.clone(),
            conversation_id: m.conversation_id.clone(),
            sender_id: m.sender_id.clone(),
            encrypted_content: m.encrypted_content.clone(),
            content_type: m.content_type,
            recipient_keys: m.recipient_keys.clone(),
            metadata: m.metadata.clone(),
            sequence: m.sequence,
            delivered_to: m.delivered_to.clone(),
            read_by: m.read_by.clone(),
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    /// Message id to paginate before (exclusive).
    pub before: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<MessageResponse>,
    pub has_more: bool,
    pub total: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteMessageRequest {
    #[serde(default)]
    pub delete_for_everyone: bool,
}

/// POST /api/messages — persist and fan out a message. The broadcast
/// goes to every active participant including the sender's own other
/// devices; per-connection delivery is best-effort.
pub async fn send_message(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let user_id = claims.sub;

    let conversation = state
        .store
        .find_conversation(&body.conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("conversation not found".into()))?;
    if !conversation.is_active_participant(&user_id) {
        return Err(ApiError::Forbidden(
            "not a participant of this conversation".into(),
        ));
    }
    if body.encrypted_content.is_empty() {
        return Err(ApiError::Validation("message content is empty".into()));
    }

    let now = Utc::now();
    let expires_at = if body.is_ephemeral {
        let ttl = body
            .ttl_seconds
            .ok_or_else(|| ApiError::Validation("ephemeral message requires ttl_seconds".into()))?;
        if ttl == 0 || ttl > MAX_EPHEMERAL_TTL_SECS {
            return Err(ApiError::Validation(format!(
                "ttl_seconds must be between 1 and {MAX_EPHEMERAL_TTL_SECS}"
            )));
        }
        Some(now + Duration::seconds(ttl as i64))
    } else {
        if body.ttl_seconds.is_some() {
            return Err(ApiError::Validation(
                "ttl_seconds requires is_ephemeral".into(),
            ));
        }
        None
    };

    let message = Message {
        id: Uuid::now_v7().to_string(),
        conversation_id: conversation.id.clone(),
        sender_id: user_id.clone(),
        encrypted_content: body.encrypted_content,
        content_type: body.content_type,
        recipient_keys: body.recipient_keys,
        metadata: MessageMetadata {
            media_url: body.media_url,
            media_thumbnail: body.media_thumbnail,
            file_size: body.file_size,
            duration_secs: body.duration_secs,
            reply_to: body.reply_to,
            is_ephemeral: body.is_ephemeral,
            ttl_seconds: body.ttl_seconds,
            expires_at,
            view_once: body.view_once,
        },
        sequence: 0, // assigned by the store
        delivered_to: vec![],
        read_by: vec![],
        deleted_for: vec![],
        deleted_for_everyone: false,
        deleted_at: None,
        created_at: now,
    };

    let stored = state.store.insert_message(message).await?;

    state
        .store
        .set_last_message(
            &conversation.id,
            LastMessage {
                message_id: stored.id.clone(),
                encrypted_preview: stored.encrypted_content.chars().take(PREVIEW_CHARS).collect(),
                timestamp: stored.created_at,
                sender_id: stored.sender_id.clone(),
            },
        )
        .await?;

    let response = MessageResponse::from(&stored);
    broadcast::dispatch(
        &state,
        &ServerEvent::NewMessage {
            message: response.clone(),
        },
        &conversation.active_participant_ids(),
        None,
    )
    .await;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Record a delivery receipt. Idempotent per user; the sender is
/// notified only on the first append, and never about their own
/// devices.
pub async fn mark_delivered(
    state: &AppState,
    user_id: &str,
    message_id: &str,
) -> Result<(), ApiError> {
    let message = find_for_receipt(state, user_id, message_id).await?;
    let now = Utc::now();

    let added = state
        .store
        .add_delivery_receipt(message_id, user_id, now)
        .await?;
    if added && message.sender_id != user_id {
        notify_sender(state, &message, user_id, "delivered", now).await;
    }
    Ok(())
}

/// Record a read receipt and advance the reader's last_read_at marker.
/// The marker moves to the message's timestamp, so reading an old
/// message never claims newer ones.
pub async fn mark_read(state: &AppState, user_id: &str, message_id: &str) -> Result<(), ApiError> {
    let message = find_for_receipt(state, user_id, message_id).await?;
    let now = Utc::now();

    let added = state.store.add_read_receipt(message_id, user_id, now).await?;
    state
        .store
        .set_last_read(&message.conversation_id, user_id, message.created_at)
        .await?;
    if added && message.sender_id != user_id {
        notify_sender(state, &message, user_id, "read", now).await;
    }
    Ok(())
}

async fn find_for_receipt(
    state: &AppState,
    user_id: &str,
    message_id: &str,
) -> Result<Message, ApiError> {
    let message = state
        .store
        .find_message(message_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("message not found".into()))?;
    let conversation = state
        .store
        .find_conversation(&message.conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("conversation not found".into()))?;
    if !conversation.is_active_participant(user_id) {
        return Err(ApiError::Forbidden(
            "not a participant of this conversation".into(),
        ));
    }
    Ok(message)
}

async fn notify_sender(
    state: &AppState,
    message: &Message,
    user_id: &str,
    status: &str,
    at: DateTime<Utc>,
) {
    broadcast::dispatch_to_user(
        state,
        &message.sender_id,
        &ServerEvent::MessageStatusUpdate {
            message_id: message.id.clone(),
            status: status.to_string(),
            user_id: user_id.to_string(),
            timestamp: at,
        },
    )
    .await;
}

/// POST /api/messages/{id}/read — REST form of the read receipt.
pub async fn read_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    mark_read(&state, &claims.sub, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/messages/{id} — delete for me (default) or for everyone.
/// Delete-for-everyone is sender-only and rejected outside the one-hour
/// window; it flags the row terminally and broadcasts `message_deleted`.
/// Delete-for-me is a pure view filter with no broadcast.
pub async fn delete_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
    body: Option<Json<DeleteMessageRequest>>,
) -> Result<StatusCode, ApiError> {
    let user_id = claims.sub;
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let message = state
        .store
        .find_message(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("message not found".into()))?;
    let conversation = state
        .store
        .find_conversation(&message.conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("conversation not found".into()))?;
    if !conversation.is_active_participant(&user_id) {
        return Err(ApiError::Forbidden(
            "not a participant of this conversation".into(),
        ));
    }

    if body.delete_for_everyone {
        if message.sender_id != user_id {
            return Err(ApiError::Forbidden(
                "only the sender can delete for everyone".into(),
            ));
        }
        let now = Utc::now();
        if (now - message.created_at).num_seconds() > DELETE_WINDOW_SECS {
            return Err(ApiError::DeleteWindowExpired);
        }

        state.store.mark_deleted_for_everyone(&id, now).await?;
        broadcast::dispatch(
            &state,
            &ServerEvent::MessageDeleted {
                message_id: id,
                deleted_for_everyone: true,
            },
            &conversation.active_participant_ids(),
            None,
        )
        .await;
    } else {
        state.store.mark_deleted_for(&id, &user_id).await?;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/conversations/{id}/messages — newest first, cursor
/// pagination by `before` message id. Per-viewer filtering excludes
/// globally deleted, deleted-for-me and expired ephemeral messages.
pub async fn list_messages(
    State(state): State<AppState>,
    claims: Claims,
    Path(conversation_id): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let user_id = claims.sub;

    let conversation = state
        .store
        .find_conversation(&conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("conversation not found".into()))?;
    if conversation.participant(&user_id).is_none() {
        return Err(ApiError::Forbidden(
            "not a participant of this conversation".into(),
        ));
    }

    // A cursor naming an unknown message is ignored rather than erroring;
    // clients can hold ids of messages that have since been reaped.
    let before = match &query.before {
        Some(id) => state.store.find_message(id).await?.map(|m| m.created_at),
        None => None,
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let now = Utc::now();
    // Fetch one extra row to learn whether another page exists.
    let mut page = state
        .store
        .list_messages(&conversation_id, &user_id, before, limit + 1, now)
        .await?;
    let has_more = page.len() > limit;
    page.truncate(limit);

    let total = state
        .store
        .count_messages(&conversation_id, &user_id, now)
        .await?;

    Ok(Json(MessageListResponse {
        messages: page.iter().map(MessageResponse::from).collect(),
        has_more,
        total,
    }))
}

/// Background sweep that physically reaps expired ephemeral messages.
/// Expiry is already enforced lazily at read time; this keeps the
/// store from accumulating dead rows.
pub fn spawn_ephemeral_sweep(
    store: Arc<dyn Store>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        timer.tick().await;
        loop {
            timer.tick().await;
            match store.purge_expired_messages(Utc::now()).await {
                Ok(0) => {}
                Ok(reaped) => tracing::info!(reaped, "reaped expired ephemeral messages"),
                Err(e) => tracing::warn!(error = %e, "ephemeral sweep failed"),
            }
        }
    })
}
