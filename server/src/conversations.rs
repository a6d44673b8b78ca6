//! Conversation management and fan-out resolution.
//!
//! One-to-one conversations are unique per unordered pair of users,
//! enforced by a canonical sorted pair key at the store layer. Unread
//! counts are computed at read time from the reader's last_read_at
//! marker; nothing increments a stored counter.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{
    one_to_one_pair_key, Conversation, ConversationKind, LastMessage, Participant, User,
};

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    /// The other participant's user id.
    pub participant_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantDetail {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationResponse {
    pub id: String,
    pub kind: ConversationKind,
    pub participants: Vec<ParticipantDetail>,
    pub last_message: Option<LastMessage>,
    pub unread_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationResponse>,
    pub total: usize,
}

/// Active participant ids for a conversation — the fan-out set for
/// every conversation-scoped event.
pub async fn participants_of(
    state: &AppState,
    conversation_id: &str,
) -> Result<Vec<String>, ApiError> {
    let conversation = state
        .store
        .find_conversation(conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("conversation not found".into()))?;
    Ok(conversation.active_participant_ids())
}

/// Read-time unread count for one user in one conversation. Zero when
/// there is no last message or the reader's marker has caught up;
/// otherwise counts visible messages from other senders newer than the
/// marker.
pub async fn unread_count(
    state: &AppState,
    conversation: &Conversation,
    user_id: &str,
) -> Result<u64, ApiError> {
    let Some(last_message) = &conversation.last_message else {
        return Ok(0);
    };

    let last_read_at = conversation.participant(user_id).and_then(|p| p.last_read_at);
    if let Some(marker) = last_read_at {
        if marker >= last_message.timestamp {
            return Ok(0);
        }
    }

    Ok(state
        .store
        .count_unread(&conversation.id, user_id, last_read_at, Utc::now())
        .await?)
}

/// POST /api/conversations — create (or fetch) the one-to-one
/// conversation with another user. 201 on creation, 200 when the pair
/// already has one.
pub async fn create_conversation(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>), ApiError> {
    let user_id = claims.sub;

    if body.participant_id == user_id {
        return Err(ApiError::Validation(
            "cannot start a conversation with yourself".into(),
        ));
    }
    state
        .store
        .find_user(&body.participant_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    let now = Utc::now();
    let candidate = Conversation {
        id: Uuid::now_v7().to_string(),
        kind: ConversationKind::OneToOne,
        participants: vec![
            Participant::new(&user_id, now),
            Participant::new(&body.participant_id, now),
        ],
        pair_key: Some(one_to_one_pair_key(&user_id, &body.participant_id)),
        last_message: None,
        archived_by: vec![],
        created_at: now,
        updated_at: now,
    };
    let candidate_id = candidate.id.clone();

    let stored = state.store.create_one_to_one(candidate).await?;
    let created = stored.id == candidate_id;

    let response = to_response(&state, &stored, &user_id).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(response)))
}

/// GET /api/conversations — the caller's unarchived conversations,
/// newest activity first, with read-time unread counts.
pub async fn list_conversations(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<ConversationListResponse>, ApiError> {
    let user_id = claims.sub;
    let conversations = state.store.conversations_for(&user_id).await?;

    // One batched user lookup across every conversation.
    let mut ids: Vec<String> = conversations
        .iter()
        .flat_map(|c| c.participants.iter().map(|p| p.user_id.clone()))
        .collect();
    ids.sort();
    ids.dedup();
    let users = user_map(&state, &ids).await?;

    let mut out = Vec::with_capacity(conversations.len());
    for conversation in &conversations {
        let unread = unread_count(&state, conversation, &user_id).await?;
        out.push(format_response(&state, conversation, &users, unread));
    }

    let total = out.len();
    Ok(Json(ConversationListResponse {
        conversations: out,
        total,
    }))
}

/// GET /api/conversations/{id} — participants only.
pub async fn get_conversation(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let conversation = state
        .store
        .find_conversation(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("conversation not found".into()))?;
    if conversation.participant(&claims.sub).is_none() {
        return Err(ApiError::Forbidden(
            "not a participant of this conversation".into(),
        ));
    }

    let response = to_response(&state, &conversation, &claims.sub).await?;
    Ok(Json(response))
}

/// DELETE /api/conversations/{id} — archive the caller's view. The
/// conversation itself is never hard-deleted.
pub async fn archive_conversation(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store.archive_conversation(&id, &claims.sub).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("conversation not found".into()))
    }
}

async fn to_response(
    state: &AppState,
    conversation: &Conversation,
    viewer: &str,
) -> Result<ConversationResponse, ApiError> {
    let ids: Vec<String> = conversation
        .participants
        .iter()
        .map(|p| p.user_id.clone())
        .collect();
    let users = user_map(state, &ids).await?;
    let unread = unread_count(state, conversation, viewer).await?;
    Ok(format_response(state, conversation, &users, unread))
}

async fn user_map(state: &AppState, ids: &[String]) -> Result<HashMap<String, User>, ApiError> {
    Ok(state
        .store
        .find_users(ids)
        .await?
        .into_iter()
        .map(|u| (u.id.clone(), u))
        .collect())
}

fn format_response(
    state: &AppState,
    conversation: &Conversation,
    users: &HashMap<String, User>,
    unread_count: u64,
) -> ConversationResponse {
    let participants = conversation
        .participants
        .iter()
        .filter_map(|p| users.get(&p.user_id))
        .map(|user| ParticipantDetail {
            user_id: user.id.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            avatar_url: user.avatar_url.clone(),
            // Registry is authoritative for liveness; the stored flag
            // only covers users on other nodes, which we don't have.
            online: state.registry.is_online(&user.id),
            last_seen: user.status.last_seen,
        })
        .collect();

    ConversationResponse {
        id: conversation.id.clone(),
        kind: conversation.kind,
        participants,
        last_message: conversation.last_message.clone(),
        unread_count,
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
    }
}
