//! Friendship edges: request, respond, list, block.
//!
//! One record per unordered pair of users. The status machine is
//! pending -> accepted | rejected, with blocked reachable from any
//! state; a rejected edge can be reopened as a fresh pending request by
//! either side, with the requester role moving to whoever reopened it.

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
use crate::store::{Friendship, FriendshipStatus, RequestRole, User};
use crate::ws::broadcast;
use crate::ws::protocol::ServerEvent;

#[derive(Debug, Deserialize)]
pub struct FriendRequestCreate {
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RespondAction {
    Accept,
    Reject,
}

#[derive(Debug, Deserialize)]
pub struct FriendRequestRespond {
    pub action: RespondAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}

/// One friendship edge, shaped from the caller's point of view: `user`
/// is always the other end.
#[derive(Debug, Serialize)]
pub struct FriendshipResponse {
    pub id: String,
    pub user: UserSummary,
    pub status: FriendshipStatus,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct FriendDetail {
    pub user: UserSummary,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub friendship_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct FriendListResponse {
    pub friends: Vec<FriendDetail>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct FriendRequestListResponse {
    pub requests: Vec<FriendshipResponse>,
    pub total: usize,
}

/// POST /api/friends/request — open (or reopen) a friend request.
pub async fn send_request(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<FriendRequestCreate>,
) -> Result<(StatusCode, Json<FriendshipResponse>), ApiError> {
    let user_id = claims.sub;

    if body.user_id == user_id {
        return Err(ApiError::Validation(
            "cannot send a friend request to yourself".into(),
        ));
    }
    let target = state
        .store
        .find_user(&body.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    let now = Utc::now();
    let friendship = match state.store.find_friendship_between(&user_id, &body.user_id).await? {
        Some(existing) => match existing.status {
            FriendshipStatus::Blocked => {
                return Err(ApiError::Forbidden("this user is blocked".into()));
            }
            FriendshipStatus::Accepted => {
                return Err(ApiError::Conflict("already friends".into()));
            }
            FriendshipStatus::Pending if existing.requester_id == user_id => {
                return Err(ApiError::Conflict("friend request already sent".into()));
            }
            FriendshipStatus::Pending => {
                return Err(ApiError::Validation(
                    "this user already sent you a request; respond to it instead".into(),
                ));
            }
            FriendshipStatus::Rejected => {
                // Reopen: whoever asks again becomes the requester.
                let reopened = Friendship {
                    requester_id: user_id.clone(),
                    addressee_id: body.user_id.clone(),
                    status: FriendshipStatus::Pending,
                    blocked_by: None,
                    requested_at: now,
                    responded_at: None,
                    updated_at: now,
                    ..existing
                };
                state.store.update_friendship(reopened.clone()).await?;
                reopened
            }
        },
        None => {
            let friendship = Friendship {
                id: Uuid::now_v7().to_string(),
                requester_id: user_id.clone(),
                addressee_id: body.user_id.clone(),
                status: FriendshipStatus::Pending,
                blocked_by: None,
                requested_at: now,
                responded_at: None,
                updated_at: now,
            };
            state.store.insert_friendship(friendship.clone()).await?;
            friendship
        }
    };

    if let Ok(Some(requester)) = state.store.find_user(&user_id).await {
        broadcast::dispatch_to_user(
            &state,
            &body.user_id,
            &ServerEvent::FriendRequestReceived {
                friendship_id: friendship.id.clone(),
                requester: UserSummary::from(&requester),
            },
        )
        .await;
    }

    Ok((
        StatusCode::CREATED,
        Json(FriendshipResponse {
            id: friendship.id,
            user: UserSummary::from(&target),
            status: friendship.status,
            requested_at: friendship.requested_at,
            responded_at: friendship.responded_at,
        }),
    ))
}

/// POST /api/friends/requests/{id}/respond — accept or reject.
/// Addressee only, and only while pending.
pub async fn respond_to_request(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
    Json(body): Json<FriendRequestRespond>,
) -> Result<Json<FriendshipResponse>, ApiError> {
    let user_id = claims.sub;

    let mut friendship = state
        .store
        .find_friendship(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("friend request not found".into()))?;
    if friendship.addressee_id != user_id {
        return Err(ApiError::Forbidden(
            "only the addressee can respond to this request".into(),
        ));
    }
    if friendship.status != FriendshipStatus::Pending {
        return Err(ApiError::Validation("request is no longer pending".into()));
    }

    let now = Utc::now();
    friendship.status = match body.action {
        RespondAction::Accept => FriendshipStatus::Accepted,
        RespondAction::Reject => FriendshipStatus::Rejected,
    };
    friendship.responded_at = Some(now);
    friendship.updated_at = now;
    state.store.update_friendship(friendship.clone()).await?;

    if body.action == RespondAction::Accept {
        broadcast::dispatch_to_user(
            &state,
            &friendship.requester_id,
            &ServerEvent::FriendRequestAccepted {
                friendship_id: friendship.id.clone(),
                user_id: user_id.clone(),
            },
        )
        .await;
    }

    let requester = state
        .store
        .find_user(&friendship.requester_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    Ok(Json(FriendshipResponse {
        id: friendship.id,
        user: UserSummary::from(&requester),
        status: friendship.status,
        requested_at: friendship.requested_at,
        responded_at: friendship.responded_at,
    }))
}

/// GET /api/friends — accepted friends with presence.
pub async fn list_friends(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<FriendListResponse>, ApiError> {
    let user_id = claims.sub;

    // Accepted edges in both directions.
    let mut edges = state
        .store
        .friend_requests(&user_id, RequestRole::Requester, Some(FriendshipStatus::Accepted))
        .await?;
    edges.extend(
        state
            .store
            .friend_requests(&user_id, RequestRole::Addressee, Some(FriendshipStatus::Accepted))
            .await?,
    );

    let ids: Vec<String> = edges.iter().map(|f| f.other(&user_id).to_string()).collect();
    let users = state.store.find_users(&ids).await?;

    let friends: Vec<FriendDetail> = edges
        .iter()
        .filter_map(|edge| {
            let other = edge.other(&user_id);
            users.iter().find(|u| u.id == other).map(|user| FriendDetail {
                user: UserSummary::from(user),
                online: state.registry.is_online(&user.id),
                last_seen: user.status.last_seen,
                friendship_since: edge.responded_at,
            })
        })
        .collect();

    let total = friends.len();
    Ok(Json(FriendListResponse { friends, total }))
}

/// GET /api/friends/requests/received — pending requests sent to me.
pub async fn list_received_requests(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<FriendRequestListResponse>, ApiError> {
    list_requests(&state, &claims.sub, RequestRole::Addressee).await
}

/// GET /api/friends/requests/sent — pending requests I sent.
pub async fn list_sent_requests(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<FriendRequestListResponse>, ApiError> {
    list_requests(&state, &claims.sub, RequestRole::Requester).await
}

async fn list_requests(
    state: &AppState,
    user_id: &str,
    role: RequestRole,
) -> Result<Json<FriendRequestListResponse>, ApiError> {
    let edges = state
        .store
        .friend_requests(user_id, role, Some(FriendshipStatus::Pending))
        .await?;

    let ids: Vec<String> = edges.iter().map(|f| f.other(user_id).to_string()).collect();
    let users = state.store.find_users(&ids).await?;

    let requests: Vec<FriendshipResponse> = edges
        .iter()
        .filter_map(|edge| {
            let other = edge.other(user_id);
            users.iter().find(|u| u.id == other).map(|user| FriendshipResponse {
                id: edge.id.clone(),
                user: UserSummary::from(user),
                status: edge.status,
                requested_at: edge.requested_at,
                responded_at: edge.responded_at,
            })
        })
        .collect();

    let total = requests.len();
    Ok(Json(FriendRequestListResponse { requests, total }))
}

/// POST /api/friends/{user_id}/block — upsert the edge to blocked.
/// Existing status does not matter; a blocked pair cannot re-request.
pub async fn block_user(
    State(state): State<AppState>,
    claims: Claims,
    Path(target_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user_id = claims.sub;

    if target_id == user_id {
        return Err(ApiError::Validation("cannot block yourself".into()));
    }
    state
        .store
        .find_user(&target_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    let now = Utc::now();
    match state.store.find_friendship_between(&user_id, &target_id).await? {
        Some(existing) => {
            let blocked = Friendship {
                status: FriendshipStatus::Blocked,
                blocked_by: Some(user_id.clone()),
                updated_at: now,
                ..existing
            };
            state.store.update_friendship(blocked).await?;
        }
        None => {
            state
                .store
                .insert_friendship(Friendship {
                    id: Uuid::now_v7().to_string(),
                    requester_id: user_id.clone(),
                    addressee_id: target_id.clone(),
                    status: FriendshipStatus::Blocked,
                    blocked_by: Some(user_id.clone()),
                    requested_at: now,
                    responded_at: None,
                    updated_at: now,
                })
                .await?;
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/friends/{user_id}/unblock — only the blocker may lift a
/// block; the record is removed entirely.
pub async fn unblock_user(
    State(state): State<AppState>,
    claims: Claims,
    Path(target_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user_id = claims.sub;

    let friendship = state
        .store
        .find_friendship_between(&user_id, &target_id)
        .await?
        .filter(|f| f.status == FriendshipStatus::Blocked)
        .ok_or_else(|| ApiError::NotFound("no block found".into()))?;
    if friendship.blocked_by.as_deref() != Some(user_id.as_str()) {
        return Err(ApiError::Forbidden("only the blocker can unblock".into()));
    }

    state.store.delete_friendship(&friendship.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
