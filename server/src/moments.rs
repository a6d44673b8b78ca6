//! Moments: ephemeral posts with a fixed 24-hour lifetime, visible to
//! accepted friends of the owner. Views are deduplicated per viewer;
//! deletion is a per-owner soft delete.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::Moment;
use crate::ws::broadcast;
use crate::ws::protocol::ServerEvent;

const MOMENT_TTL_SECS: i64 = 86_400;

#[derive(Debug, Deserialize)]
pub struct CreateMomentRequest {
    pub encrypted_content: String,
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MomentResponse {
    pub id: String,
    pub owner_id: String,
    pub encrypted_content: String,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub view_count: usize,
    /// Whether the requesting viewer has already seen this moment.
    pub viewed: bool,
}

impl MomentResponse {
    fn for_viewer(moment: &Moment, viewer: &str) -> Self {
        Self {
            id: moment.id.clone(),
            owner_id: moment.owner_id.clone(),
            encrypted_content: moment.encrypted_content.clone(),
            media_url: moment.media_url.clone(),
            created_at: moment.created_at,
            expires_at: moment.expires_at,
            view_count: moment.views.len(),
            viewed: moment.views.iter().any(|v| v.user_id == viewer),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MomentFeedResponse {
    pub moments: Vec<MomentResponse>,
    pub total: usize,
}

/// POST /api/moments — post a moment and notify currently-online
/// accepted friends.
pub async fn create_moment(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<CreateMomentRequest>,
) -> Result<(StatusCode, Json<MomentResponse>), ApiError> {
    let user_id = claims.sub;

    if body.encrypted_content.is_empty() && body.media_url.is_none() {
        return Err(ApiError::Validation("moment is empty".into()));
    }

    let now = Utc::now();
    let moment = Moment {
        id: Uuid::now_v7().to_string(),
        owner_id: user_id.clone(),
        encrypted_content: body.encrypted_content,
        media_url: body.media_url,
        created_at: now,
        expires_at: now + Duration::seconds(MOMENT_TTL_SECS),
        views: vec![],
        deleted: false,
    };
    state.store.insert_moment(moment.clone()).await?;

    let response = MomentResponse::for_viewer(&moment, &user_id);
    let friends = state.store.accepted_friend_ids(&user_id).await?;
    let online_friends: Vec<String> = friends
        .into_iter()
        .filter(|f| state.registry.is_online(f))
        .collect();
    broadcast::dispatch(
        &state,
        &ServerEvent::MomentPosted {
            moment: response.clone(),
        },
        &online_friends,
        None,
    )
    .await;

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/moments — feed of own plus accepted friends' live moments,
/// newest first.
pub async fn feed(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<MomentFeedResponse>, ApiError> {
    let user_id = claims.sub;

    let mut owners = state.store.accepted_friend_ids(&user_id).await?;
    owners.push(user_id.clone());

    let moments = state.store.moments_by_owners(&owners, Utc::now()).await?;
    let moments: Vec<MomentResponse> = moments
        .iter()
        .map(|m| MomentResponse::for_viewer(m, &user_id))
        .collect();

    let total = moments.len();
    Ok(Json(MomentFeedResponse { moments, total }))
}

/// POST /api/moments/{id}/view — record a view. Idempotent per viewer;
/// the owner looking at their own moment is not recorded.
pub async fn view_moment(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<MomentResponse>, ApiError> {
    let user_id = claims.sub;

    let moment = state
        .store
        .find_moment(&id)
        .await?
        .filter(|m| m.live(Utc::now()))
        .ok_or_else(|| ApiError::NotFound("moment not found".into()))?;

    if moment.owner_id != user_id {
        let friends = state.store.accepted_friend_ids(&moment.owner_id).await?;
        if !friends.iter().any(|f| *f == user_id) {
            return Err(ApiError::Forbidden(
                "only friends can view this moment".into(),
            ));
        }
        let _ = state.store.add_moment_view(&id, &user_id, Utc::now()).await?;
    }

    let moment = state
        .store
        .find_moment(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("moment not found".into()))?;
    Ok(Json(MomentResponse::for_viewer(&moment, &user_id)))
}

/// DELETE /api/moments/{id} — owner-only soft delete.
pub async fn delete_moment(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let moment = state
        .store
        .find_moment(&id)
        .await?
        .filter(|m| !m.deleted)
        .ok_or_else(|| ApiError::NotFound("moment not found".into()))?;
    if moment.owner_id != claims.sub {
        return Err(ApiError::Forbidden("only the owner can delete a moment".into()));
    }

    state.store.soft_delete_moment(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
