//! Presence transitions.
//!
//! Fired by the session registry exactly once per transition: when a
//! user's first connection registers and when their last connection
//! goes away. Persisting last_seen and notifying friends are both
//! best-effort; a storage hiccup here must never take down the
//! connection actor that triggered it.

use chrono::Utc;

use crate::state::AppState;
use crate::ws::protocol::ServerEvent;

pub async fn user_came_online(state: &AppState, user_id: &str) {
    let dropped = transition(state, user_id, true).await;
    settle_offline(state, dropped).await;
}

pub async fn user_went_offline(state: &AppState, user_id: &str) {
    settle_offline(state, vec![user_id.to_string()]).await;
}

/// Notifying friends can itself uncover dead connections, each of which
/// may be someone's last. Worked off as a queue rather than recursively;
/// the registry guarantees each user transitions at most once, so this
/// terminates.
async fn settle_offline(state: &AppState, mut queue: Vec<String>) {
    while let Some(user_id) = queue.pop() {
        let dropped = transition(state, &user_id, false).await;
        queue.extend(dropped);
    }
}

/// Persist the presence flip and notify online accepted friends.
/// Returns users whose last connection died during the notification
/// fan-out and therefore owe an offline transition of their own.
async fn transition(state: &AppState, user_id: &str, online: bool) -> Vec<String> {
    let now = Utc::now();

    if let Err(e) = state.store.set_presence(user_id, online, now).await {
        tracing::warn!(user_id = %user_id, error = %e, "failed to persist presence");
    }

    let friends = match state.store.accepted_friend_ids(user_id).await {
        Ok(friends) => friends,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "failed to load friends for presence");
            return Vec::new();
        }
    };

    let event = if online {
        ServerEvent::UserOnline {
            user_id: user_id.to_string(),
            timestamp: now,
        }
    } else {
        ServerEvent::UserOffline {
            user_id: user_id.to_string(),
            timestamp: now,
        }
    };

    let mut dropped = Vec::new();
    for friend_id in friends {
        if state.registry.is_online(&friend_id) {
            dropped.extend(state.router.send_to_user(&friend_id, &event));
        }
    }
    dropped
}
