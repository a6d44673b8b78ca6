use std::sync::Arc;

use axum::extract::ws::Message;

use crate::presence;
use crate::state::AppState;
use crate::ws::protocol::ServerEvent;
use crate::ws::registry::SessionRegistry;

/// Best-effort fan-out over live connections. Delivery is fire-and-forget:
/// a failed send drops that one connection from the registry and never
/// fails the operation that triggered the event.
#[derive(Clone)]
pub struct EventRouter {
    registry: Arc<SessionRegistry>,
}

impl EventRouter {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Serialize once, send to every connection of every recipient.
    /// Returns the users whose last connection was dropped here; the
    /// caller owes them an offline transition.
    pub fn deliver(
        &self,
        event: &ServerEvent,
        recipients: &[String],
        exclude: Option<&str>,
    ) -> Vec<String> {
        let frame = match serde_json::to_string(event) {
            Ok(json) => Message::Text(json.into()),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize server event");
                return Vec::new();
            }
        };

        let mut went_offline = Vec::new();
        for user_id in recipients {
            if exclude == Some(user_id.as_str()) {
                continue;
            }
            for conn in self.registry.senders_for(user_id) {
                if conn.tx.send(frame.clone()).is_err() {
                    tracing::debug!(
                        user_id = %user_id,
                        conn_id = %conn.id,
                        "dropping dead connection"
                    );
                    if self.registry.unregister(user_id, conn.id) {
                        went_offline.push(user_id.clone());
                    }
                }
            }
        }
        went_offline
    }

    pub fn send_to_user(&self, user_id: &str, event: &ServerEvent) -> Vec<String> {
        self.deliver(event, &[user_id.to_string()], None)
    }
}

/// Deliver an event and settle any offline transitions the delivery
/// uncovered. The presence update runs after the fan-out so a dead
/// connection discovered mid-send still produces its user_offline.
pub async fn dispatch(
    state: &AppState,
    event: &ServerEvent,
    recipients: &[String],
    exclude: Option<&str>,
) {
    let went_offline = state.router.deliver(event, recipients, exclude);
    for user_id in went_offline {
        presence::user_went_offline(state, &user_id).await;
    }
}

pub async fn dispatch_to_user(state: &AppState, user_id: &str, event: &ServerEvent) {
    let went_offline = state.router.send_to_user(user_id, event);
    for user_id in went_offline {
        presence::user_went_offline(state, &user_id).await;
    }
}
