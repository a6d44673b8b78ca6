use dashmap::DashMap;
use uuid::Uuid;

use super::ConnectionSender;

/// One live WebSocket connection. The id distinguishes concurrent
/// connections from the same user (multiple devices/tabs) so removal
/// can target exactly one of them.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub tx: ConnectionSender,
}

impl ConnectionHandle {
    pub fn new(tx: ConnectionSender) -> Self {
        Self {
            id: Uuid::now_v7(),
            tx,
        }
    }
}

/// Session registry: all active WebSocket connections keyed by user id.
/// A user is online iff they have at least one entry. Empty sets are
/// pruned on removal, so key presence alone answers is_online.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    connections: DashMap<String, Vec<ConnectionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection for the user. Returns true when this was the
    /// user's first connection, i.e. they just came online.
    pub fn register(&self, user_id: &str, handle: ConnectionHandle) -> bool {
        let mut entry = self.connections.entry(user_id.to_string()).or_default();
        let was_empty = entry.is_empty();
        if !entry.iter().any(|c| c.id == handle.id) {
            entry.push(handle);
        }
        was_empty
    }

    /// Remove one connection by id. Returns true only when this call
    /// removed the user's last connection — the offline transition is
    /// reported exactly once no matter which path (actor teardown or a
    /// failed delivery) gets here first.
    pub fn unregister(&self, user_id: &str, conn_id: Uuid) -> bool {
        let emptied = {
            let Some(mut entry) = self.connections.get_mut(user_id) else {
                return false;
            };
            let before = entry.len();
            entry.retain(|c| c.id != conn_id);
            before > 0 && entry.is_empty()
        };
        if emptied {
            self.connections.remove_if(user_id, |_, v| v.is_empty());
        }
        emptied
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.connections
            .get(user_id)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    /// Snapshot of the user's connection handles. Sends happen outside
    /// the map guard.
    pub fn senders_for(&self, user_id: &str) -> Vec<ConnectionHandle> {
        self.connections
            .get(user_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        self.connections.get(user_id).map(|v| v.len()).unwrap_or(0)
    }
}
