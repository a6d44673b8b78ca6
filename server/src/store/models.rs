//! Document models for the keyed store collections.
//!
//! These mirror what the document store persists. Message payloads are
//! opaque ciphertext; the server never inspects plaintext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Users ---

/// Presence fields persisted on the user document. Advisory, not
/// authoritative — the session registry is the source of truth for
/// liveness while a user is connected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserStatus {
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

// --- Conversations ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    OneToOne,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub last_read_at: Option<DateTime<Utc>>,
    pub notifications_enabled: bool,
}

impl Participant {
    pub fn new(user_id: &str, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            joined_at,
            left_at: None,
            last_read_at: None,
            notifications_enabled: true,
        }
    }
}

/// Denormalized preview of the most recent message. Reconstructible from
/// the message log, so a crash between message insert and this update is
/// tolerated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessage {
    pub message_id: String,
    pub encrypted_preview: String,
    pub timestamp: DateTime<Utc>,
    pub sender_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub kind: ConversationKind,
    pub participants: Vec<Participant>,
    /// Canonical sorted-pair key, set for one-to-one conversations only.
    /// Enforces at most one conversation per distinct pair.
    pub pair_key: Option<String>,
    pub last_message: Option<LastMessage>,
    /// Users who soft-deleted their view of this conversation.
    pub archived_by: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn is_active_participant(&self, user_id: &str) -> bool {
        self.participants
            .iter()
            .any(|p| p.user_id == user_id && p.left_at.is_none())
    }

    pub fn active_participant_ids(&self) -> Vec<String> {
        self.participants
            .iter()
            .filter(|p| p.left_at.is_none())
            .map(|p| p.user_id.clone())
            .collect()
    }
}

/// Canonical key for a one-to-one conversation: the sorted pair of user
/// ids. Both (a, b) and (b, a) map to the same key.
pub fn one_to_one_pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

// --- Messages ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Image,
    Video,
    Audio,
    File,
}

/// Symmetric message key wrapped for one (recipient, device) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientKey {
    pub user_id: String,
    pub device_id: String,
    pub encrypted_key: String,
}

/// Non-encrypted message metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub media_url: Option<String>,
    pub media_thumbnail: Option<String>,
    pub file_size: Option<u64>,
    pub duration_secs: Option<u32>,
    pub reply_to: Option<String>,
    #[serde(default)]
    pub is_ephemeral: bool,
    pub ttl_seconds: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub view_once: bool,
}

/// One delivery or read receipt. At most one per user_id per message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub user_id: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub encrypted_content: String,
    pub content_type: ContentType,
    pub recipient_keys: Vec<RecipientKey>,
    pub metadata: MessageMetadata,
    /// Per-conversation commit sequence, assigned by the store on insert.
    /// Monotonic within a conversation; the ordering contract for events.
    pub sequence: u64,
    pub delivered_to: Vec<Receipt>,
    pub read_by: Vec<Receipt>,
    pub deleted_for: Vec<String>,
    pub deleted_for_everyone: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.metadata.expires_at, Some(expires_at) if expires_at <= now)
    }

    /// Per-viewer read filter: global deletion wins over everything,
    /// then per-user deletion, then ephemeral expiry.
    pub fn visible_to(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        !self.deleted_for_everyone
            && !self.deleted_for.iter().any(|u| u == user_id)
            && !self.expired(now)
    }
}

// --- Friendships ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
    Rejected,
    Blocked,
}

/// Edge between two users. At most one record per unordered pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Friendship {
    pub id: String,
    pub requester_id: String,
    pub addressee_id: String,
    pub status: FriendshipStatus,
    pub blocked_by: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Friendship {
    pub fn involves(&self, user_id: &str) -> bool {
        self.requester_id == user_id || self.addressee_id == user_id
    }

    /// The other end of the edge from `user_id`'s point of view.
    pub fn other(&self, user_id: &str) -> &str {
        if self.requester_id == user_id {
            &self.addressee_id
        } else {
            &self.requester_id
        }
    }
}

// --- Moments ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentView {
    pub user_id: String,
    pub viewed_at: DateTime<Utc>,
}

/// Ephemeral post with a fixed 24-hour lifetime, visible to accepted
/// friends of the owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Moment {
    pub id: String,
    pub owner_id: String,
    pub encrypted_content: String,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub views: Vec<MomentView>,
    pub deleted: bool,
}

impl Moment {
    pub fn live(&self, now: DateTime<Utc>) -> bool {
        !self.deleted && self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn pair_key_is_order_independent() {
        assert_eq!(one_to_one_pair_key("alice", "bob"), one_to_one_pair_key("bob", "alice"));
        assert_eq!(one_to_one_pair_key("alice", "bob"), "alice:bob");
    }

    #[test]
    fn message_visibility_filters() {
        let now = Utc::now();
        let mut msg = Message {
            id: "m1".into(),
            conversation_id: "c1".into(),
            sender_id: "alice".into(),
            encrypted_content: "blob".into(),
            content_type: ContentType::Text,
            recipient_keys: vec![],
            metadata: MessageMetadata::default(),
            sequence: 1,
            delivered_to: vec![],
            read_by: vec![],
            deleted_for: vec!["bob".into()],
            deleted_for_everyone: false,
            deleted_at: None,
            created_at: now,
        };

        assert!(msg.visible_to("alice", now));
        assert!(!msg.visible_to("bob", now));

        msg.metadata.expires_at = Some(now - Duration::seconds(1));
        assert!(!msg.visible_to("alice", now));

        msg.metadata.expires_at = None;
        msg.deleted_for_everyone = true;
        assert!(!msg.visible_to("alice", now));
        assert!(!msg.visible_to("carol", now));
    }
}
