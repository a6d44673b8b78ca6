//! Document store collaborator.
//!
//! The core treats persistence as a keyed document store with atomic
//! single-document find/insert/update operations — that atomicity is the
//! concurrency boundary for conversation and message mutations, so no
//! in-process locking wraps these calls. No multi-document transactions:
//! a send is an insert_message plus a set_last_message, each independent.

pub mod memory;
pub mod models;

pub use models::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Which side of a friend request a listing is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestRole {
    Requester,
    Addressee,
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- users ---
    async fn insert_user(&self, user: User) -> Result<(), StoreError>;
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;
    /// Batched lookup for response formatting. Missing ids are skipped.
    async fn find_users(&self, ids: &[String]) -> Result<Vec<User>, StoreError>;
    async fn set_presence(
        &self,
        user_id: &str,
        online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // --- conversations ---
    /// Insert a one-to-one conversation, enforcing pair uniqueness.
    /// If a conversation already exists for the pair key, the existing
    /// document is returned instead (first writer wins).
    async fn create_one_to_one(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, StoreError>;
    async fn find_conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError>;
    /// Conversations where the user is a participant and has not
    /// archived their view, newest activity first.
    async fn conversations_for(&self, user_id: &str) -> Result<Vec<Conversation>, StoreError>;
    async fn set_last_message(
        &self,
        conversation_id: &str,
        preview: LastMessage,
    ) -> Result<(), StoreError>;
    /// Advance the participant's read marker. Never moves backwards.
    async fn set_last_read(
        &self,
        conversation_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Returns false if the conversation does not exist or the user is
    /// not a participant.
    async fn archive_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<bool, StoreError>;

    // --- messages ---
    /// Persist a message, assigning its per-conversation sequence.
    /// Returns the stored document.
    async fn insert_message(&self, message: Message) -> Result<Message, StoreError>;
    async fn find_message(&self, id: &str) -> Result<Option<Message>, StoreError>;
    /// Idempotent receipt append, deduplicated by user_id. Returns true
    /// only when this call added the entry.
    async fn add_delivery_receipt(
        &self,
        message_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
    async fn add_read_receipt(
        &self,
        message_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
    async fn mark_deleted_for_everyone(
        &self,
        message_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn mark_deleted_for(&self, message_id: &str, user_id: &str) -> Result<(), StoreError>;
    /// Messages visible to the viewer, newest first, optionally before a
    /// creation-time cursor.
    async fn list_messages(
        &self,
        conversation_id: &str,
        viewer: &str,
        before: Option<DateTime<Utc>>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Message>, StoreError>;
    async fn count_messages(
        &self,
        conversation_id: &str,
        viewer: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
    /// Unread baseline: visible messages from other senders created
    /// after `after` (all of them when `after` is unset).
    async fn count_unread(
        &self,
        conversation_id: &str,
        user_id: &str,
        after: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
    /// Physically reap fully-expired ephemeral messages. Returns the
    /// number of rows removed.
    async fn purge_expired_messages(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    // --- friendships ---
    async fn insert_friendship(&self, friendship: Friendship) -> Result<(), StoreError>;
    async fn find_friendship(&self, id: &str) -> Result<Option<Friendship>, StoreError>;
    async fn find_friendship_between(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<Friendship>, StoreError>;
    /// Replace the friendship document by id.
    async fn update_friendship(&self, friendship: Friendship) -> Result<(), StoreError>;
    async fn delete_friendship(&self, id: &str) -> Result<(), StoreError>;
    async fn accepted_friend_ids(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
    /// Requests where the user plays `role`, optionally filtered by
    /// status, most recent first.
    async fn friend_requests(
        &self,
        user_id: &str,
        role: RequestRole,
        status: Option<FriendshipStatus>,
    ) -> Result<Vec<Friendship>, StoreError>;

    // --- moments ---
    async fn insert_moment(&self, moment: Moment) -> Result<(), StoreError>;
    async fn find_moment(&self, id: &str) -> Result<Option<Moment>, StoreError>;
    /// Live (unexpired, not deleted) moments owned by any of `owner_ids`,
    /// newest first.
    async fn moments_by_owners(
        &self,
        owner_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<Moment>, StoreError>;
    /// Idempotent view append, deduplicated by viewer.
    async fn add_moment_view(
        &self,
        moment_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
    async fn soft_delete_moment(&self, moment_id: &str) -> Result<(), StoreError>;
}
