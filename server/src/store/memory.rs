//! In-memory document store.
//!
//! One DashMap per collection; each trait method touches a single entry
//! under its shard lock, which is what gives the per-document atomicity
//! the trait contract promises. Message sequence numbers are tracked per
//! conversation in a side map so insert_message can assign them without
//! scanning the collection.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use async_trait::async_trait;

use super::models::*;
use super::{RequestRole, Store, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    conversations: DashMap<String, Conversation>,
    /// pair_key -> conversation id, enforcing one-to-one uniqueness.
    one_to_one_index: DashMap<String, String>,
    messages: DashMap<String, Message>,
    /// conversation id -> last assigned sequence.
    sequences: DashMap<String, u64>,
    friendships: DashMap<String, Friendship>,
    moments: DashMap<String, Moment>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        self.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn find_users(&self, ids: &[String]) -> Result<Vec<User>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|u| u.clone()))
            .collect())
    }

    async fn set_presence(
        &self,
        user_id: &str,
        online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.status.online = online;
            user.status.last_seen = Some(last_seen);
        }
        Ok(())
    }

    async fn create_one_to_one(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, StoreError> {
        let Some(pair_key) = conversation.pair_key.clone() else {
            self.conversations
                .insert(conversation.id.clone(), conversation.clone());
            return Ok(conversation);
        };

        let existing_id = match self.one_to_one_index.entry(pair_key) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                self.conversations
                    .insert(conversation.id.clone(), conversation.clone());
                vacant.insert(conversation.id.clone());
                return Ok(conversation);
            }
        };

        // Lost the race (or the pair already existed): hand back the
        // winning document.
        self.conversations
            .get(&existing_id)
            .map(|c| c.clone())
            .ok_or_else(|| StoreError::Unavailable("one-to-one index out of sync".into()))
    }

    async fn find_conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(self.conversations.get(id).map(|c| c.clone()))
    }

    async fn conversations_for(&self, user_id: &str) -> Result<Vec<Conversation>, StoreError> {
        let mut out: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|entry| {
                let c = entry.value();
                c.is_active_participant(user_id) && !c.archived_by.iter().any(|u| u == user_id)
            })
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(out)
    }

    async fn set_last_message(
        &self,
        conversation_id: &str,
        preview: LastMessage,
    ) -> Result<(), StoreError> {
        if let Some(mut conversation) = self.conversations.get_mut(conversation_id) {
            conversation.updated_at = preview.timestamp;
            conversation.last_message = Some(preview);
        }
        Ok(())
    }

    async fn set_last_read(
        &self,
        conversation_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(mut conversation) = self.conversations.get_mut(conversation_id) {
            if let Some(participant) = conversation
                .participants
                .iter_mut()
                .find(|p| p.user_id == user_id)
            {
                if participant.last_read_at.map_or(true, |prev| at > prev) {
                    participant.last_read_at = Some(at);
                }
            }
        }
        Ok(())
    }

    async fn archive_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        match self.conversations.get_mut(conversation_id) {
            Some(mut conversation) if conversation.participant(user_id).is_some() => {
                if !conversation.archived_by.iter().any(|u| u == user_id) {
                    conversation.archived_by.push(user_id.to_string());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_message(&self, mut message: Message) -> Result<Message, StoreError> {
        let sequence = {
            let mut entry = self
                .sequences
                .entry(message.conversation_id.clone())
                .or_insert(0);
            *entry += 1;
            *entry
        };
        message.sequence = sequence;
        self.messages.insert(message.id.clone(), message.clone());
        Ok(message)
    }

    async fn find_message(&self, id: &str) -> Result<Option<Message>, StoreError> {
        Ok(self.messages.get(id).map(|m| m.clone()))
    }

    async fn add_delivery_receipt(
        &self,
        message_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(mut message) = self.messages.get_mut(message_id) else {
            return Ok(false);
        };
        if message.delivered_to.iter().any(|r| r.user_id == user_id) {
            return Ok(false);
        }
        message.delivered_to.push(Receipt {
            user_id: user_id.to_string(),
            at,
        });
        Ok(true)
    }

    async fn add_read_receipt(
        &self,
        message_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(mut message) = self.messages.get_mut(message_id) else {
            return Ok(false);
        };
        if message.read_by.iter().any(|r| r.user_id == user_id) {
            return Ok(false);
        }
        message.read_by.push(Receipt {
            user_id: user_id.to_string(),
            at,
        });
        Ok(true)
    }

    async fn mark_deleted_for_everyone(
        &self,
        message_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(mut message) = self.messages.get_mut(message_id) {
            message.deleted_for_everyone = true;
            message.deleted_at = Some(at);
        }
        Ok(())
    }

    async fn mark_deleted_for(&self, message_id: &str, user_id: &str) -> Result<(), StoreError> {
        if let Some(mut message) = self.messages.get_mut(message_id) {
            if !message.deleted_for.iter().any(|u| u == user_id) {
                message.deleted_for.push(user_id.to_string());
            }
        }
        Ok(())
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        viewer: &str,
        before: Option<DateTime<Utc>>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Message>, StoreError> {
        let mut out: Vec<Message> = self
            .messages
            .iter()
            .filter(|entry| {
                let m = entry.value();
                m.conversation_id == conversation_id
                    && m.visible_to(viewer, now)
                    && before.map_or(true, |cursor| m.created_at < cursor)
            })
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.sequence.cmp(&a.sequence))
        });
        out.truncate(limit);
        Ok(out)
    }

    async fn count_messages(
        &self,
        conversation_id: &str,
        viewer: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self
            .messages
            .iter()
            .filter(|entry| {
                let m = entry.value();
                m.conversation_id == conversation_id && m.visible_to(viewer, now)
            })
            .count() as u64)
    }

    async fn count_unread(
        &self,
        conversation_id: &str,
        user_id: &str,
        after: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self
            .messages
            .iter()
            .filter(|entry| {
                let m = entry.value();
                m.conversation_id == conversation_id
                    && m.sender_id != user_id
                    && m.visible_to(user_id, now)
                    && after.map_or(true, |marker| m.created_at > marker)
            })
            .count() as u64)
    }

    async fn purge_expired_messages(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let before = self.messages.len();
        self.messages
            .retain(|_, m| !(m.metadata.is_ephemeral && m.expired(now)));
        Ok(before - self.messages.len())
    }

    async fn insert_friendship(&self, friendship: Friendship) -> Result<(), StoreError> {
        self.friendships.insert(friendship.id.clone(), friendship);
        Ok(())
    }

    async fn find_friendship(&self, id: &str) -> Result<Option<Friendship>, StoreError> {
        Ok(self.friendships.get(id).map(|f| f.clone()))
    }

    async fn find_friendship_between(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<Friendship>, StoreError> {
        Ok(self
            .friendships
            .iter()
            .find(|entry| {
                let f = entry.value();
                f.involves(a) && f.involves(b)
            })
            .map(|entry| entry.value().clone()))
    }

    async fn update_friendship(&self, friendship: Friendship) -> Result<(), StoreError> {
        self.friendships.insert(friendship.id.clone(), friendship);
        Ok(())
    }

    async fn delete_friendship(&self, id: &str) -> Result<(), StoreError> {
        self.friendships.remove(id);
        Ok(())
    }

    async fn accepted_friend_ids(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .friendships
            .iter()
            .filter(|entry| {
                let f = entry.value();
                f.status == FriendshipStatus::Accepted && f.involves(user_id)
            })
            .map(|entry| entry.value().other(user_id).to_string())
            .collect())
    }

    async fn friend_requests(
        &self,
        user_id: &str,
        role: RequestRole,
        status: Option<FriendshipStatus>,
    ) -> Result<Vec<Friendship>, StoreError> {
        let mut out: Vec<Friendship> = self
            .friendships
            .iter()
            .filter(|entry| {
                let f = entry.value();
                let matches_role = match role {
                    RequestRole::Requester => f.requester_id == user_id,
                    RequestRole::Addressee => f.addressee_id == user_id,
                };
                matches_role && status.map_or(true, |s| f.status == s)
            })
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(out)
    }

    async fn insert_moment(&self, moment: Moment) -> Result<(), StoreError> {
        self.moments.insert(moment.id.clone(), moment);
        Ok(())
    }

    async fn find_moment(&self, id: &str) -> Result<Option<Moment>, StoreError> {
        Ok(self.moments.get(id).map(|m| m.clone()))
    }

    async fn moments_by_owners(
        &self,
        owner_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<Moment>, StoreError> {
        let mut out: Vec<Moment> = self
            .moments
            .iter()
            .filter(|entry| {
                let m = entry.value();
                m.live(now) && owner_ids.iter().any(|id| *id == m.owner_id)
            })
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn add_moment_view(
        &self,
        moment_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(mut moment) = self.moments.get_mut(moment_id) else {
            return Ok(false);
        };
        if moment.views.iter().any(|v| v.user_id == user_id) {
            return Ok(false);
        }
        moment.views.push(MomentView {
            user_id: user_id.to_string(),
            viewed_at: at,
        });
        Ok(true)
    }

    async fn soft_delete_moment(&self, moment_id: &str) -> Result<(), StoreError> {
        if let Some(mut moment) = self.moments.get_mut(moment_id) {
            moment.deleted = true;
        }
        Ok(())
    }
}
