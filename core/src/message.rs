/// Canonical chat message and the total order used to sequence it
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message payload kind. Only text today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Text,
}

/// One chat message.
///
/// `id` is server-assigned and absent on not-yet-acknowledged local sends.
/// `seq` is a local, monotonically increasing insertion counter used to break
/// ordering ties; it is persisted with the cache so tie order survives a
/// reload, and defaults to 0 when the server JSON omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub id: Option<i64>,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub message_type: MessageType,
    #[serde(default)]
    pub seq: u64,
}

impl ChatMessage {
    /// New optimistic local send: no server id yet
    pub fn outgoing(sender_id: i64, recipient_id: i64, content: impl Into<String>, seq: u64) -> Self {
        Self {
            id: None,
            sender_id,
            recipient_id,
            content: content.into(),
            timestamp: Utc::now(),
            message_type: MessageType::Text,
            seq,
        }
    }

    /// Ordering key: timestamp ascending, then server id when assigned,
    /// otherwise the local insertion counter. Remaining ties are resolved by
    /// insertion order (the merge uses a stable sort).
    pub fn order_key(&self) -> (DateTime<Utc>, u64) {
        // Negative ids never come from a well-behaved server; clamp rather
        // than let a wrapped cast distort the tiebreak.
        let tie = match self.id {
            Some(id) => u64::try_from(id).unwrap_or(0),
            None => self.seq,
        };
        (self.timestamp, tie)
    }

    /// Two messages are the same logical message iff both carry a server id
    /// and the ids are equal. Id-less messages are never duplicates of each
    /// other.
    pub fn same_identity(&self, other: &ChatMessage) -> bool {
        matches!((self.id, other.id), (Some(a), Some(b)) if a == b)
    }

    /// True when `self` is the server-confirmed copy of the optimistic
    /// placeholder `local`: same sender, content and timestamp, with a real
    /// id on the confirmed side only.
    pub fn is_server_echo_of(&self, local: &ChatMessage) -> bool {
        self.id.is_some()
            && local.id.is_none()
            && self.sender_id == local.sender_id
            && self.content == local.content
            && self.timestamp == local.timestamp
    }

    /// True when the two entries are the same locally created message (same
    /// insertion counter and fields). Distinguishes a re-merge of a cached
    /// optimistic send from a genuine rapid double-submit, which gets a new
    /// counter and is deliberately kept.
    pub fn same_local_entry(&self, other: &ChatMessage) -> bool {
        self.id.is_none()
            && other.id.is_none()
            && self.seq == other.seq
            && self.sender_id == other.sender_id
            && self.content == other.content
            && self.timestamp == other.timestamp
    }
}

/// Unordered pair of participant ids identifying one two-party thread.
///
/// Stored normalized so that sender=A,recipient=B and sender=B,recipient=A
/// address the same conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    user_a: i64,
    user_b: i64,
}

impl ConversationKey {
    pub fn new(x: i64, y: i64) -> Self {
        Self {
            user_a: x.min(y),
            user_b: x.max(y),
        }
    }

    pub fn of_message(msg: &ChatMessage) -> Self {
        Self::new(msg.sender_id, msg.recipient_id)
    }

    pub fn user_a(&self) -> i64 {
        self.user_a
    }

    pub fn user_b(&self) -> i64 {
        self.user_b
    }

    pub fn contains(&self, user_id: i64) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// The other participant from `user_id`'s point of view
    pub fn peer_of(&self, user_id: i64) -> i64 {
        if self.user_a == user_id {
            self.user_b
        } else {
            self.user_a
        }
    }
}
