/// Local conversation cache: per-thread message lists stored in sled
///
/// One entry per conversation key, overwritten whole on every merge. A
/// corrupt entry degrades to an empty history, never to an error.
use crate::error::{ChatError, Result};
use crate::message::{ChatMessage, ConversationKey};
use std::path::Path;
use tracing::warn;

pub struct CacheStore {
    db: sled::Db,
    max_messages: usize,
}

fn storage_key(key: &ConversationKey) -> String {
    format!("conv:{}:{}", key.user_a(), key.user_b())
}

impl CacheStore {
    /// Open (or create) the cache under `data_dir`
    pub fn new(data_dir: &Path, max_messages: usize) -> Result<Self> {
        let db = sled::open(data_dir.join("conversations.db"))
            .map_err(|e| ChatError::Cache(format!("Failed to open conversation cache: {}", e)))?;
        Ok(Self { db, max_messages })
    }

    /// Load the cached history for one conversation.
    ///
    /// Never fails: a missing, unreadable or corrupt entry is an empty
    /// history (logged, not fatal).
    pub fn load(&self, key: &ConversationKey) -> Vec<ChatMessage> {
        let raw = match self.db.get(storage_key(key).as_bytes()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Cache read failed for {:?}: {}", key, e);
                return Vec::new();
            }
        };
        match serde_json::from_slice::<Vec<ChatMessage>>(&raw) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Corrupt cache entry for {:?}, treating as empty: {}", key, e);
                Vec::new()
            }
        }
    }

    /// Replace the stored history for one conversation atomically.
    ///
    /// The entry is capped to the newest `max_messages`; the single sled
    /// insert means a later `load` never observes a partial write.
    pub fn save(&self, key: &ConversationKey, messages: &[ChatMessage]) -> Result<()> {
        let start = messages.len().saturating_sub(self.max_messages);
        let value = serde_json::to_vec(&messages[start..]).map_err(ChatError::Serialization)?;
        self.db
            .insert(storage_key(key).as_bytes(), value)
            .map_err(|e| ChatError::Cache(format!("Failed to save conversation: {}", e)))?;
        Ok(())
    }

    /// Wipe every cached conversation (logout path)
    pub fn clear(&self) -> Result<()> {
        self.db
            .clear()
            .map_err(|e| ChatError::Cache(format!("Failed to clear cache: {}", e)))?;
        Ok(())
    }

    /// Number of cached conversations
    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

impl Clone for CacheStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            max_messages: self.max_messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use chrono::{TimeZone, Utc};

    fn msg(id: i64, at: i64) -> ChatMessage {
        ChatMessage {
            id: Some(id),
            sender_id: 1,
            recipient_id: 2,
            content: format!("m{}", id),
            timestamp: Utc.timestamp_opt(1_700_000_000 + at, 0).unwrap(),
            message_type: MessageType::Text,
            seq: 0,
        }
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), 100).unwrap();
        let key = ConversationKey::new(1, 2);

        store.save(&key, &[msg(1, 10), msg(2, 20)]).unwrap();
        let loaded = store.load(&key);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].id, Some(2));

        // Symmetric key addresses the same slot
        assert_eq!(store.load(&ConversationKey::new(2, 1)).len(), 2);
    }

    #[test]
    fn test_missing_entry_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), 100).unwrap();
        assert!(store.load(&ConversationKey::new(5, 6)).is_empty());
    }

    #[test]
    fn test_corrupt_entry_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), 100).unwrap();
        let key = ConversationKey::new(1, 2);

        store
            .db
            .insert(storage_key(&key).as_bytes(), &b"{not json"[..])
            .unwrap();
        assert!(store.load(&key).is_empty());
    }

    #[test]
    fn test_save_caps_to_newest() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), 2).unwrap();
        let key = ConversationKey::new(1, 2);

        store.save(&key, &[msg(1, 10), msg(2, 20), msg(3, 30)]).unwrap();
        let loaded = store.load(&key);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, Some(2));
        assert_eq!(loaded[1].id, Some(3));
    }

    #[test]
    fn test_clear_wipes_all_conversations() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), 100).unwrap();
        store.save(&ConversationKey::new(1, 2), &[msg(1, 10)]).unwrap();
        store.save(&ConversationKey::new(1, 3), &[msg(2, 20)]).unwrap();
        assert_eq!(store.len(), 2);

        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(store.load(&ConversationKey::new(1, 2)).is_empty());
    }
}
