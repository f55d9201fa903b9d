//! Collaborator seams: message persistence and arrival notification.
//!
//! The network layer only knows these traits. `MemoryStore` backs tests and
//! hosts that keep history themselves; the SQLite implementation lives in
//! nico-store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::message::{time_label, ChatSummary, Message};

/// Error from a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend: {0}")]
    Backend(String),
}

/// Chat-scoped append log of messages.
pub trait MessageStore: Send + Sync {
    /// Append one message; returns its storage id.
    fn append(&self, msg: &Message) -> Result<i64, StoreError>;

    /// All messages of one chat, oldest first.
    fn list_by_chat(&self, chat_name: &str) -> Result<Vec<Message>, StoreError>;

    /// Newest message per chat, most recently active chat first.
    fn latest_per_chat(&self) -> Result<Vec<ChatSummary>, StoreError>;
}

/// Told about every arriving message, whether or not a screen is visible.
pub trait NotificationSink: Send + Sync {
    fn notify_message(&self, sender: &str, body: &str);
}

/// Vec-backed store. Ids are 1-based insertion indices.
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: Mutex<Vec<Message>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn messages(&self) -> MutexGuard<'_, Vec<Message>> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of everything appended, in insertion order.
    pub fn all_messages(&self) -> Vec<Message> {
        self.messages().clone()
    }
}

impl MessageStore for MemoryStore {
    fn append(&self, msg: &Message) -> Result<i64, StoreError> {
        let mut messages = self.messages();
        messages.push(msg.clone());
        Ok(messages.len() as i64)
    }

    fn list_by_chat(&self, chat_name: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .messages()
            .iter()
            .filter(|m| m.chat_name == chat_name)
            .cloned()
            .collect())
    }

    fn latest_per_chat(&self) -> Result<Vec<ChatSummary>, StoreError> {
        let messages = self.messages();
        let mut newest: HashMap<&str, (usize, &Message)> = HashMap::new();
        for (idx, msg) in messages.iter().enumerate() {
            newest.insert(msg.chat_name.as_str(), (idx, msg));
        }
        let mut ordered: Vec<(usize, &Message)> = newest.into_values().collect();
        ordered.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(ordered
            .into_iter()
            .map(|(_, msg)| ChatSummary {
                chat_name: msg.chat_name.clone(),
                last_body: msg.body.clone(),
                last_time_label: time_label(msg.sent_at_ms),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Direction;

    #[test]
    fn append_returns_sequential_ids() {
        let store = MemoryStore::new();
        let id1 = store.append(&Message::incoming("a", "x", "1", 10)).unwrap();
        let id2 = store.append(&Message::incoming("a", "x", "2", 20)).unwrap();
        assert_eq!((id1, id2), (1, 2));
    }

    #[test]
    fn list_by_chat_filters_and_keeps_order() {
        let store = MemoryStore::new();
        store.append(&Message::incoming("a", "x", "first", 10)).unwrap();
        store.append(&Message::outgoing("b", "me", "other", 20)).unwrap();
        store.append(&Message::incoming("a", "x", "second", 30)).unwrap();
        let chat_a = store.list_by_chat("a").unwrap();
        assert_eq!(chat_a.len(), 2);
        assert_eq!(chat_a[0].body, "first");
        assert_eq!(chat_a[1].body, "second");
        assert_eq!(chat_a[0].direction, Direction::Incoming);
    }

    #[test]
    fn latest_per_chat_most_recent_chat_first() {
        let store = MemoryStore::new();
        store.append(&Message::incoming("a", "x", "old a", 10)).unwrap();
        store.append(&Message::incoming("b", "y", "only b", 20)).unwrap();
        store.append(&Message::incoming("a", "x", "new a", 30)).unwrap();
        let summaries = store.latest_per_chat().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].chat_name, "a");
        assert_eq!(summaries[0].last_body, "new a");
        assert_eq!(summaries[1].chat_name, "b");
        assert_eq!(summaries[1].last_body, "only b");
    }

    #[test]
    fn latest_per_chat_empty_store() {
        let store = MemoryStore::new();
        assert!(store.latest_per_chat().unwrap().is_empty());
    }
}
