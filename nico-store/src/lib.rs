//! SQLite-backed [`MessageStore`]. One `messages` table, append-only; chat
//! history and the recent-chats list are plain queries over it.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::debug;

use nico_core::{time_label, ChatSummary, Direction, Message, MessageStore, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_name TEXT NOT NULL,
    sender TEXT NOT NULL,
    body TEXT NOT NULL,
    sent_at_ms INTEGER NOT NULL,
    is_outgoing INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages (chat_name, id);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the message database at the given file path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(open_err)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, for tests and throwaway sessions.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(open_err)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Backend(format!("schema init failed: {e}")))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }
}

fn open_err(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(format!("cannot open database: {e}"))
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let chat_name: String = row.get(0)?;
    let sender: String = row.get(1)?;
    let body: String = row.get(2)?;
    let sent_at_ms: i64 = row.get(3)?;
    let is_outgoing: bool = row.get(4)?;
    let msg = if is_outgoing {
        Message::outgoing(&chat_name, &sender, &body, sent_at_ms)
    } else {
        Message::incoming(&chat_name, &sender, &body, sent_at_ms)
    };
    Ok(msg)
}

impl MessageStore for SqliteStore {
    fn append(&self, msg: &Message) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (chat_name, sender, body, sent_at_ms, is_outgoing)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                msg.chat_name,
                msg.sender,
                msg.body,
                msg.sent_at_ms,
                msg.direction == Direction::Outgoing,
            ],
        )
        .map_err(|e| StoreError::Backend(format!("insert failed: {e}")))?;
        let id = conn.last_insert_rowid();
        debug!("stored message {id} for chat '{}'", msg.chat_name);
        Ok(id)
    }

    fn list_by_chat(&self, chat_name: &str) -> Result<Vec<Message>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT chat_name, sender, body, sent_at_ms, is_outgoing
                 FROM messages WHERE chat_name = ?1 ORDER BY id",
            )
            .map_err(|e| StoreError::Backend(format!("query failed: {e}")))?;
        let rows = stmt
            .query_map(params![chat_name], row_to_message)
            .map_err(|e| StoreError::Backend(format!("query failed: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StoreError::Backend(format!("row read failed: {e}")))
    }

    fn latest_per_chat(&self) -> Result<Vec<ChatSummary>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT chat_name, body, sent_at_ms FROM messages
                 WHERE id IN (SELECT MAX(id) FROM messages GROUP BY chat_name)
                 ORDER BY id DESC",
            )
            .map_err(|e| StoreError::Backend(format!("query failed: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                let chat_name: String = row.get(0)?;
                let last_body: String = row.get(1)?;
                let sent_at_ms: i64 = row.get(2)?;
                Ok(ChatSummary {
                    chat_name,
                    last_body,
                    last_time_label: time_label(sent_at_ms),
                })
            })
            .map_err(|e| StoreError::Backend(format!("query failed: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StoreError::Backend(format!("row read failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_sequential_ids_and_lists_in_order() {
        let store = SqliteStore::in_memory().unwrap();
        let first = store
            .append(&Message::outgoing("general", "me", "one", 10))
            .unwrap();
        let second = store
            .append(&Message::incoming("general", "them", "two", 20))
            .unwrap();
        let other = store
            .append(&Message::incoming("random", "them", "elsewhere", 30))
            .unwrap();
        assert_eq!((first, second, other), (1, 2, 3));

        let general = store.list_by_chat("general").unwrap();
        assert_eq!(general.len(), 2);
        assert_eq!(general[0].body, "one");
        assert_eq!(general[1].body, "two");
        assert!(store.list_by_chat("nowhere").unwrap().is_empty());
    }

    #[test]
    fn direction_survives_the_roundtrip() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .append(&Message::outgoing("general", "me", "sent", 10))
            .unwrap();
        store
            .append(&Message::incoming("general", "them", "got", 20))
            .unwrap();

        let messages = store.list_by_chat("general").unwrap();
        assert_eq!(messages[0].direction, Direction::Outgoing);
        assert_eq!(messages[1].direction, Direction::Incoming);
    }

    #[test]
    fn latest_per_chat_newest_chat_first() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .append(&Message::incoming("alpha", "a", "old alpha", 10))
            .unwrap();
        store
            .append(&Message::incoming("beta", "b", "beta line", 20))
            .unwrap();
        store
            .append(&Message::incoming("alpha", "a", "new alpha", 30))
            .unwrap();

        let summaries = store.latest_per_chat().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].chat_name, "alpha");
        assert_eq!(summaries[0].last_body, "new alpha");
        assert_eq!(summaries[1].chat_name, "beta");
        // HH:MM shape regardless of timezone.
        assert_eq!(summaries[0].last_time_label.len(), 5);
        assert_eq!(&summaries[0].last_time_label[2..3], ":");
    }

    #[test]
    fn latest_per_chat_empty_database() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.latest_per_chat().unwrap().is_empty());
    }
}
