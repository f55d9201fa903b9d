//! Chat message model shared by the wire codec, the store, and the host UI.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

/// Whether a message left this device or arrived from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// One chat message. `sent_at_ms` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub chat_name: String,
    pub sender: String,
    pub body: String,
    pub sent_at_ms: i64,
    pub direction: Direction,
}

impl Message {
    pub fn outgoing(chat_name: &str, sender: &str, body: &str, sent_at_ms: i64) -> Self {
        Self {
            chat_name: chat_name.to_string(),
            sender: sender.to_string(),
            body: body.to_string(),
            sent_at_ms,
            direction: Direction::Outgoing,
        }
    }

    pub fn incoming(chat_name: &str, sender: &str, body: &str, sent_at_ms: i64) -> Self {
        Self {
            chat_name: chat_name.to_string(),
            sender: sender.to_string(),
            body: body.to_string(),
            sent_at_ms,
            direction: Direction::Incoming,
        }
    }
}

/// Newest message of one chat, for a recent-chats list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub chat_name: String,
    pub last_body: String,
    pub last_time_label: String,
}

/// Current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// `HH:MM` local-time label for a message timestamp. Out-of-range
/// timestamps yield an empty label rather than an error.
pub fn time_label(sent_at_ms: i64) -> String {
    Local
        .timestamp_millis_opt(sent_at_ms)
        .earliest()
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_recent() {
        // 2020-01-01 as a floor; catches unit mixups (seconds vs millis).
        assert!(now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn time_label_shape() {
        let label = time_label(1_700_000_000_000);
        assert_eq!(label.len(), 5);
        assert_eq!(&label[2..3], ":");
    }

    #[test]
    fn time_label_out_of_range_is_empty() {
        assert_eq!(time_label(i64::MAX), "");
    }

    #[test]
    fn constructors_set_direction() {
        let out = Message::outgoing("general", "alice", "hi", 1);
        let inc = Message::incoming("general", "alice", "hi", 1);
        assert_eq!(out.direction, Direction::Outgoing);
        assert_eq!(inc.direction, Direction::Incoming);
    }
}
