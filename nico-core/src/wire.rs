//! Framing: pipe-delimited UTF-8 text, one message frame per line.
//!
//! Message frame: `<chat>|<sender>|<body>|<epochMillis>` plus a trailing
//! newline. `chat` and `sender` can never contain `|`, and the timestamp is
//! the suffix after the last `|`, so the body in between may itself contain
//! `|` characters. Discovery datagrams are `NICO_DISCOVERY` (probe) and
//! `NICO_RESPONSE|<name>` (response).

use crate::message::Message;
use crate::protocol::{DISCOVERY_PROBE, DISCOVERY_RESPONSE};

/// Encode a message into one newline-terminated frame.
/// `chat_name` and `sender` must not contain `|` or a newline; `body` must
/// not contain a newline but may contain `|`.
pub fn encode_message(msg: &Message) -> Result<String, FrameEncodeError> {
    for (field, value) in [("chat_name", &msg.chat_name), ("sender", &msg.sender)] {
        if value.contains('|') || value.contains('\n') {
            return Err(FrameEncodeError::InvalidField(field));
        }
    }
    if msg.body.contains('\n') {
        return Err(FrameEncodeError::InvalidField("body"));
    }
    if msg.sent_at_ms < 0 {
        return Err(FrameEncodeError::InvalidField("sent_at_ms"));
    }
    Ok(format!(
        "{}|{}|{}|{}\n",
        msg.chat_name, msg.sender, msg.body, msg.sent_at_ms
    ))
}

/// Encode a discovery response datagram carrying this device's display name.
pub fn encode_response(name: &str) -> Result<String, FrameEncodeError> {
    if name.contains('|') || name.contains('\n') {
        return Err(FrameEncodeError::InvalidField("name"));
    }
    Ok(format!("{DISCOVERY_RESPONSE}|{name}"))
}

/// Error encoding a frame: a field contains a reserved byte.
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("field `{0}` contains a frame delimiter")]
    InvalidField(&'static str),
}

/// Decode one message frame (with or without its trailing newline).
/// Returns an `Incoming` message; the wire carries no direction.
pub fn decode_message(line: &str) -> Result<Message, FrameDecodeError> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let (chat_name, rest) = line.split_once('|').ok_or(FrameDecodeError::MalformedFrame)?;
    let (sender, rest) = rest.split_once('|').ok_or(FrameDecodeError::MalformedFrame)?;
    // The timestamp is everything after the last separator; the body keeps
    // any separators of its own.
    let (body, ts) = rest.rsplit_once('|').ok_or(FrameDecodeError::MalformedFrame)?;
    let sent_at_ms: i64 = ts.parse().map_err(|_| FrameDecodeError::BadTimestamp)?;
    if sent_at_ms < 0 {
        return Err(FrameDecodeError::BadTimestamp);
    }
    Ok(Message::incoming(chat_name, sender, body, sent_at_ms))
}

/// Decoded discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    Probe,
    Response { name: String },
}

/// Decode a discovery datagram. Trailing and leading whitespace is ignored;
/// hosts with fixed-size receive buffers pad datagrams.
pub fn decode_discovery(datagram: &str) -> Result<Discovery, FrameDecodeError> {
    let text = datagram.trim();
    if text == DISCOVERY_PROBE {
        return Ok(Discovery::Probe);
    }
    if let Some(rest) = text.strip_prefix(DISCOVERY_RESPONSE) {
        let name = rest
            .strip_prefix('|')
            .ok_or(FrameDecodeError::MalformedFrame)?;
        return Ok(Discovery::Response {
            name: name.to_string(),
        });
    }
    Err(FrameDecodeError::MalformedFrame)
}

/// Error decoding a frame or datagram. Always local to that one frame; the
/// caller logs it and drops the input.
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("malformed frame")]
    MalformedFrame,
    #[error("timestamp is not a non-negative integer")]
    BadTimestamp,
}
