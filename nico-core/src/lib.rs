//! Nico LAN chat protocol core.
//! Pure codec and model, no sockets; the async network layer lives in nico-net.

pub mod message;
pub mod peer;
pub mod protocol;
pub mod store;
pub mod wire;

pub use message::{now_ms, time_label, ChatSummary, Direction, Message};
pub use peer::{PeerDirectory, PeerRecord};
pub use protocol::{default_device_name, DEFAULT_DISCOVERY_PORT, DEFAULT_MESSAGE_PORT};
pub use store::{MemoryStore, MessageStore, NotificationSink, StoreError};
pub use wire::{
    decode_discovery, decode_message, encode_message, encode_response, Discovery,
    FrameDecodeError, FrameEncodeError,
};

// C ABI for embedding from the Android (NDK) host.
pub mod ffi;
