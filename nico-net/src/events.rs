//! Events pushed from the network tasks to the host.
//!
//! One subscriber at a time: the host calls [`EventDispatcher::subscribe`] and
//! drains the returned receiver on its own executor. Subscribing again
//! replaces the previous subscription and ends that receiver's stream. With no
//! subscriber registered, events are dropped rather than queued.

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::debug;

/// What the network layer reports upward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// An inbound message was decoded and persisted.
    MessageReceived {
        chat_name: String,
        sender: String,
        body: String,
    },
    /// A peer answered a discovery probe.
    DeviceDiscovered { addr: SocketAddr, name: String },
    /// Outbound connectivity changed; currently only failures are reported.
    ConnectionStatus { connected: bool },
}

/// Single-slot event channel.
#[derive(Debug, Default)]
pub struct EventDispatcher {
    slot: Mutex<Option<mpsc::UnboundedSender<NetworkEvent>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<NetworkEvent>>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register the current subscriber, replacing any previous one. The old
    /// receiver's stream ends once its sender is dropped here.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<NetworkEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.slot() = Some(tx);
        rx
    }

    /// Deliver an event to the current subscriber, if any. A receiver that
    /// has gone away clears the slot.
    pub fn emit(&self, event: NetworkEvent) {
        let mut slot = self.slot();
        match slot.take() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    debug!("event subscriber went away, clearing slot");
                } else {
                    *slot = Some(tx);
                }
            }
            None => debug!(?event, "no event subscriber, dropping"),
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.slot().is_some()
    }
}
