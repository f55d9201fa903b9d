//! Nico LAN chat network layer.
//!
//! [`NetworkManager`] owns the moving parts: a TCP listener for inbound
//! messages, a UDP responder for discovery probes, and the scan that finds
//! peers on the local subnet. Hosts subscribe for [`NetworkEvent`]s and drain
//! them on whatever executor they own.

pub mod config;
pub mod discovery;
pub mod events;
pub mod manager;
pub mod transport;

pub use config::Config;
pub use events::NetworkEvent;
pub use manager::{LogNotifier, NetError, NetworkManager};
pub use transport::ConnectError;
