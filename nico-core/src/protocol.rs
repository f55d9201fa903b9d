//! Nico wire protocol: discovery tokens, well-known ports, device naming.

use std::net::IpAddr;

/// TCP port the message transport listens on.
pub const DEFAULT_MESSAGE_PORT: u16 = 8888;

/// UDP port the discovery responder listens on. Distinct from the message
/// port so a probe can never be mistaken for a message connection.
pub const DEFAULT_DISCOVERY_PORT: u16 = 8889;

/// Discovery probe datagram: the bare token, nothing else.
pub const DISCOVERY_PROBE: &str = "NICO_DISCOVERY";

/// Discovery response datagram: this prefix, then `|`, then the display name.
pub const DISCOVERY_RESPONSE: &str = "NICO_RESPONSE";

/// Display name a device advertises when none is configured: `Nico-` plus
/// the local address with separators stripped (`192.168.1.7` -> `Nico-19216817`).
pub fn default_device_name(ip: IpAddr) -> String {
    let compact: String = ip
        .to_string()
        .chars()
        .filter(|c| *c != '.' && *c != ':')
        .collect();
    format!("Nico-{compact}")
}
