//! Load config from file and environment.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use nico_core::{DEFAULT_DISCOVERY_PORT, DEFAULT_MESSAGE_PORT};

/// Network configuration. File: ~/.config/nico/config.toml or
/// /etc/nico/config.toml. Env overrides: NICO_MESSAGE_PORT,
/// NICO_DISCOVERY_PORT, NICO_DEVICE_NAME, NICO_LOCAL_IP.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Message TCP port (default 8888).
    #[serde(default = "default_message_port")]
    pub message_port: u16,
    /// Discovery UDP port (default 8889).
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Display name advertised in discovery responses. Derived from the
    /// local IP when unset.
    #[serde(default)]
    pub device_name: Option<String>,
    /// Local address override; auto-detected when unset.
    #[serde(default)]
    pub local_ip: Option<IpAddr>,
    /// Outbound connect timeout in milliseconds (default 3000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Per-candidate probe wait during a directed sweep, in milliseconds
    /// (default 1000).
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_message_port() -> u16 {
    DEFAULT_MESSAGE_PORT
}
fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}
fn default_connect_timeout_ms() -> u64 {
    3000
}
fn default_probe_timeout_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            message_port: default_message_port(),
            discovery_port: default_discovery_port(),
            device_name: None,
            local_ip: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Config {
    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub(crate) fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_else(Config::default);
    if let Ok(s) = std::env::var("NICO_MESSAGE_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.message_port = p;
        }
    }
    if let Ok(s) = std::env::var("NICO_DISCOVERY_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.discovery_port = p;
        }
    }
    if let Ok(s) = std::env::var("NICO_DEVICE_NAME") {
        if !s.is_empty() {
            c.device_name = Some(s);
        }
    }
    if let Ok(s) = std::env::var("NICO_LOCAL_IP") {
        if let Ok(ip) = s.parse::<IpAddr>() {
            c.local_ip = Some(ip);
        }
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/nico/config.toml"));
    }
    out.push(PathBuf::from("/etc/nico/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                if let Ok(c) = toml::from_str::<Config>(&s) {
                    return Some(c);
                }
            }
            break;
        }
    }
    None
}
