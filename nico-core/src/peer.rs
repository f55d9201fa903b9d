//! Known-peer table: address to display name, shared across discovery tasks.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// One discovered peer: where to reach it and what it calls itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub addr: SocketAddr,
    pub name: String,
}

/// Table of currently known peers, keyed by address. Later upserts for the
/// same address overwrite the name; `clear` starts a fresh scan. Entries are
/// never expired by age. The lock is never held across I/O.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: Mutex<HashMap<SocketAddr, String>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<SocketAddr, String>> {
        self.peers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or update a peer. Last write wins.
    pub fn upsert(&self, addr: SocketAddr, name: &str) {
        self.peers().insert(addr, name.to_string());
    }

    /// Last-known display name for an address.
    pub fn get(&self, addr: &SocketAddr) -> Option<String> {
        self.peers().get(addr).cloned()
    }

    /// Snapshot of all known peers, in address order.
    pub fn all(&self) -> Vec<PeerRecord> {
        let mut out: Vec<PeerRecord> = self
            .peers()
            .iter()
            .map(|(addr, name)| PeerRecord {
                addr: *addr,
                name: name.clone(),
            })
            .collect();
        out.sort_by_key(|r| r.addr);
        out
    }

    pub fn clear(&self) {
        self.peers().clear();
    }

    pub fn len(&self) -> usize {
        self.peers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    fn addr(last_octet: u8) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, last_octet)), 8888)
    }

    #[test]
    fn upsert_last_write_wins() {
        let dir = PeerDirectory::new();
        dir.upsert(addr(5), "first");
        dir.upsert(addr(5), "second");
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get(&addr(5)).as_deref(), Some("second"));
    }

    #[test]
    fn all_returns_sorted_snapshot() {
        let dir = PeerDirectory::new();
        dir.upsert(addr(9), "nine");
        dir.upsert(addr(2), "two");
        let snapshot = dir.all();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].addr, addr(2));
        assert_eq!(snapshot[1].addr, addr(9));
        // Mutating after the snapshot does not affect it.
        dir.clear();
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn clear_empties_table() {
        let dir = PeerDirectory::new();
        dir.upsert(addr(1), "a");
        dir.clear();
        assert!(dir.is_empty());
        assert_eq!(dir.get(&addr(1)), None);
    }

    #[test]
    fn concurrent_upserts_keep_one_entry_per_address() {
        let dir = Arc::new(PeerDirectory::new());
        let mut handles = Vec::new();
        for i in 0..8u8 {
            let dir = dir.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    dir.upsert(addr(200), &format!("name-{i}"));
                    dir.upsert(addr(i), "stable");
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // .200 was written by every thread but holds exactly one entry,
        // carrying whichever name landed last.
        assert_eq!(dir.len(), 9);
        assert!(dir.get(&addr(200)).unwrap().starts_with("name-"));
    }
}
