//! Known peer addresses.
//!
//! An ordered list of `host:port` strings behind a read-write lock. The
//! seed peer sits first. Addresses found unreachable are removed for the
//! process lifetime and only return through gossip.

use std::sync::RwLock;

#[derive(Debug)]
pub struct PeerSet {
    peers: RwLock<Vec<String>>,
}

impl PeerSet {
    /// Start with the configured seed peer as the only entry.
    pub fn new(seed: String) -> Self {
        Self {
            peers: RwLock::new(vec![seed]),
        }
    }

    /// The first known peer, normally the seed.
    pub fn seed(&self) -> Option<String> {
        self.peers.read().unwrap().first().cloned()
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.peers.read().unwrap().iter().any(|peer| peer == addr)
    }

    /// Add an address if unknown. Returns true when it was new.
    pub fn add(&self, addr: String) -> bool {
        let mut peers = self.peers.write().unwrap();
        if peers.iter().any(|peer| *peer == addr) {
            return false;
        }
        peers.push(addr);
        true
    }

    /// Drop an unreachable address.
    pub fn remove(&self, addr: &str) {
        self.peers.write().unwrap().retain(|peer| peer != addr);
    }

    pub fn all(&self) -> Vec<String> {
        self.peers.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().unwrap().is_empty()
    }

    /// Every known peer except ourselves; the fan-out set for broadcasts.
    pub fn broadcast_targets(&self, self_addr: &str) -> Vec<String> {
        self.peers
            .read()
            .unwrap()
            .iter()
            .filter(|peer| *peer != self_addr)
            .cloned()
            .collect()
    }
}
