//! The peer set Node owns (§3, §4.L): keyed by `(address, port)`,
//! bounded to [`crate::net::types::MAX_PEERS`].

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::net::types::MAX_PEERS;
use crate::peer::{Peer, PeerId};

/// The loopback form a peer's self-reported address is rewritten to when
/// it matches our own external address (§3 invariant): a peer must never
/// be re-dialed as itself.
pub const LOOPBACK_ADDRESS: &str = "127.0.0.1";

pub struct PeerSet {
    peers: Mutex<HashMap<PeerId, Peer>>,
    self_address: String,
    self_port: String,
}

impl PeerSet {
    pub fn new(self_address: String, self_port: String) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            self_address,
            self_port,
        }
    }

    /// Adds `peer`, rewriting a self-referential address to loopback
    /// first. Returns `false` (no-op) if the set is already full or the
    /// peer is already known.
    pub async fn add_peer(&self, mut peer: Peer) -> bool {
        if peer.id.address == self.self_address && peer.id.port == self.self_port {
            peer.id.address = LOOPBACK_ADDRESS.to_string();
        }

        let mut peers = self.peers.lock().await;
        if peers.contains_key(&peer.id) {
            return false;
        }
        if peers.len() >= MAX_PEERS {
            return false;
        }
        peers.insert(peer.id.clone(), peer);
        true
    }

    pub async fn get_peer(&self, id: &PeerId) -> Option<Peer> {
        self.peers.lock().await.get(id).cloned()
    }

    /// Overwrites an already-known peer's record (e.g. after a ping or a
    /// touch). No-op if `peer.id` isn't already a member.
    pub async fn update_peer(&self, peer: Peer) -> bool {
        let mut peers = self.peers.lock().await;
        if !peers.contains_key(&peer.id) {
            return false;
        }
        peers.insert(peer.id.clone(), peer);
        true
    }

    pub async fn remove_peer(&self, id: &PeerId) -> bool {
        self.peers.lock().await.remove(id).is_some()
    }

    pub async fn number_of_peers(&self) -> usize {
        self.peers.lock().await.len()
    }

    pub async fn max_peers_reached(&self) -> bool {
        self.number_of_peers().await >= MAX_PEERS
    }

    /// All known peers except `exclude`, for the `ADDRESS` response.
    pub async fn peers_excluding(&self, exclude: &PeerId) -> Vec<Peer> {
        self.peers
            .lock()
            .await
            .values()
            .filter(|p| &p.id != exclude)
            .cloned()
            .collect()
    }

    pub async fn all_peers(&self) -> Vec<Peer> {
        self.peers.lock().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(addr: &str, port: &str) -> Peer {
        Peer::new(PeerId::new(addr, port), "10001".to_string())
    }

    #[tokio::test]
    async fn self_address_is_rewritten_to_loopback() {
        let set = PeerSet::new("1.2.3.4".to_string(), "6969".to_string());
        assert!(set.add_peer(peer("1.2.3.4", "6969")).await);
        let stored = set
            .get_peer(&PeerId::new(LOOPBACK_ADDRESS, "6969"))
            .await;
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn update_peer_overwrites_a_known_record_only() {
        let set = PeerSet::new("0.0.0.0".to_string(), "6969".to_string());
        let id = PeerId::new("10.0.0.1", "6969");
        assert!(!set.update_peer(Peer::new(id.clone(), "10001".to_string())).await);

        set.add_peer(Peer::new(id.clone(), "10001".to_string())).await;
        let mut known = set.get_peer(&id).await.unwrap();
        known.record_ping(42);
        assert!(set.update_peer(known).await);
        assert_eq!(set.get_peer(&id).await.unwrap().last_ping_ms, Some(42));
    }

    #[tokio::test]
    async fn duplicate_peer_is_rejected() {
        let set = PeerSet::new("0.0.0.0".to_string(), "6969".to_string());
        assert!(set.add_peer(peer("10.0.0.1", "6969")).await);
        assert!(!set.add_peer(peer("10.0.0.1", "6969")).await);
        assert_eq!(set.number_of_peers().await, 1);
    }

    #[tokio::test]
    async fn peer_set_never_exceeds_max_peers() {
        let set = PeerSet::new("0.0.0.0".to_string(), "6969".to_string());
        for i in 0..(MAX_PEERS + 5) {
            set.add_peer(peer(&format!("10.0.0.{i}"), "6969")).await;
        }
        assert_eq!(set.number_of_peers().await, MAX_PEERS);
        assert!(set.max_peers_reached().await);
    }

    #[tokio::test]
    async fn peers_excluding_drops_the_requester() {
        let set = PeerSet::new("0.0.0.0".to_string(), "6969".to_string());
        set.add_peer(peer("10.0.0.1", "6969")).await;
        set.add_peer(peer("10.0.0.2", "6969")).await;
        let others = set.peers_excluding(&PeerId::new("10.0.0.1", "6969")).await;
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].id.address, "10.0.0.2");
    }
}
