//! Peer identity and liveness record (§3).
//!
//! Identity is the pair `(address, port)`; peer equality follows that
//! pair alone, not the other attributes, which are free to drift as
//! handshakes and heartbeats update them.

use crate::types::now;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PeerId {
    pub address: String,
    pub port: String,
}

impl PeerId {
    pub fn new(address: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: port.into(),
        }
    }

    /// Parses the port string to dial with, defaulting to
    /// [`crate::net::types::DEFAULT_PORT`] if it isn't a valid `u16`.
    pub fn port_as_u16(&self) -> u16 {
        self.port
            .parse()
            .unwrap_or(crate::net::types::DEFAULT_PORT)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Peer {
    pub id: PeerId,
    pub protocol_version: String,
    pub software_tag: String,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub last_seen: u64,
    pub last_ping_ms: Option<u64>,
    pub ban_score: u32,
}

impl Peer {
    pub fn new(id: PeerId, protocol_version: String) -> Self {
        Self {
            id,
            protocol_version,
            software_tag: String::new(),
            bytes_sent: 0,
            bytes_received: 0,
            last_seen: now(),
            last_ping_ms: None,
            ban_score: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = now();
    }

    pub fn record_ping(&mut self, round_trip_ms: u64) {
        self.last_ping_ms = Some(round_trip_ms);
        self.touch();
    }

    pub fn record_sent(&mut self, bytes: u64) {
        self.bytes_sent += bytes;
    }

    pub fn record_received(&mut self, bytes: u64) {
        self.bytes_received += bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_equality_ignores_other_fields() {
        let id = PeerId::new("10.0.0.1", "6969");
        let mut a = Peer::new(id.clone(), "10001".to_string());
        let b = Peer::new(id, "10002".to_string());
        a.record_ping(5);
        assert_eq!(a.id, b.id);
    }
}
