//! Orchestrator owning chain, mempool, leader schedule, Snowball store,
//! peer set, and server (§4.L).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::chain::Chain;
use crate::error::NetError;
use crate::freezer::Freezer;
use crate::leader_schedule::LeaderSchedule;
use crate::mempool::Mempool;
use crate::net::connection::PeerConnection;
use crate::net::dispatcher::{dispatch, DispatchContext};
use crate::net::heartbeat;
use crate::net::message::{Message, MessageFlag, MessageType};
use crate::net::peer::PeerSet;
use crate::net::server::DispatchContextOwned;
use crate::peer::PeerId;
use crate::snowball::Snowball;

/// One append to the freezer's peers column per recorded heartbeat
/// (§4.J): the column is a log, not a table, so every ping adds a row
/// rather than overwriting the peer's prior record.
#[derive(Serialize)]
struct PingRecord<'a> {
    address: &'a str,
    port: &'a str,
    round_trip_ms: u64,
    timestamp: u64,
}

pub struct Node {
    pub chain: Arc<Chain>,
    pub mempool: Arc<Mempool>,
    pub leader_schedule: Arc<LeaderSchedule>,
    pub snowball: Arc<Snowball>,
    pub peers: Arc<PeerSet>,
    pub freezer: Arc<Freezer>,
    bootstrapping: Arc<AtomicBool>,
    version: String,
    self_address: String,
    self_port: String,
}

impl Node {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<Chain>,
        mempool: Arc<Mempool>,
        leader_schedule: Arc<LeaderSchedule>,
        snowball: Arc<Snowball>,
        freezer: Arc<Freezer>,
        self_address: String,
        self_port: String,
        version: String,
    ) -> Self {
        let peers = Arc::new(PeerSet::new(self_address.clone(), self_port.clone()));
        Self {
            chain,
            mempool,
            leader_schedule,
            snowball,
            peers,
            freezer,
            bootstrapping: Arc::new(AtomicBool::new(true)),
            version,
            self_address,
            self_port,
        }
    }

    pub fn is_bootstrapping(&self) -> bool {
        self.bootstrapping.load(Ordering::Relaxed)
    }

    /// Leaves the bootstrap phase: subsequent BLOCK responses feed
    /// Snowball instead of importing straight into the chain (§4.J).
    pub fn finish_bootstrapping(&self) {
        self.bootstrapping.store(false, Ordering::Relaxed);
    }

    fn context(&self) -> DispatchContext<'_> {
        DispatchContext {
            chain: &self.chain,
            mempool: &self.mempool,
            leader_schedule: &self.leader_schedule,
            snowball: &self.snowball,
            peers: &self.peers,
            freezer: &self.freezer,
            is_bootstrapping: self.is_bootstrapping(),
            self_version: &self.version,
            self_address: &self.self_address,
            self_port: &self.self_port,
        }
    }

    /// An owned snapshot of this node's dispatch context, for callers
    /// that need to hand it across a spawned task boundary (the server
    /// accept loop, bootstrap's per-peer dials).
    pub fn context_owned(&self) -> DispatchContextOwned {
        DispatchContextOwned {
            chain: Arc::clone(&self.chain),
            mempool: Arc::clone(&self.mempool),
            leader_schedule: Arc::clone(&self.leader_schedule),
            snowball: Arc::clone(&self.snowball),
            peers: Arc::clone(&self.peers),
            freezer: Arc::clone(&self.freezer),
            bootstrapping: Arc::clone(&self.bootstrapping),
            self_version: self.version.clone(),
            self_address: self.self_address.clone(),
            self_port: self.self_port.clone(),
        }
    }

    pub async fn connect(&self, peer: &PeerId) -> Option<PeerConnection> {
        PeerConnection::connect(&peer.address, peer.port_as_u16())
            .await
            .ok()
    }

    /// Issues one message, optionally waits for a reply, dispatches it
    /// through the Request/Response handlers, and retries once on
    /// failure by redialing (§4.L). Heartbeats are special-cased onto
    /// the UDP channel (§6).
    pub async fn send(
        &self,
        peer: &PeerId,
        message_type: MessageType,
        flag: MessageFlag,
        data: Value,
        wait_for_reply: bool,
    ) -> Vec<Message> {
        if flag == MessageFlag::Heartbeat {
            return self.send_heartbeat(peer).await.unwrap_or_default();
        }
        match self.send_once(peer, message_type, flag, data.clone(), wait_for_reply).await {
            Ok(messages) => messages,
            Err(_) => {
                warn!(address = %peer.address, "send failed, retrying once");
                self.send_once(peer, message_type, flag, data, wait_for_reply)
                    .await
                    .unwrap_or_default()
            }
        }
    }

    async fn send_once(
        &self,
        peer: &PeerId,
        message_type: MessageType,
        flag: MessageFlag,
        data: Value,
        wait_for_reply: bool,
    ) -> Result<Vec<Message>, NetError> {
        let mut conn = PeerConnection::connect(&peer.address, peer.port_as_u16()).await?;
        conn.send_data(message_type, flag, data).await?;

        let mut replies = Vec::new();
        if wait_for_reply {
            if let Some(reply) = conn.receive_data().await {
                let ctx = self.context();
                if let Ok(Some(followup)) = dispatch(&ctx, peer, &reply).await {
                    let _ = conn
                        .send_data(followup.message_type, followup.flag, followup.data)
                        .await;
                }
                replies.push(reply);
            }
        }
        Ok(replies)
    }

    /// Pings `peer` over UDP, records the round trip against the live
    /// peer set and the freezer's peers log, and returns the PONG as a
    /// synthetic response message so callers of `send` see a uniform
    /// `Vec<Message>` regardless of transport (§4.J, §6).
    async fn send_heartbeat(&self, peer: &PeerId) -> Result<Vec<Message>, NetError> {
        let round_trip_ms = heartbeat::ping(&peer.address, peer.port_as_u16()).await?;

        if let Some(mut known) = self.peers.get_peer(peer).await {
            known.record_ping(round_trip_ms);
            self.peers.update_peer(known).await;
        }
        let record = PingRecord {
            address: &peer.address,
            port: &peer.port,
            round_trip_ms,
            timestamp: crate::types::now(),
        };
        if let Err(e) = self.freezer.store_peer(&record) {
            warn!(error = %e, address = %peer.address, "failed to persist ping record");
        }

        Ok(vec![Message::new(
            MessageType::Response,
            MessageFlag::Heartbeat,
            serde_json::json!("PONG"),
        )])
    }

    /// Spawns one send task per peer.
    pub async fn broadcast(&self, flag: MessageFlag, data: Value) {
        let peers = self.peers.all_peers().await;
        for peer in peers {
            if flag == MessageFlag::Heartbeat {
                let peer_id = peer.id.clone();
                let peer_set = Arc::clone(&self.peers);
                let freezer = Arc::clone(&self.freezer);
                tokio::spawn(async move {
                    let Ok(round_trip_ms) =
                        heartbeat::ping(&peer_id.address, peer_id.port_as_u16()).await
                    else {
                        return;
                    };
                    if let Some(mut known) = peer_set.get_peer(&peer_id).await {
                        known.record_ping(round_trip_ms);
                        peer_set.update_peer(known).await;
                    }
                    let record = PingRecord {
                        address: &peer_id.address,
                        port: &peer_id.port,
                        round_trip_ms,
                        timestamp: crate::types::now(),
                    };
                    if let Err(e) = freezer.store_peer(&record) {
                        warn!(error = %e, address = %peer_id.address, "failed to persist ping record");
                    }
                });
                continue;
            }
            let data = data.clone();
            let peer_id = peer.id.clone();
            let owned = self.context_owned();
            tokio::spawn(async move {
                if let Ok(mut conn) =
                    PeerConnection::connect(&peer_id.address, peer_id.port_as_u16()).await
                {
                    let _ = conn.send_data(MessageType::Request, flag, data).await;
                    if let Some(reply) = conn.receive_data().await {
                        let ctx = owned.as_context();
                        let _ = dispatch(&ctx, &peer_id, &reply).await;
                    }
                }
            });
        }
    }

    pub async fn add_peer(&self, peer: crate::peer::Peer) -> bool {
        self.peers.add_peer(peer).await
    }

    pub async fn get_peer(&self, id: &PeerId) -> Option<crate::peer::Peer> {
        self.peers.get_peer(id).await
    }

    pub async fn number_of_peers(&self) -> usize {
        self.peers.number_of_peers().await
    }

    pub async fn max_peers_reached(&self) -> bool {
        self.peers.max_peers_reached().await
    }
}
