//! Connects to known peers and seeds, fanning out VERSION/ADDRESS until
//! the peer set is saturated (§4.M).

use std::time::Duration;

use serde_json::json;
use tracing::warn;

use crate::error::BootstrapError;
use crate::net::connection::PeerConnection;
use crate::net::dispatcher::dispatch;
use crate::net::message::{MessageFlag, MessageType};
use crate::net::peer::PeerSet;
use crate::net::server::DispatchContextOwned;
use crate::net::types::VersionPayload;
use crate::peer::PeerId;

pub const TIMEOUT_SECS: u64 = 5;
const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Where a candidate peer came from, for logging/diagnostics only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerSource {
    Known,
    Seed,
}

/// `from_peers` then `from_seeds` if still under max_peers, per §4.M.
///
/// Every dial here runs its reply through [`dispatch`], exactly like
/// [`crate::node::Node::send_once`] — a VERSION reply adds the remote to
/// our own peer set, and an ADDRESS reply fans out VERSION dials to
/// newly learned peers (the dispatcher's `handle_response` does the
/// fan-out once the reply reaches it).
pub async fn bootstrap(
    ctx: &DispatchContextOwned,
    known: &[PeerId],
    seeds: &[PeerId],
) -> Result<(), BootstrapError> {
    from_peers(ctx, known).await;
    if ctx.peers.max_peers_reached().await {
        return Ok(());
    }
    if !known.is_empty() || !seeds.is_empty() {
        from_seeds(ctx, seeds).await;
    }
    if ctx.peers.number_of_peers().await == 0 {
        return Err(BootstrapError::NoReachablePeers);
    }
    Ok(())
}

async fn from_peers(ctx: &DispatchContextOwned, known: &[PeerId]) {
    broadcast_version(ctx, known).await;
    wait_until_saturated_or_timeout(&ctx.peers).await;
}

async fn from_seeds(ctx: &DispatchContextOwned, seeds: &[PeerId]) {
    broadcast_version(ctx, seeds).await;
    wait_until_saturated_or_timeout(&ctx.peers).await;
    if !ctx.peers.max_peers_reached().await && !seeds.is_empty() {
        broadcast_address(ctx, seeds).await;
        wait_until_saturated_or_timeout(&ctx.peers).await;
    }
}

/// Dials each target with VERSION and dispatches whatever comes back,
/// so a successful handshake adds the remote to our own peer set via
/// the RESPONSE path (§4.J) instead of only the far end learning about
/// us through its own inbound handler.
async fn broadcast_version(ctx: &DispatchContextOwned, targets: &[PeerId]) {
    for target in targets {
        let target = target.clone();
        let owned = ctx.clone();
        tokio::spawn(async move {
            let Ok(mut conn) = PeerConnection::connect(&target.address, target.port_as_u16())
                .await
            else {
                warn!(address = %target.address, "bootstrap VERSION dial failed");
                return;
            };
            let sent = conn
                .send_data(
                    MessageType::Request,
                    MessageFlag::Version,
                    json!(VersionPayload {
                        address: owned.self_address.clone(),
                        port: owned.self_port.clone(),
                        version: owned.self_version.clone(),
                    }),
                )
                .await;
            if sent.is_err() {
                return;
            }
            if let Some(reply) = conn.receive_data().await {
                let dispatch_ctx = owned.as_context();
                let _ = dispatch(&dispatch_ctx, &target, &reply).await;
            }
        });
    }
}

/// Dials each target with ADDRESS and dispatches the reply — the
/// dispatcher's `handle_response` fans out VERSION dials to any peer
/// in the returned list we don't already know (§4.J).
async fn broadcast_address(ctx: &DispatchContextOwned, targets: &[PeerId]) {
    for target in targets {
        let target = target.clone();
        let owned = ctx.clone();
        tokio::spawn(async move {
            let Ok(mut conn) = PeerConnection::connect(&target.address, target.port_as_u16())
                .await
            else {
                return;
            };
            if conn
                .send_data(MessageType::Request, MessageFlag::Address, json!({}))
                .await
                .is_err()
            {
                return;
            }
            if let Some(reply) = conn.receive_data().await {
                let dispatch_ctx = owned.as_context();
                let _ = dispatch(&dispatch_ctx, &target, &reply).await;
            }
        });
    }
}

async fn wait_until_saturated_or_timeout(peers: &PeerSet) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(TIMEOUT_SECS);
    while tokio::time::Instant::now() < deadline {
        if peers.max_peers_reached().await {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Chain, GenesisParams};
    use crate::freezer::Freezer;
    use crate::leader_schedule::LeaderSchedule;
    use crate::mempool::Mempool;
    use crate::snowball::Snowball;
    use crate::vm::MemoryVm;
    use alloy_primitives::address;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn test_context() -> (DispatchContextOwned, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let freezer = Arc::new(Freezer::open(dir.path()));
        let vm = Arc::new(MemoryVm::new(1, HashMap::new()));
        let chain = Arc::new(
            Chain::genesis(
                Arc::clone(&freezer),
                vm,
                GenesisParams {
                    timestamp: 1,
                    coinbase: address!("0000000000000000000000000000000000000001"),
                    slot_size: 10,
                    epoch_size: 10,
                    extra_data: vec![],
                },
            )
            .unwrap(),
        );
        let ctx = DispatchContextOwned {
            chain,
            mempool: Arc::new(Mempool::new(300)),
            leader_schedule: Arc::new(LeaderSchedule::new()),
            snowball: Arc::new(Snowball::new()),
            peers: Arc::new(PeerSet::new("0.0.0.0".to_string(), "6969".to_string())),
            freezer,
            bootstrapping: Arc::new(AtomicBool::new(true)),
            self_version: "10001".to_string(),
            self_address: "0.0.0.0".to_string(),
            self_port: "6969".to_string(),
        };
        (ctx, dir)
    }

    #[tokio::test]
    async fn bootstrap_with_no_peers_and_no_seeds_errors() {
        let (ctx, _dir) = test_context().await;
        let result = bootstrap(&ctx, &[], &[]).await;
        assert!(matches!(result, Err(BootstrapError::NoReachablePeers)));
    }

    #[tokio::test]
    async fn bootstrap_adds_the_seed_to_our_own_peer_set() {
        let (seed_ctx, _seed_dir) = test_context().await;
        let seed_peers = Arc::clone(&seed_ctx.peers);
        let seed_server = crate::net::server::Server::bind(0).await.unwrap();
        let seed_port = seed_server.local_port().unwrap();
        let seed_shutdown = seed_server.shutdown_handle();
        let seed_ctx_for_run = seed_ctx.clone();
        let seed_task = tokio::spawn(async move {
            seed_server.run(move || seed_ctx_for_run.clone()).await;
        });

        let (dialer_ctx, _dialer_dir) = test_context().await;
        let seed = PeerId::new("127.0.0.1", seed_port.to_string());
        bootstrap(&dialer_ctx, &[], &[seed]).await.unwrap();

        assert_eq!(dialer_ctx.peers.number_of_peers().await, 1);
        assert_eq!(seed_peers.number_of_peers().await, 1);

        seed_shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
        let _ = tokio::time::timeout(Duration::from_secs(3), seed_task).await;
    }
}
