//! Routes each inbound flag to a handler and updates local state (§4.J).
//!
//! Schema failures are silently dropped: a malformed payload produces
//! `Ok(None)`, never an error that would close the connection.

use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use num_bigint::BigUint;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::chain::Chain;
use crate::error::DispatchError;
use crate::freezer::Freezer;
use crate::header::Header;
use crate::leader_schedule::{Leader, LeaderSchedule};
use crate::mempool::Mempool;
use crate::net::connection::PeerConnection;
use crate::net::message::{Message, MessageFlag, MessageType};
use crate::net::peer::PeerSet;
use crate::net::types::{
    AddressEntry, AddressResponsePayload, BlockRequestPayload, BlockResponsePayload,
    CampaignPayload, HeaderDict, QueryRequestPayload, QueryResponsePayload, TransactionPayload,
    VersionPayload,
};
use crate::peer::{Peer, PeerId};
use crate::snowball::Snowball;
use crate::transaction::{SignedTransaction, TxSignature};
use crate::vrf;

/// Everything a handler may touch. Borrowed, never owned — `Node` holds
/// the real values and builds one of these per dispatch call.
pub struct DispatchContext<'a> {
    pub chain: &'a Chain,
    pub mempool: &'a Mempool,
    pub leader_schedule: &'a LeaderSchedule,
    pub snowball: &'a Snowball,
    pub peers: &'a PeerSet,
    pub freezer: &'a Freezer,
    /// Whether the node is still in its initial bootstrap phase: BLOCK
    /// responses import straight into the chain while this holds, and
    /// feed Snowball once steady state is reached (§4.J).
    pub is_bootstrapping: bool,
    pub self_version: &'a str,
    pub self_address: &'a str,
    pub self_port: &'a str,
}

fn parse_payload<T: DeserializeOwned>(data: &Value) -> Option<T> {
    serde_json::from_value(data.clone()).ok()
}

fn hex_to_b256(s: &str) -> Option<B256> {
    let bytes = hex::decode(s.trim_start_matches("0x")).ok()?;
    if bytes.len() != 32 {
        return None;
    }
    Some(B256::from_slice(&bytes))
}

fn hex_to_address(s: &str) -> Option<Address> {
    let bytes = hex::decode(s.trim_start_matches("0x")).ok()?;
    if bytes.len() != 20 {
        return None;
    }
    Some(Address::from_slice(&bytes))
}

fn header_to_dict(header: &Header) -> HeaderDict {
    HeaderDict {
        parent_hash: hex::encode(header.parent_hash),
        coinbase: hex::encode(header.coinbase),
        state_root: hex::encode(header.state_root),
        transaction_root: hex::encode(header.transaction_root),
        receipt_root: hex::encode(header.receipt_root),
        bloom: hex::encode(header.bloom.as_slice()),
        block_number: header.block_number,
        gas_used: header.gas_used,
        timestamp: header.timestamp,
        extra_data: hex::encode(&header.extra_data),
        epoch: header.epoch,
        slot: header.slot,
        epoch_block_number: header.epoch_block_number,
        slot_size: header.slot_size,
        epoch_size: header.epoch_size,
    }
}

/// Entry point: dispatch a decoded [`Message`] from `requester`, returning
/// a reply for `REQUEST`s that warrant one.
pub async fn dispatch(
    ctx: &DispatchContext<'_>,
    requester: &PeerId,
    message: &Message,
) -> Result<Option<Message>, DispatchError> {
    match message.message_type {
        MessageType::Request => handle_request(ctx, requester, message).await,
        MessageType::Response => {
            handle_response(ctx, requester, message).await?;
            Ok(None)
        }
    }
}

async fn handle_request(
    ctx: &DispatchContext<'_>,
    requester: &PeerId,
    message: &Message,
) -> Result<Option<Message>, DispatchError> {
    let reply = match message.flag {
        MessageFlag::Heartbeat => Some(Message::new(
            MessageType::Response,
            MessageFlag::Heartbeat,
            json!("PONG"),
        )),

        MessageFlag::Version => {
            let Some(payload) = parse_payload::<VersionPayload>(&message.data) else {
                return Ok(None);
            };
            let peer = Peer::new(
                PeerId::new(payload.address, payload.port),
                payload.version,
            );
            if ctx.peers.add_peer(peer).await {
                Some(Message::new(
                    MessageType::Response,
                    MessageFlag::Version,
                    json!(VersionPayload {
                        address: ctx.self_address.to_string(),
                        port: ctx.self_port.to_string(),
                        version: ctx.self_version.to_string(),
                    }),
                ))
            } else {
                None
            }
        }

        MessageFlag::Transaction => {
            let Some(payload) = parse_payload::<TransactionPayload>(&message.data) else {
                return Ok(None);
            };
            let (Some(recipient), Some(r), Some(s)) = (
                hex_to_address(&payload.to),
                hex_to_b256(&payload.r),
                hex_to_b256(&payload.s),
            ) else {
                return Ok(None);
            };
            let tx = SignedTransaction::new(
                payload.nonce,
                payload.gas_price,
                payload.gas,
                recipient,
                U256::from_str(&payload.value).unwrap_or_default(),
                Bytes::from(hex::decode(payload.data.trim_start_matches("0x")).unwrap_or_default()),
                TxSignature {
                    v: payload.v,
                    r: U256::from_be_bytes::<32>(r.0),
                    s: U256::from_be_bytes::<32>(s.0),
                },
            );
            ctx.mempool.add(tx).await;
            None
        }

        MessageFlag::Address => {
            let others = ctx.peers.peers_excluding(requester).await;
            let entries: Vec<AddressEntry> = others
                .into_iter()
                .map(|p| AddressEntry {
                    address: p.id.address,
                    port: p.id.port,
                })
                .collect();
            Some(Message::new(
                MessageType::Response,
                MessageFlag::Address,
                json!(AddressResponsePayload { peers: entries }),
            ))
        }

        MessageFlag::Block => {
            let Some(payload) = parse_payload::<BlockRequestPayload>(&message.data) else {
                return Ok(None);
            };
            let head = ctx.chain.get_canonical_head().await;
            if head.block_number <= payload.best_block {
                return Ok(None);
            }
            let mut blocks = Vec::new();
            for n in (payload.best_block + 1)..=head.block_number {
                if let Ok(block) = ctx.chain.get_canonical_block_by_number(n) {
                    blocks.push(header_to_dict(&block.header));
                }
            }
            Some(Message::new(
                MessageType::Response,
                MessageFlag::Block,
                json!(BlockResponsePayload { blocks }),
            ))
        }

        MessageFlag::Campaign => {
            let Some(CampaignPayload(entries)) = parse_payload::<CampaignPayload>(&message.data)
            else {
                return Ok(None);
            };
            for (block_number_str, entry) in entries {
                let (Ok(block_number), Some(address), Ok(campaign)) = (
                    block_number_str.parse::<u64>(),
                    hex_to_address(&entry.address),
                    BigUint::from_str(&entry.campaign),
                ) else {
                    continue;
                };
                if vrf::verify(block_number, address, &campaign) {
                    ctx.leader_schedule
                        .add_leader(block_number, Leader::new(address, 0, campaign))
                        .await;
                }
            }
            None
        }

        MessageFlag::Query => {
            let Some(payload) = parse_payload::<QueryRequestPayload>(&message.data) else {
                return Ok(None);
            };
            let decision = ctx
                .snowball
                .get_decision_by_block_number(payload.block_number)
                .await;
            match decision {
                Some(d) if d.chit => Some(Message::new(
                    MessageType::Response,
                    MessageFlag::Query,
                    json!(QueryResponsePayload {
                        block_hash: hex::encode(d.header.hash()),
                    }),
                )),
                _ => None,
            }
        }
    };
    Ok(reply)
}

async fn handle_response(
    ctx: &DispatchContext<'_>,
    _requester: &PeerId,
    message: &Message,
) -> Result<(), DispatchError> {
    match message.flag {
        MessageFlag::Version => {
            let Some(payload) = parse_payload::<VersionPayload>(&message.data) else {
                return Ok(());
            };
            let peer = Peer::new(PeerId::new(payload.address, payload.port), payload.version);
            ctx.peers.add_peer(peer).await;
        }

        MessageFlag::Block => {
            let Some(payload) = parse_payload::<BlockResponsePayload>(&message.data) else {
                return Ok(());
            };
            for dict in payload.blocks {
                let Some(header) = dict_to_header(&dict) else {
                    continue;
                };
                if ctx.is_bootstrapping {
                    let block = crate::block::Block::new(header, vec![]);
                    ctx.chain.import_block(block).await?;
                } else {
                    ctx.snowball.add_block(header).await;
                }
            }
        }

        // Newly learned peers get dialed with VERSION right here, on the
        // same borrowed context the reply arrived on — matching §4.J's
        // "address response fans out VERSION requests to newly learned
        // peers".
        MessageFlag::Address => {
            let Some(payload) = parse_payload::<AddressResponsePayload>(&message.data) else {
                return Ok(());
            };
            for entry in payload.peers {
                let candidate = PeerId::new(entry.address, entry.port);
                if ctx.peers.get_peer(&candidate).await.is_some() {
                    continue;
                }
                if ctx.peers.max_peers_reached().await {
                    break;
                }
                dial_version(ctx, &candidate).await;
            }
        }

        // Real heartbeat traffic never reaches here: it rides the UDP
        // channel in `net::heartbeat`, whose round trip is timed by
        // `Node::send_heartbeat`, the caller that actually has the
        // timer. This branch only fires if a heartbeat somehow arrives
        // over TCP, and there is nothing to time at this point.
        MessageFlag::Heartbeat => {}

        _ => {}
    }
    Ok(())
}

/// Dials `target` with VERSION and, on a VERSION reply, adds it to our
/// own peer set directly — a non-recursive sibling of [`dispatch`] so
/// the ADDRESS-response fan-out above can't grow into an unbounded
/// `dispatch`-calls-`dispatch` chain.
async fn dial_version(ctx: &DispatchContext<'_>, target: &PeerId) {
    let Ok(mut conn) = PeerConnection::connect(&target.address, target.port_as_u16()).await else {
        return;
    };
    let payload = VersionPayload {
        address: ctx.self_address.to_string(),
        port: ctx.self_port.to_string(),
        version: ctx.self_version.to_string(),
    };
    if conn
        .send_data(MessageType::Request, MessageFlag::Version, json!(payload))
        .await
        .is_err()
    {
        return;
    }
    if let Some(reply) = conn.receive_data().await {
        if let Some(reply_payload) = parse_payload::<VersionPayload>(&reply.data) {
            let peer = Peer::new(
                PeerId::new(reply_payload.address, reply_payload.port),
                reply_payload.version,
            );
            ctx.peers.add_peer(peer).await;
        }
    }
}

fn dict_to_header(dict: &HeaderDict) -> Option<Header> {
    Some(Header::new(
        hex_to_b256(&dict.parent_hash)?,
        hex_to_address(&dict.coinbase)?,
        hex_to_b256(&dict.state_root)?,
        hex_to_b256(&dict.transaction_root)?,
        hex_to_b256(&dict.receipt_root)?,
        alloy_primitives::Bloom::from_slice(&hex::decode(&dict.bloom).ok()?),
        dict.block_number,
        dict.gas_used,
        dict.timestamp,
        hex::decode(&dict.extra_data).ok()?,
        dict.epoch,
        dict.slot,
        dict.epoch_block_number,
        dict.slot_size,
        dict.epoch_size,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::GenesisParams;
    use crate::freezer::Freezer;
    use crate::vm::MemoryVm;
    use alloy_primitives::address;
    use std::collections::HashMap as StdHashMap;
    use tempfile::tempdir;

    async fn test_context() -> (
        Chain,
        Mempool,
        LeaderSchedule,
        Snowball,
        PeerSet,
        Freezer,
        tempfile::TempDir,
    ) {
        let dir = tempdir().unwrap();
        let freezer = Arc::new(Freezer::open(dir.path()));
        let vm = Arc::new(MemoryVm::new(1, StdHashMap::new()));
        let chain = Chain::genesis(
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
        .unwrap();
        (
            chain,
            Mempool::new(300),
            LeaderSchedule::new(),
            Snowball::new(),
            PeerSet::new("0.0.0.0".to_string(), "6969".to_string()),
            Freezer::open(dir.path()),
            dir,
        )
    }

    #[tokio::test]
    async fn heartbeat_request_gets_pong() {
        let (chain, mempool, leader_schedule, snowball, peers, freezer, _dir) =
            test_context().await;
        let ctx = DispatchContext {
            chain: &chain,
            mempool: &mempool,
            leader_schedule: &leader_schedule,
            snowball: &snowball,
            peers: &peers,
            freezer: &freezer,
            is_bootstrapping: true,
            self_version: "10001",
            self_address: "0.0.0.0",
            self_port: "6969",
        };
        let requester = PeerId::new("10.0.0.1", "6969");
        let message = Message::new(MessageType::Request, MessageFlag::Heartbeat, json!("PING"));
        let reply = dispatch(&ctx, &requester, &message).await.unwrap().unwrap();
        assert_eq!(reply.data, json!("PONG"));
    }

    #[tokio::test]
    async fn version_request_adds_peer_and_replies() {
        let (chain, mempool, leader_schedule, snowball, peers, freezer, _dir) =
            test_context().await;
        let ctx = DispatchContext {
            chain: &chain,
            mempool: &mempool,
            leader_schedule: &leader_schedule,
            snowball: &snowball,
            peers: &peers,
            freezer: &freezer,
            is_bootstrapping: true,
            self_version: "10001",
            self_address: "0.0.0.0",
            self_port: "6969",
        };
        let requester = PeerId::new("10.0.0.1", "6969");
        let message = Message::new(
            MessageType::Request,
            MessageFlag::Version,
            json!({"address": "10.0.0.1", "port": "6969", "version": "10001"}),
        );
        let reply = dispatch(&ctx, &requester, &message).await.unwrap();
        assert!(reply.is_some());
        assert_eq!(peers.number_of_peers().await, 1);
    }

    #[tokio::test]
    async fn malformed_version_payload_is_dropped() {
        let (chain, mempool, leader_schedule, snowball, peers, freezer, _dir) =
            test_context().await;
        let ctx = DispatchContext {
            chain: &chain,
            mempool: &mempool,
            leader_schedule: &leader_schedule,
            snowball: &snowball,
            peers: &peers,
            freezer: &freezer,
            is_bootstrapping: true,
            self_version: "10001",
            self_address: "0.0.0.0",
            self_port: "6969",
        };
        let requester = PeerId::new("10.0.0.1", "6969");
        let message = Message::new(MessageType::Request, MessageFlag::Version, json!({}));
        let reply = dispatch(&ctx, &requester, &message).await.unwrap();
        assert!(reply.is_none());
        assert_eq!(peers.number_of_peers().await, 0);
    }

    #[tokio::test]
    async fn address_request_excludes_requester() {
        let (chain, mempool, leader_schedule, snowball, peers, freezer, _dir) =
            test_context().await;
        peers
            .add_peer(Peer::new(PeerId::new("10.0.0.1", "6969"), "v".into()))
            .await;
        peers
            .add_peer(Peer::new(PeerId::new("10.0.0.2", "6969"), "v".into()))
            .await;
        let ctx = DispatchContext {
            chain: &chain,
            mempool: &mempool,
            leader_schedule: &leader_schedule,
            snowball: &snowball,
            peers: &peers,
            freezer: &freezer,
            is_bootstrapping: true,
            self_version: "10001",
            self_address: "0.0.0.0",
            self_port: "6969",
        };
        let requester = PeerId::new("10.0.0.1", "6969");
        let message = Message::new(MessageType::Request, MessageFlag::Address, json!({}));
        let reply = dispatch(&ctx, &requester, &message).await.unwrap().unwrap();
        let payload: AddressResponsePayload = serde_json::from_value(reply.data).unwrap();
        assert_eq!(payload.peers.len(), 1);
    }

    #[tokio::test]
    async fn block_response_imports_directly_while_bootstrapping() {
        let (chain, mempool, leader_schedule, snowball, peers, freezer, _dir) =
            test_context().await;
        let ctx = DispatchContext {
            chain: &chain,
            mempool: &mempool,
            leader_schedule: &leader_schedule,
            snowball: &snowball,
            peers: &peers,
            freezer: &freezer,
            is_bootstrapping: true,
            self_version: "10001",
            self_address: "0.0.0.0",
            self_port: "6969",
        };
        // Forge the candidate on a twin chain (same genesis) so its
        // roots are actually valid against `chain`'s empty-block rules.
        let twin_dir = tempdir().unwrap();
        let twin_freezer = Arc::new(Freezer::open(twin_dir.path()));
        let twin_vm = Arc::new(MemoryVm::new(1, StdHashMap::new()));
        let twin_chain = Chain::genesis(
            twin_freezer,
            twin_vm,
            GenesisParams {
                timestamp: 1,
                coinbase: address!("0000000000000000000000000000000000000001"),
                slot_size: 10,
                epoch_size: 10,
                extra_data: vec![],
            },
        )
        .unwrap();
        let forged = twin_chain.forge_block(vec![]).await.unwrap();
        let header = forged.header.clone();

        let requester = PeerId::new("10.0.0.1", "6969");
        let message = Message::new(
            MessageType::Response,
            MessageFlag::Block,
            json!(BlockResponsePayload {
                blocks: vec![header_to_dict(&header)],
            }),
        );
        dispatch(&ctx, &requester, &message).await.unwrap();
        assert_eq!(chain.get_canonical_head().await.block_number, header.block_number);
    }

    #[tokio::test]
    async fn block_response_feeds_snowball_once_steady_state() {
        let (chain, mempool, leader_schedule, snowball, peers, freezer, _dir) =
            test_context().await;
        let ctx = DispatchContext {
            chain: &chain,
            mempool: &mempool,
            leader_schedule: &leader_schedule,
            snowball: &snowball,
            peers: &peers,
            freezer: &freezer,
            is_bootstrapping: false,
            self_version: "10001",
            self_address: "0.0.0.0",
            self_port: "6969",
        };
        let parent = chain.get_canonical_head().await;
        let header = Header::new(
            parent.hash(),
            address!("0000000000000000000000000000000000000002"),
            parent.state_root,
            B256::ZERO,
            B256::ZERO,
            alloy_primitives::Bloom::ZERO,
            parent.block_number + 1,
            0,
            Some(parent.timestamp.unwrap_or(1) + 1),
            vec![],
            parent.epoch,
            parent.slot + 1,
            parent.epoch_block_number + 1,
            parent.slot_size,
            parent.epoch_size,
        );
        let requester = PeerId::new("10.0.0.1", "6969");
        let message = Message::new(
            MessageType::Response,
            MessageFlag::Block,
            json!(BlockResponsePayload {
                blocks: vec![header_to_dict(&header)],
            }),
        );
        dispatch(&ctx, &requester, &message).await.unwrap();
        assert_eq!(chain.get_canonical_head().await.block_number, parent.block_number);
        assert!(snowball
            .get_decision_by_block_number(header.block_number)
            .await
            .is_some());
    }
}
