//! Wire-level constants and per-(type, flag) payload shapes (§6).

use serde::{Deserialize, Serialize};

/// Default TCP/UDP port for the node's listener.
pub const DEFAULT_PORT: u16 = 6969;

/// Maximum simultaneous peers in the peer set.
pub const MAX_PEERS: usize = 12;

/// Per-read payload bound on a peer connection (§4.I).
pub const MESSAGE_SIZE_LIMIT: usize = 4096;

/// `REQ/RSP VERSION` payload: our (or the remote's) address, port, and
/// protocol version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPayload {
    pub address: String,
    pub port: String,
    pub version: String,
}

/// `RSP ADDRESS` entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub address: String,
    pub port: String,
}

/// `RSP ADDRESS` payload: the peer list an `ADDRESS` request is answered
/// with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressResponsePayload {
    pub peers: Vec<AddressEntry>,
}

/// `REQ TRANSACTION` payload: the wire fields of a signed transaction,
/// hex-encoded where the value isn't a plain integer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas: u64,
    pub to: String,
    pub value: String,
    pub data: String,
    pub v: u64,
    pub r: String,
    pub s: String,
}

/// `REQ BLOCK` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRequestPayload {
    pub best_block: u64,
}

/// A single hex-encoded header field set, as carried in `RSP BLOCK`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderDict {
    pub parent_hash: String,
    pub coinbase: String,
    pub state_root: String,
    pub transaction_root: String,
    pub receipt_root: String,
    pub bloom: String,
    pub block_number: u64,
    pub gas_used: u64,
    pub timestamp: Option<u64>,
    pub extra_data: String,
    pub epoch: u64,
    pub slot: u64,
    pub epoch_block_number: u64,
    pub slot_size: u64,
    pub epoch_size: u64,
}

/// `RSP BLOCK` payload: an ordered run of headers starting at `best_block + 1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockResponsePayload {
    pub blocks: Vec<HeaderDict>,
}

/// One entry of a `REQ CAMPAIGN` payload: `{address, campaign}` for a
/// given block number (the map's key in the wire schema).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignEntry {
    pub address: String,
    pub campaign: String,
}

/// `REQ CAMPAIGN` payload: block number (as a decimal string key per §6)
/// to campaign entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignPayload(pub std::collections::HashMap<String, CampaignEntry>);

/// `REQ QUERY` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequestPayload {
    pub block_number: u64,
}

/// `RSP QUERY` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponsePayload {
    pub block_hash: String,
}
