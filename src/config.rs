//! Command-line configuration (§6: transport, genesis, chain ID).

use std::path::PathBuf;

use alloy_primitives::Address;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "meridian-node", version, about = "A permissionless VRF-leader, Snowball-finalized P2P chain node")]
pub struct Args {
    /// Listen port for both TCP (request/response) and UDP (heartbeat).
    #[arg(short, long, default_value_t = crate::net::types::DEFAULT_PORT)]
    pub port: u16,

    /// Directory holding the freezer's on-disk columns.
    #[arg(short, long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Comma-separated seed peers, each `host:port`.
    #[arg(short, long)]
    pub seeds: Option<String>,

    /// This node's externally reachable address, used in VERSION replies
    /// and rewritten to loopback in peers that report it back to us.
    #[arg(short = 'e', long, default_value = "127.0.0.1")]
    pub external_address: String,

    /// Chain ID used to bind signatures.
    #[arg(long, default_value_t = 1)]
    pub chain_id: u64,

    /// Blocks per slot.
    #[arg(long, default_value_t = 32)]
    pub slot_size: u64,

    /// Slots per epoch.
    #[arg(long, default_value_t = 64)]
    pub epoch_size: u64,

    /// Mempool transaction expiry, in seconds.
    #[arg(long, default_value_t = crate::mempool::DEFAULT_TX_EXPIRE_TIME_SECS)]
    pub tx_expire_time_secs: u64,

    /// Use the head-hash-derived VDF exponent directly instead of the
    /// bounded test/local variant.
    #[arg(long)]
    pub vdf_full: bool,
}

pub struct NodeConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub seeds: Vec<String>,
    pub external_address: String,
    pub chain_id: u64,
    pub slot_size: u64,
    pub epoch_size: u64,
    pub tx_expire_time_secs: u64,
    pub vdf_full: bool,
}

impl From<Args> for NodeConfig {
    fn from(args: Args) -> Self {
        let seeds = args
            .seeds
            .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();
        Self {
            port: args.port,
            data_dir: args.data_dir,
            seeds,
            external_address: args.external_address,
            chain_id: args.chain_id,
            slot_size: args.slot_size,
            epoch_size: args.epoch_size,
            tx_expire_time_secs: args.tx_expire_time_secs,
            vdf_full: args.vdf_full,
        }
    }
}

/// Genesis coinbase placeholder used when no account is supplied out of
/// band; a real deployment would take this from the genesis params file.
pub const GENESIS_COINBASE: Address = Address::ZERO;
