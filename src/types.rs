//! Shared primitive aliases used across every subsystem.

use std::time::{SystemTime, UNIX_EPOCH};

/// 32-byte hash. Used for block hashes, state/transaction/receipt roots,
/// and transaction hashes.
pub type Hash = alloy_primitives::B256;

/// 20-byte account address (EVM-shaped; the account state trie itself
/// lives in the external execution engine, see [`crate::vm`]).
pub type Address = alloy_primitives::Address;

/// Unix timestamp in seconds, used for peer liveness, mempool entry age,
/// and ban expiry.
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs()
}
