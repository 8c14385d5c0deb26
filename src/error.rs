//! Per-subsystem error taxonomy (§7: Validation / Transport / State /
//! Consensus / Freezer I/O). Every fallible public function returns one
//! of these instead of unwinding.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("envelope is not a well-formed {{type, flag, data, timestamp}} object")]
    Malformed,
    #[error("unknown message flag {0}")]
    UnknownFlag(i64),
    #[error("payload does not match the schema for this (type, flag) pair")]
    SchemaMismatch,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid public key or address recovery failure")]
    InvalidKey,
}

#[derive(Error, Debug)]
pub enum FreezerError {
    #[error("block number {0} is out of range")]
    NotFound(u64),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("index file corrupt: {0}")]
    CorruptIndex(String),
    #[error(transparent)]
    Rlp(#[from] alloy_rlp::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("block has no resolvable parent")]
    UnknownParent,
    #[error("transaction root mismatch")]
    TransactionRootMismatch,
    #[error("referenced state root {0} does not exist in the chain db")]
    UnknownStateRoot(String),
    #[error("extra_data exceeds the {0}-byte limit")]
    ExtraDataTooLarge(usize),
    #[error(transparent)]
    Vm(#[from] VmError),
    #[error(transparent)]
    Freezer(#[from] FreezerError),
}

#[derive(Error, Debug)]
pub enum VmError {
    #[error("nonce too low: expected {expected}, got {got}")]
    NonceTooLow { expected: u64, got: u64 },
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("gas limit exceeded")]
    GasLimitExceeded,
}

#[derive(Error, Debug)]
pub enum NetError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("connection closed by peer")]
    Closed,
    #[error("peer set is full")]
    MaxPeersReached,
    #[error("peer {0} is already known")]
    DuplicatePeer(String),
}

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("no seed or known peers were reachable")]
    NoReachablePeers,
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Freezer(#[from] FreezerError),
}
