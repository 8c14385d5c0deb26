//! The out-of-process execution engine boundary (§1, §6): account state
//! trie, gas metering, and opcode dispatch are explicitly out of scope —
//! [`Vm`] is the narrow interface the chain talks to instead.

use std::collections::HashMap;

use alloy_primitives::{keccak256, Address, Bloom, U256};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::block::Receipt;
use crate::error::VmError;
use crate::transaction::SignedTransaction;
use crate::types::Hash;

#[async_trait]
pub trait Vm: Send + Sync {
    async fn apply_transaction(&self, tx: &SignedTransaction) -> Result<Receipt, VmError>;
    async fn state_root(&self) -> Hash;
    fn chain_id(&self) -> u64;
}

#[derive(Clone, Debug, Default)]
struct Account {
    balance: U256,
    nonce: u64,
}

/// Deterministic in-memory reference [`Vm`]: a balance/nonce table with
/// no gas metering or contract code, used for tests and standalone
/// operation in place of the real EVM-compatible engine.
pub struct MemoryVm {
    accounts: Mutex<HashMap<Address, Account>>,
    chain_id: u64,
}

impl MemoryVm {
    pub fn new(chain_id: u64, genesis_state: HashMap<Address, (U256, u64)>) -> Self {
        let accounts = genesis_state
            .into_iter()
            .map(|(addr, (balance, nonce))| (addr, Account { balance, nonce }))
            .collect();
        Self {
            accounts: Mutex::new(accounts),
            chain_id,
        }
    }

    pub async fn balance_of(&self, address: &Address) -> U256 {
        self.accounts
            .lock()
            .await
            .get(address)
            .map(|a| a.balance)
            .unwrap_or_default()
    }
}

#[async_trait]
impl Vm for MemoryVm {
    async fn apply_transaction(&self, tx: &SignedTransaction) -> Result<Receipt, VmError> {
        let sender = tx
            .recover_sender()
            .map_err(|_| VmError::InsufficientBalance)?;

        let mut accounts = self.accounts.lock().await;
        let sender_account = accounts.entry(sender).or_default();

        if tx.nonce != sender_account.nonce {
            return Err(VmError::NonceTooLow {
                expected: sender_account.nonce,
                got: tx.nonce,
            });
        }
        if sender_account.balance < tx.value {
            return Err(VmError::InsufficientBalance);
        }

        sender_account.balance -= tx.value;
        sender_account.nonce += 1;

        let recipient_account = accounts.entry(tx.recipient).or_default();
        recipient_account.balance += tx.value;

        let bloom = touched_addresses_bloom(&[sender, tx.recipient]);
        Ok(Receipt::new(tx.hash(), 21_000, bloom, true))
    }

    async fn state_root(&self) -> Hash {
        let accounts = self.accounts.lock().await;
        let mut entries: Vec<_> = accounts.iter().collect();
        entries.sort_by_key(|(addr, _)| **addr);

        let mut buf = Vec::new();
        for (addr, account) in entries {
            buf.extend_from_slice(addr.as_slice());
            buf.extend_from_slice(&account.balance.to_be_bytes::<32>());
            buf.extend_from_slice(&account.nonce.to_be_bytes());
        }
        keccak256(buf)
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

/// Placeholder bloom: the hash of the touched addresses, per §6's
/// description of the reference VM.
fn touched_addresses_bloom(addresses: &[Address]) -> Bloom {
    let mut buf = Vec::new();
    for addr in addresses {
        buf.extend_from_slice(addr.as_slice());
    }
    let digest = keccak256(buf);
    let mut bloom_bytes = [0u8; 256];
    bloom_bytes[..32].copy_from_slice(digest.as_slice());
    Bloom::from(bloom_bytes)
}
