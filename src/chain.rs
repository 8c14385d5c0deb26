//! Chain (VM wrapper): applies transactions, forges blocks, and persists
//! the canonical head (§4.H).

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::block::{aggregate_bloom, Block, Receipt};
use crate::error::ChainError;
use crate::freezer::Freezer;
use crate::header::{Header, ZERO_HASH, MAX_EXTRA_DATA_SIZE};
use crate::transaction::SignedTransaction;
use crate::vm::Vm;

/// A fixed-size window of slots; each slot contains a fixed number of
/// blocks (§3 data model).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochContext {
    pub start: u64,
    pub slot_size: u64,
    pub epoch_size: u64,
    pub slot: u64,
}

impl EpochContext {
    pub fn new(start: u64, slot_size: u64, epoch_size: u64, slot: u64) -> Self {
        Self {
            start,
            slot_size,
            epoch_size,
            slot,
        }
    }

    /// `start + slot_size * epoch_size`.
    pub fn end(&self) -> u64 {
        self.start + self.slot_size * self.epoch_size
    }

    /// The next epoch starts right after `end`, at slot 1.
    pub fn next(&self) -> Self {
        Self {
            start: self.end() + 1,
            slot_size: self.slot_size,
            epoch_size: self.epoch_size,
            slot: 1,
        }
    }

    pub fn total_blocks(&self) -> u64 {
        self.slot_size * self.epoch_size
    }
}

/// Default fields for the very first header, supplied by the caller
/// alongside the genesis account state (§6 "Genesis").
pub struct GenesisParams {
    pub timestamp: u64,
    pub coinbase: Address,
    pub slot_size: u64,
    pub epoch_size: u64,
    pub extra_data: Vec<u8>,
}

struct ChainState {
    head: Header,
}

/// Serializes `forge_block`/`import_block`/`apply_transaction` behind a
/// single lock, exactly as §5 requires callers to do.
pub struct Chain {
    freezer: Arc<Freezer>,
    vm: Arc<dyn Vm>,
    state: Mutex<ChainState>,
}

impl Chain {
    /// Builds the genesis header, persists it, and opens the chain atop it.
    pub fn genesis(freezer: Arc<Freezer>, vm: Arc<dyn Vm>, params: GenesisParams) -> Result<Self, ChainError> {
        if params.extra_data.len() > MAX_EXTRA_DATA_SIZE {
            return Err(ChainError::ExtraDataTooLarge(MAX_EXTRA_DATA_SIZE));
        }
        let header = Header::new(
            ZERO_HASH,
            params.coinbase,
            alloy_primitives::B256::ZERO,
            alloy_primitives::B256::ZERO,
            alloy_primitives::B256::ZERO,
            alloy_primitives::Bloom::ZERO,
            0,
            0,
            Some(params.timestamp),
            params.extra_data,
            1,
            1,
            1,
            params.slot_size,
            params.epoch_size,
        );
        freezer.store_block(&header, &[], &[])?;
        Ok(Self {
            freezer,
            vm,
            state: Mutex::new(ChainState { head: header }),
        })
    }

    /// Re-opens an existing chain whose genesis/head is already on disk.
    pub fn open(freezer: Arc<Freezer>, vm: Arc<dyn Vm>, head: Header) -> Self {
        Self {
            freezer,
            vm,
            state: Mutex::new(ChainState { head }),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.vm.chain_id()
    }

    pub fn get_vm(&self) -> Arc<dyn Vm> {
        Arc::clone(&self.vm)
    }

    pub async fn get_canonical_head(&self) -> Header {
        self.state.lock().await.head.clone()
    }

    pub fn get_canonical_block_by_number(&self, block_number: u64) -> Result<Block, ChainError> {
        let header = self.freezer.get_block_header_by_number(block_number)?;
        let transactions = self
            .freezer
            .get_block_transactions_by_number(block_number)?;
        Ok(Block::new(header, transactions))
    }

    /// Builds an unsigned transaction skeleton; the caller fills in and
    /// attaches the signature before submitting it to the mempool.
    pub fn create_unsigned_transaction(
        &self,
        nonce: u64,
        gas_price: u128,
        gas_limit: u64,
        recipient: Address,
        value: U256,
        data: alloy_primitives::Bytes,
    ) -> SignedTransaction {
        SignedTransaction::new(
            nonce,
            gas_price,
            gas_limit,
            recipient,
            value,
            data,
            crate::transaction::TxSignature {
                v: 0,
                r: U256::ZERO,
                s: U256::ZERO,
            },
        )
    }

    pub async fn apply_transaction(&self, tx: &SignedTransaction) -> Result<Receipt, ChainError> {
        self.vm.apply_transaction(tx).await.map_err(Into::into)
    }

    /// Runs `pending` against the pre-state, finalizes a header, validates
    /// the resulting block, persists it, and advances the in-memory head.
    pub async fn forge_block(&self, pending: Vec<SignedTransaction>) -> Result<Block, ChainError> {
        let mut receipts = Vec::with_capacity(pending.len());
        let mut gas_used = 0u64;
        for tx in &pending {
            let receipt = self.apply_transaction(tx).await?;
            gas_used += receipt.gas_used;
            receipts.push(receipt);
        }

        let parent = self.get_canonical_head().await;
        let bloom = aggregate_bloom(&receipts);
        let state_root = self.vm.state_root().await;

        let mut header = create_header_from_parent(&parent);
        header.gas_used = gas_used;
        header.bloom = bloom;
        header.state_root = state_root;
        header.transaction_root = transaction_root(&pending);

        self.validate_block(&header, &pending, state_root)?;

        self.freezer.store_block(&header, &pending, &receipts)?;
        self.state.lock().await.head = header.clone();

        info!(block_number = header.block_number, "forged block");
        Ok(Block::new(header, pending))
    }

    /// Re-executes a block learned from a peer against the VM and, if it
    /// checks out, persists it and advances the in-memory head.
    pub async fn import_block(&self, block: Block) -> Result<(), ChainError> {
        if !block.header.is_genesis() {
            let parent_number = block
                .header
                .block_number
                .checked_sub(1)
                .ok_or(ChainError::UnknownParent)?;
            self.get_canonical_block_by_number(parent_number)
                .map_err(|_| ChainError::UnknownParent)?;
        }

        let mut receipts = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            receipts.push(self.apply_transaction(tx).await?);
        }
        let state_root = self.vm.state_root().await;

        self.validate_block(&block.header, &block.transactions, state_root)?;

        self.freezer
            .store_block(&block.header, &block.transactions, &receipts)?;
        self.state.lock().await.head = block.header;
        Ok(())
    }

    fn validate_block(
        &self,
        header: &Header,
        transactions: &[SignedTransaction],
        computed_state_root: alloy_primitives::B256,
    ) -> Result<(), ChainError> {
        if header.extra_data.len() > MAX_EXTRA_DATA_SIZE {
            return Err(ChainError::ExtraDataTooLarge(MAX_EXTRA_DATA_SIZE));
        }
        let recomputed_tx_root = transaction_root(transactions);
        if recomputed_tx_root != header.transaction_root {
            warn!("transaction root mismatch, rejecting block");
            return Err(ChainError::TransactionRootMismatch);
        }
        if header.state_root != computed_state_root {
            return Err(ChainError::UnknownStateRoot(header.state_root.to_string()));
        }
        Ok(())
    }
}

/// Epoch/slot succession rule, applied when building the next header from
/// the just-forged parent (§4.H).
pub fn create_header_from_parent(parent: &Header) -> Header {
    let block_number = parent.block_number + 1;
    let slot_size = parent.slot_size;
    let epoch_size = parent.epoch_size;

    let (epoch, slot, epoch_block_number) =
        if parent.epoch_block_number > slot_size && parent.slot == slot_size - 1 {
            (parent.epoch + 1, 1, 1)
        } else {
            (parent.epoch, parent.slot + 1, parent.epoch_block_number + 1)
        };

    Header::new(
        parent.hash(),
        parent.coinbase,
        parent.state_root,
        parent.transaction_root,
        parent.receipt_root,
        parent.bloom,
        block_number,
        0,
        Some(crate::types::now()),
        Vec::new(),
        epoch,
        slot,
        epoch_block_number,
        slot_size,
        epoch_size,
    )
}

fn transaction_root(transactions: &[SignedTransaction]) -> alloy_primitives::B256 {
    let hashes: Vec<_> = transactions.iter().map(|tx| tx.hash()).collect();
    let mut buf = Vec::new();
    alloy_rlp::encode_list(&hashes, &mut buf);
    alloy_primitives::keccak256(buf)
}
