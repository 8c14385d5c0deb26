//! Block: header plus an ordered sequence of signed transactions (§3).
//!
//! Receipts are produced alongside a block during execution but are not
//! part of the header preimage — they live next to the block in the
//! freezer (§4.H).

use alloy_primitives::Bloom;
use alloy_rlp::{RlpDecodable, RlpEncodable};

use crate::header::Header;
use crate::transaction::SignedTransaction;
use crate::types::Hash;

#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<SignedTransaction>,
}

impl Block {
    pub fn new(header: Header, transactions: Vec<SignedTransaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.block_number
    }
}

/// Outcome of applying one transaction against the VM (§6 `Vm` trait).
#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Receipt {
    pub transaction_hash: Hash,
    pub gas_used: u64,
    pub bloom: Bloom,
    pub success: bool,
}

impl Receipt {
    pub fn new(transaction_hash: Hash, gas_used: u64, bloom: Bloom, success: bool) -> Self {
        Self {
            transaction_hash,
            gas_used,
            bloom,
            success,
        }
    }
}

/// OR of every receipt's bloom in a block, stored in the header (§4.H).
pub fn aggregate_bloom(receipts: &[Receipt]) -> Bloom {
    receipts
        .iter()
        .fold(Bloom::ZERO, |acc, receipt| acc | receipt.bloom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::ZERO_HASH;
    use alloy_primitives::address;

    fn genesis_header() -> Header {
        Header::new(
            ZERO_HASH,
            address!("0000000000000000000000000000000000000001"),
            alloy_primitives::B256::ZERO,
            alloy_primitives::B256::ZERO,
            alloy_primitives::B256::ZERO,
            Bloom::ZERO,
            0,
            0,
            Some(1_700_000_000),
            vec![],
            0,
            1,
            0,
            32,
            64,
        )
    }

    #[test]
    fn block_hash_delegates_to_header() {
        let block = Block::new(genesis_header(), vec![]);
        assert_eq!(block.hash(), block.header.hash());
    }

    #[test]
    fn aggregate_bloom_is_or_of_receipts() {
        let mut bytes_a = [0u8; 256];
        bytes_a[0] = 0b1010;
        let mut bytes_b = [0u8; 256];
        bytes_b[0] = 0b0101;
        let receipts = vec![
            Receipt::new(Hash::ZERO, 21_000, Bloom::from(bytes_a), true),
            Receipt::new(Hash::ZERO, 21_000, Bloom::from(bytes_b), true),
        ];
        let combined = aggregate_bloom(&receipts);
        assert_eq!(combined.as_slice()[0], 0b1111);
    }
}
