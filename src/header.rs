//! Block header: the data model in §3 / §4.C.
//!
//! Immutable after construction; `hash()` is lazily computed from the RLP
//! preimage and cached. `timestamp` is `None` only at genesis — everywhere
//! else a header is built from a known parent and always carries a wall
//! clock reading.

use std::sync::OnceLock;

use alloy_primitives::{keccak256, Address, Bloom, B256};
use alloy_rlp::{Buf, BufMut, Decodable, Encodable, EMPTY_STRING_CODE};

use crate::types::Hash;

/// `parent_hash == ZERO_HASH && block_number == 0` marks genesis.
pub const ZERO_HASH: Hash = B256::ZERO;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub parent_hash: Hash,
    pub coinbase: Address,
    pub state_root: Hash,
    pub transaction_root: Hash,
    pub receipt_root: Hash,
    pub bloom: Bloom,
    pub block_number: u64,
    pub gas_used: u64,
    pub timestamp: Option<u64>,
    pub extra_data: Vec<u8>,
    pub epoch: u64,
    pub slot: u64,
    pub epoch_block_number: u64,
    pub slot_size: u64,
    pub epoch_size: u64,

    #[doc(hidden)]
    hash: OnceLock<Hash>,
}

/// `extra_data` beyond this many bytes is rejected (§4.C / §5 edge cases).
pub const MAX_EXTRA_DATA_SIZE: usize = 32;

impl Header {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parent_hash: Hash,
        coinbase: Address,
        state_root: Hash,
        transaction_root: Hash,
        receipt_root: Hash,
        bloom: Bloom,
        block_number: u64,
        gas_used: u64,
        timestamp: Option<u64>,
        extra_data: Vec<u8>,
        epoch: u64,
        slot: u64,
        epoch_block_number: u64,
        slot_size: u64,
        epoch_size: u64,
    ) -> Self {
        Self {
            parent_hash,
            coinbase,
            state_root,
            transaction_root,
            receipt_root,
            bloom,
            block_number,
            gas_used,
            timestamp,
            extra_data,
            epoch,
            slot,
            epoch_block_number,
            slot_size,
            epoch_size,
            hash: OnceLock::new(),
        }
    }

    /// True for the chain's first header: zero parent hash and block number 0.
    pub fn is_genesis(&self) -> bool {
        self.parent_hash == ZERO_HASH && self.block_number == 0
    }

    /// `keccak(rlp(header))`, computed once and cached for the header's lifetime.
    pub fn hash(&self) -> Hash {
        *self.hash.get_or_init(|| {
            let mut buf = Vec::with_capacity(self.length());
            self.encode(&mut buf);
            keccak256(buf)
        })
    }
}

fn header_payload_length(h: &Header) -> usize {
    let mut len = 0;
    len += h.parent_hash.length();
    len += h.coinbase.length();
    len += h.state_root.length();
    len += h.transaction_root.length();
    len += h.receipt_root.length();
    len += h.bloom.length();
    len += h.block_number.length();
    len += h.gas_used.length();
    len += match h.timestamp {
        Some(t) => t.length(),
        None => 1,
    };
    len += h.extra_data.as_slice().length();
    len += h.epoch.length();
    len += h.slot.length();
    len += h.epoch_block_number.length();
    len += h.slot_size.length();
    len += h.epoch_size.length();
    len
}

impl Encodable for Header {
    fn encode(&self, out: &mut dyn BufMut) {
        let list_header = alloy_rlp::Header {
            list: true,
            payload_length: header_payload_length(self),
        };
        list_header.encode(out);
        self.parent_hash.encode(out);
        self.coinbase.encode(out);
        self.state_root.encode(out);
        self.transaction_root.encode(out);
        self.receipt_root.encode(out);
        self.bloom.encode(out);
        self.block_number.encode(out);
        self.gas_used.encode(out);
        match self.timestamp {
            Some(t) => t.encode(out),
            None => out.put_u8(EMPTY_STRING_CODE),
        }
        self.extra_data.as_slice().encode(out);
        self.epoch.encode(out);
        self.slot.encode(out);
        self.epoch_block_number.encode(out);
        self.slot_size.encode(out);
        self.epoch_size.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = header_payload_length(self);
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

impl Decodable for Header {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let rlp_head = alloy_rlp::Header::decode(buf)?;
        if !rlp_head.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }

        let parent_hash = Decodable::decode(buf)?;
        let coinbase = Decodable::decode(buf)?;
        let state_root = Decodable::decode(buf)?;
        let transaction_root = Decodable::decode(buf)?;
        let receipt_root = Decodable::decode(buf)?;
        let bloom = Decodable::decode(buf)?;
        let block_number = u64::decode(buf)?;
        let gas_used = u64::decode(buf)?;
        let timestamp = if buf.first().copied() == Some(EMPTY_STRING_CODE) {
            buf.advance(1);
            None
        } else {
            Some(u64::decode(buf)?)
        };
        let extra_data = Vec::<u8>::decode(buf)?;
        let epoch = u64::decode(buf)?;
        let slot = u64::decode(buf)?;
        let epoch_block_number = u64::decode(buf)?;
        let slot_size = u64::decode(buf)?;
        let epoch_size = u64::decode(buf)?;

        Ok(Self {
            parent_hash,
            coinbase,
            state_root,
            transaction_root,
            receipt_root,
            bloom,
            block_number,
            gas_used,
            timestamp,
            extra_data,
            epoch,
            slot,
            epoch_block_number,
            slot_size,
            epoch_size,
            hash: OnceLock::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn sample(timestamp: Option<u64>) -> Header {
        Header::new(
            ZERO_HASH,
            address!("0000000000000000000000000000000000000001"),
            B256::repeat_byte(0xaa),
            B256::repeat_byte(0xbb),
            B256::repeat_byte(0xcc),
            Bloom::ZERO,
            0,
            0,
            timestamp,
            vec![1, 2, 3],
            0,
            1,
            0,
            32,
            64,
        )
    }

    #[test]
    fn genesis_recognition() {
        let h = sample(None);
        assert!(h.is_genesis());
    }

    #[test]
    fn rlp_round_trip_with_timestamp() {
        let h = sample(Some(1_700_000_000));
        let mut buf = Vec::new();
        h.encode(&mut buf);
        let decoded = Header::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(h.hash(), decoded.hash());
        assert_eq!(decoded.timestamp, Some(1_700_000_000));
    }

    #[test]
    fn rlp_round_trip_without_timestamp() {
        let h = sample(None);
        let mut buf = Vec::new();
        h.encode(&mut buf);
        let decoded = Header::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded.timestamp, None);
        assert_eq!(h.hash(), decoded.hash());
    }

    #[test]
    fn hash_is_memoized() {
        let h = sample(Some(1));
        let a = h.hash();
        let b = h.hash();
        assert_eq!(a, b);
    }
}
