//! Signed transaction: §3 / §6 `TRANSACTION` payload.

use std::sync::OnceLock;

use alloy_primitives::{keccak256, Address, Bytes, U256};
use alloy_rlp::{BufMut, Decodable, Encodable, RlpDecodable, RlpEncodable};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey};

use crate::error::CryptoError;
use crate::types::Hash;

/// Recoverable ECDSA signature over a transaction's RLP preimage.
#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct TxSignature {
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct TxBody {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    recipient: Address,
    value: U256,
    data: Bytes,
    v: u64,
    r: U256,
    s: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub recipient: Address,
    pub value: U256,
    pub data: Bytes,
    pub signature: TxSignature,

    hash: OnceLock<Hash>,
}

impl SignedTransaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nonce: u64,
        gas_price: u128,
        gas_limit: u64,
        recipient: Address,
        value: U256,
        data: Bytes,
        signature: TxSignature,
    ) -> Self {
        Self {
            nonce,
            gas_price,
            gas_limit,
            recipient,
            value,
            data,
            signature,
            hash: OnceLock::new(),
        }
    }

    fn body(&self) -> TxBody {
        TxBody {
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            recipient: self.recipient,
            value: self.value,
            data: self.data.clone(),
            v: self.signature.v,
            r: self.signature.r,
            s: self.signature.s,
        }
    }

    /// `keccak(rlp(transaction))`, memoized.
    pub fn hash(&self) -> Hash {
        *self.hash.get_or_init(|| {
            let mut buf = Vec::new();
            alloy_rlp::Encodable::encode(&self.body(), &mut buf);
            keccak256(buf)
        })
    }

    /// Recovers the sender address from the signature over the unsigned body hash.
    pub fn recover_sender(&self) -> Result<Address, CryptoError> {
        let unsigned_hash = self.signing_hash();
        let recovery_id =
            RecoveryId::from_byte(self.signature.v as u8).ok_or(CryptoError::InvalidSignature)?;
        let mut sig_bytes = [0u8; 64];
        sig_bytes[..32].copy_from_slice(&self.signature.r.to_be_bytes::<32>());
        sig_bytes[32..].copy_from_slice(&self.signature.s.to_be_bytes::<32>());
        let signature =
            K256Signature::from_slice(&sig_bytes).map_err(|_| CryptoError::InvalidSignature)?;
        let verifying_key =
            VerifyingKey::recover_from_prehash(unsigned_hash.as_slice(), &signature, recovery_id)
                .map_err(|_| CryptoError::InvalidKey)?;
        let encoded = verifying_key.to_encoded_point(false);
        let hash = keccak256(&encoded.as_bytes()[1..]);
        Ok(Address::from_slice(&hash[12..]))
    }

    /// Hash of the transaction body without the signature, the value that gets signed.
    fn signing_hash(&self) -> Hash {
        #[derive(RlpEncodable)]
        struct Unsigned {
            nonce: u64,
            gas_price: u128,
            gas_limit: u64,
            recipient: Address,
            value: U256,
            data: Bytes,
        }
        let unsigned = Unsigned {
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            recipient: self.recipient,
            value: self.value,
            data: self.data.clone(),
        };
        let mut buf = Vec::new();
        alloy_rlp::Encodable::encode(&unsigned, &mut buf);
        keccak256(buf)
    }
}

impl Encodable for SignedTransaction {
    fn encode(&self, out: &mut dyn BufMut) {
        self.body().encode(out)
    }

    fn length(&self) -> usize {
        self.body().length()
    }
}

impl Decodable for SignedTransaction {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let body = TxBody::decode(buf)?;
        Ok(Self::new(
            body.nonce,
            body.gas_price,
            body.gas_limit,
            body.recipient,
            body.value,
            body.data,
            TxSignature {
                v: body.v,
                r: body.r,
                s: body.s,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use k256::ecdsa::SigningKey;

    fn sign(signing_key: &SigningKey, digest: &Hash) -> TxSignature {
        let (sig, recid): (K256Signature, RecoveryId) = signing_key
            .sign_prehash_recoverable(digest.as_slice())
            .expect("signing a 32-byte digest never fails");
        let (r, s) = sig.split_bytes();
        TxSignature {
            v: recid.to_byte() as u64,
            r: U256::from_be_slice(&r),
            s: U256::from_be_slice(&s),
        }
    }

    #[test]
    fn rlp_round_trip() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32].into()).unwrap();
        let mut tx = SignedTransaction::new(
            1,
            10,
            21_000,
            address!("0000000000000000000000000000000000000002"),
            U256::from(100u64),
            Bytes::new(),
            TxSignature {
                v: 0,
                r: U256::ZERO,
                s: U256::ZERO,
            },
        );
        tx.signature = sign(&signing_key, &tx.signing_hash());

        let mut buf = Vec::new();
        alloy_rlp::Encodable::encode(&tx, &mut buf);
        let decoded = SignedTransaction::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded.hash(), tx.hash());
    }

    #[test]
    fn recovers_signer() {
        let signing_key = SigningKey::from_bytes(&[11u8; 32].into()).unwrap();
        let verifying_key = VerifyingKey::from(&signing_key);
        let encoded = verifying_key.to_encoded_point(false);
        let expected = Address::from_slice(&keccak256(&encoded.as_bytes()[1..])[12..]);

        let mut tx = SignedTransaction::new(
            0,
            1,
            21_000,
            address!("0000000000000000000000000000000000000003"),
            U256::ZERO,
            Bytes::new(),
            TxSignature {
                v: 0,
                r: U256::ZERO,
                s: U256::ZERO,
            },
        );
        tx.signature = sign(&signing_key, &tx.signing_hash());

        assert_eq!(tx.recover_sender().unwrap(), expected);
    }
}
