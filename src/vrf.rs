//! VRF: a block-number-bound pseudo-random value derived from a signing
//! key (§4.D), used to decide campaigns in the leader schedule.
//!
//! Mirrors an Ethereum personal-sign: the message is the decimal block
//! number, wrapped in the `"\x19Ethereum Signed Message:\n"` prefix and
//! Keccak-hashed, then signed with a recoverable ECDSA signature. The
//! `campaign` is the big-endian integer value of the 65-byte signature
//! (`r || s || v`); verification recovers the signer's address from the
//! same message hash and checks it against the claimed address.

use alloy_primitives::{keccak256, Address};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey};
use num_bigint::BigUint;

use crate::error::CryptoError;

fn eth_signed_message_hash(block_number: u64) -> [u8; 32] {
    let message = block_number.to_string();
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut buf = Vec::with_capacity(prefix.len() + message.len());
    buf.extend_from_slice(prefix.as_bytes());
    buf.extend_from_slice(message.as_bytes());
    keccak256(buf).0
}

fn address_from_verifying_key(verifying_key: &VerifyingKey) -> Address {
    let encoded = verifying_key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// `generate(block_number, key)`: signs the block number, returns
/// `(block_number, campaign)`.
pub fn generate(block_number: u64, signing_key: &SigningKey) -> Result<(u64, BigUint), CryptoError> {
    let digest = eth_signed_message_hash(block_number);
    let (signature, recovery_id): (K256Signature, RecoveryId) = signing_key
        .sign_prehash_recoverable(&digest)
        .map_err(|_| CryptoError::InvalidSignature)?;

    let mut bytes = [0u8; 65];
    bytes[..64].copy_from_slice(&signature.to_bytes());
    bytes[64] = recovery_id.to_byte();

    Ok((block_number, BigUint::from_bytes_be(&bytes)))
}

/// `verify(block_number, address, campaign)`: recovers the signer from the
/// campaign bytes and checks it against `address`.
pub fn verify(block_number: u64, address: Address, campaign: &BigUint) -> bool {
    let bytes = campaign.to_bytes_be();
    if bytes.len() > 65 {
        return false;
    }
    let mut padded = [0u8; 65];
    padded[65 - bytes.len()..].copy_from_slice(&bytes);

    let Ok(signature) = K256Signature::from_slice(&padded[..64]) else {
        return false;
    };
    let Some(recovery_id) = RecoveryId::from_byte(padded[64]) else {
        return false;
    };

    let digest = eth_signed_message_hash(block_number);
    let Ok(verifying_key) = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
    else {
        return false;
    };

    address_from_verifying_key(&verifying_key) == address
}
