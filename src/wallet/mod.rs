//! Wallet module - key management and the Base58Check address codec

mod wallet;

pub use wallet::*;

use crate::constants::{ADDRESS_VERSION, CHECKSUM_LENGTH};
use crate::crypto::checksum;

/// Encode a pubkey hash as an address:
/// `Base58(version || pubkey_hash || checksum)` where the checksum is the
/// first four bytes of the double SHA-256 of `version || pubkey_hash`.
pub fn address_from_pub_key_hash(pub_key_hash: &[u8]) -> String {
    let mut payload = Vec::with_capacity(1 + pub_key_hash.len() + CHECKSUM_LENGTH);
    payload.push(ADDRESS_VERSION);
    payload.extend_from_slice(pub_key_hash);

    let check = checksum(&payload);
    payload.extend_from_slice(&check);

    bs58::encode(payload).into_string()
}

/// Decode an address back to its pubkey hash, verifying the checksum.
pub fn pub_key_hash_from_address(address: &str) -> Option<Vec<u8>> {
    let decoded = bs58::decode(address).into_vec().ok()?;
    if decoded.len() <= 1 + CHECKSUM_LENGTH {
        return None;
    }

    let (versioned, check) = decoded.split_at(decoded.len() - CHECKSUM_LENGTH);
    if checksum(versioned) != check {
        return None;
    }

    Some(versioned[1..].to_vec())
}

/// True when the address decodes and its checksum matches.
pub fn validate_address(address: &str) -> bool {
    pub_key_hash_from_address(address).is_some()
}
