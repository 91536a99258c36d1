//! SHA-256 hashing primitives.
//!
//! Every digest in the protocol is SHA-256; public keys are additionally
//! folded through RIPEMD-160 for addresses and output locks.

use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::constants::CHECKSUM_LENGTH;

/// 32-byte SHA-256 digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The all-zero hash, used as the genesis previous-hash sentinel and
    /// as the cleared transaction id.
    pub const fn zero() -> Self {
        Hash([0u8; 32])
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// Parse from a hex string; must decode to exactly 32 bytes.
    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Hash(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::zero()
    }
}

/// SHA-256 of arbitrary bytes.
pub fn sha256(data: &[u8]) -> Hash {
    let digest = Sha256::digest(data);
    Hash(digest.into())
}

/// SHA-256 applied twice.
pub fn double_sha256(data: &[u8]) -> Hash {
    let first = sha256(data);
    sha256(&first.0)
}

/// First four bytes of the double SHA-256 of the payload. Appended to
/// versioned pubkey hashes before Base58 encoding.
pub fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LENGTH] {
    let digest = double_sha256(payload);
    let mut out = [0u8; CHECKSUM_LENGTH];
    out.copy_from_slice(&digest.0[..CHECKSUM_LENGTH]);
    out
}

/// RIPEMD-160(SHA-256(pubkey)) - the 20-byte hash outputs are locked to.
pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let sha = Sha256::digest(pub_key);
    let ripemd = Ripemd160::digest(sha);
    ripemd.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_deterministic() {
        assert_eq!(sha256(b"hello world"), sha256(b"hello world"));
    }

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 of the empty string
        let digest = sha256(b"");
        assert_eq!(
            digest.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_different_inputs_differ() {
        assert_ne!(sha256(b"hello"), sha256(b"world"));
    }

    #[test]
    fn test_hex_roundtrip() {
        let digest = sha256(b"test");
        let recovered = Hash::from_hex(&digest.to_hex()).unwrap();
        assert_eq!(digest, recovered);
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(Hash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_zero_hash() {
        assert!(Hash::zero().is_zero());
        assert!(!sha256(b"x").is_zero());
    }

    #[test]
    fn test_pub_key_hash_is_twenty_bytes() {
        let pkh = hash_pub_key(&[7u8; 64]);
        assert_eq!(pkh.len(), 20);
    }

    #[test]
    fn test_checksum_depends_on_payload() {
        assert_ne!(checksum(b"abc"), checksum(b"abd"));
    }
}
