//! Cryptography module - SHA-256 hashing, P-256 ECDSA keys, Merkle trees

mod hash;
mod keys;
mod merkle;

pub use hash::*;
pub use keys::*;
pub use merkle::*;
