//! ECDSA keys over NIST P-256.
//!
//! Public keys travel as the raw concatenation of the affine X and Y
//! coordinates (32 bytes each, zero-padded left); signatures as raw
//! `r || s` (32 bytes each). There is no DER anywhere on the wire.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::{EncodedPoint, FieldBytes};
use rand::rngs::OsRng;
use thiserror::Error;

use super::Hash;

/// Width of one curve coordinate / scalar in bytes.
pub const COORD_LENGTH: usize = 32;

/// Width of a raw public key (X || Y).
pub const PUBLIC_KEY_LENGTH: usize = 2 * COORD_LENGTH;

/// Width of a raw signature (r || s).
pub const SIGNATURE_LENGTH: usize = 2 * COORD_LENGTH;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid private key scalar")]
    InvalidPrivateKey,
    #[error("invalid public key encoding")]
    InvalidPublicKey,
}

/// A P-256 signing keypair.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair([REDACTED])")
    }
}

impl KeyPair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::random(&mut OsRng),
        }
    }

    /// Rebuild a keypair from its 32-byte private scalar.
    pub fn from_scalar_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        SigningKey::from_slice(bytes)
            .map(|signing| Self { signing })
            .map_err(|_| KeyError::InvalidPrivateKey)
    }

    /// The 32-byte private scalar.
    pub fn scalar_bytes(&self) -> Vec<u8> {
        self.signing.to_bytes().to_vec()
    }

    /// Affine coordinates of the public point, zero-padded to 32 bytes each.
    pub fn public_key_coords(&self) -> (Vec<u8>, Vec<u8>) {
        let point = self.signing.verifying_key().to_encoded_point(false);
        let x = point.x().expect("uncompressed point has X").to_vec();
        let y = point.y().expect("uncompressed point has Y").to_vec();
        (x, y)
    }

    /// Raw public key: X || Y.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        let (mut x, y) = self.public_key_coords();
        x.extend_from_slice(&y);
        x
    }

    /// Sign a 32-byte digest, returning raw `r || s`.
    pub fn sign(&self, message: &Hash) -> Vec<u8> {
        let signature: Signature = self.signing.sign(&message.0);
        signature.to_bytes().to_vec()
    }
}

/// Verify a raw `r || s` signature over `message` against a raw `X || Y`
/// public key. Malformed keys or signatures verify as false.
pub fn verify_signature(pub_key: &[u8], message: &Hash, signature: &[u8]) -> bool {
    if pub_key.len() != PUBLIC_KEY_LENGTH || signature.len() != SIGNATURE_LENGTH {
        return false;
    }

    let x = FieldBytes::from_slice(&pub_key[..COORD_LENGTH]);
    let y = FieldBytes::from_slice(&pub_key[COORD_LENGTH..]);
    let point = EncodedPoint::from_affine_coordinates(x, y, false);

    let verifying = match VerifyingKey::from_encoded_point(&point) {
        Ok(vk) => vk,
        Err(_) => return false,
    };

    let sig = match Signature::from_slice(signature) {
        Ok(s) => s,
        Err(_) => return false,
    };

    verifying.verify(&message.0, &sig).is_ok()
}
