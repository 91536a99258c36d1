//! Proof-of-work search.
//!
//! The digest is SHA-256 over `prev_hash || merkle_root || be64(nonce) ||
//! be64(difficulty) || be64(timestamp)`, using the block's stored merkle
//! root. A candidate wins when the digest, read big-endian, is strictly
//! below `2^(256 - difficulty)`.

use crossbeam_channel::Receiver;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::consensus::Block;
use crate::crypto::{sha256, Hash};

/// The search rewrites the block timestamp this often so a long search
/// still produces a current block.
const TIMESTAMP_REFRESH_INTERVAL: i64 = 1_000;

/// The search polls the interrupt channel this often.
const INTERRUPT_POLL_INTERVAL: i64 = 10_000;

/// Result of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowOutcome {
    /// A nonce satisfying the target, plus the winning digest.
    Solved { nonce: i64, hash: Hash },
    /// The interrupt channel delivered a token; the block is untouched
    /// apart from its timestamp.
    Interrupted,
}

/// Proof-of-work search over a block under construction.
///
/// The block must have every header field set except `nonce` and `hash`.
pub struct ProofOfWork<'a> {
    block: &'a mut Block,
    target: [u8; 32],
}

impl<'a> ProofOfWork<'a> {
    pub fn new(block: &'a mut Block) -> Self {
        let target = target_bytes(block.difficulty);
        Self { block, target }
    }

    /// Enumerate nonces from zero until the target is met or an interrupt
    /// token arrives.
    ///
    /// On success the block's timestamp is whatever value produced the
    /// winning digest; rewriting it afterwards invalidates the hash.
    pub fn run(&mut self, interrupt: Option<&Receiver<()>>) -> PowOutcome {
        let mut nonce: i64 = 0;

        loop {
            if nonce % TIMESTAMP_REFRESH_INTERVAL == 0 {
                self.block.timestamp = unix_now();
            }

            if nonce % INTERRUPT_POLL_INTERVAL == 0 {
                if let Some(rx) = interrupt {
                    if rx.try_recv().is_ok() {
                        return PowOutcome::Interrupted;
                    }
                }
            }

            let digest = sha256(&pow_preimage(self.block, nonce));
            if digest.0 < self.target {
                return PowOutcome::Solved {
                    nonce,
                    hash: digest,
                };
            }

            nonce += 1;
        }
    }
}

/// Canonical header preimage for a given nonce.
pub fn pow_preimage(block: &Block, nonce: i64) -> Vec<u8> {
    let mut data = Vec::with_capacity(32 + 32 + 8 + 8 + 8);
    data.extend_from_slice(&block.prev_hash.0);
    data.extend_from_slice(&block.merkle_root.0);
    data.extend_from_slice(&nonce.to_be_bytes());
    data.extend_from_slice(&(block.difficulty as i64).to_be_bytes());
    data.extend_from_slice(&block.timestamp.to_be_bytes());
    data
}

/// `2^(256 - difficulty)` as a 32-byte big-endian value.
///
/// Difficulty 0 yields the permissive all-ones target and difficulties
/// past 255 yield an unsatisfiable zero target, so a block carrying a
/// nonsense difficulty field cannot panic the validator.
pub fn target_bytes(difficulty: u32) -> [u8; 32] {
    if difficulty == 0 {
        return [0xff; 32];
    }
    let mut target = [0u8; 32];
    if difficulty > 255 {
        return target;
    }
    let bit = 256 - difficulty as usize;
    target[31 - bit / 8] = 1 << (bit % 8);
    target
}

/// Check a mined block's digest against the target derived from its own
/// stored difficulty.
pub fn validate_pow(block: &Block) -> bool {
    let digest = sha256(&pow_preimage(block, block.nonce));
    digest.0 < target_bytes(block.difficulty)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}
