//! Block structure and construction.

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::consensus::{PowOutcome, ProofOfWork};
use crate::constants::GENESIS_DIFFICULTY;
use crate::crypto::{merkle_root, Hash};
use crate::tx::Transaction;

/// A block: header fields plus the ordered transaction list. The first
/// transaction is always the coinbase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Unix seconds, UTC. Rewritten during the PoW search; final once a
    /// nonce is found.
    pub timestamp: i64,
    /// SHA-256 of the canonical header preimage at the winning nonce.
    pub hash: Hash,
    /// Hash of the predecessor; zero for genesis.
    pub prev_hash: Hash,
    pub transactions: Vec<Transaction>,
    pub nonce: i64,
    pub height: i64,
    /// Difficulty this block was mined at. Validators derive the target
    /// from this field, not from a global constant.
    pub difficulty: u32,
    /// Merkle root over the transaction encodings, computed once at
    /// construction time.
    pub merkle_root: Hash,
}

impl Block {
    /// Mine a block: set the header, compute the merkle root once, and
    /// search for a nonce. Returns `None` when the search is interrupted
    /// through `interrupt`.
    pub fn mine_with_difficulty(
        transactions: Vec<Transaction>,
        prev_hash: Hash,
        height: i64,
        difficulty: u32,
        interrupt: Option<&Receiver<()>>,
    ) -> Option<Block> {
        let mut block = Block {
            timestamp: unix_now(),
            hash: Hash::zero(),
            prev_hash,
            transactions,
            nonce: 0,
            height,
            difficulty,
            merkle_root: Hash::zero(),
        };
        block.merkle_root = block.hash_transactions();

        match ProofOfWork::new(&mut block).run(interrupt) {
            PowOutcome::Solved { nonce, hash } => {
                block.nonce = nonce;
                block.hash = hash;
                Some(block)
            }
            PowOutcome::Interrupted => None,
        }
    }

    /// Mine the height-0 block from a single coinbase transaction.
    pub fn genesis(coinbase: Transaction) -> Block {
        Self::mine_with_difficulty(vec![coinbase], Hash::zero(), 0, GENESIS_DIFFICULTY, None)
            .expect("uninterrupted search always completes")
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_zero()
    }

    /// Merkle root over the serializations of this block's transactions.
    pub fn hash_transactions(&self) -> Hash {
        let leaves: Vec<Vec<u8>> = self.transactions.iter().map(|tx| tx.serialize()).collect();
        merkle_root(&leaves)
    }

    pub fn serialize(&self) -> Vec<u8> {
        bincode::serialize(self).expect("block serialization is infallible")
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}
