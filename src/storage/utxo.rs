//! Persistent UTXO index.
//!
//! A derived view of the chain living in the same sled tree: for every
//! transaction with at least one unspent output, the key `utxo-` + tx id
//! maps to the serialized list of those outputs. The index can always be
//! rebuilt from the chain with `reindex`.

use std::collections::HashMap;

use crate::constants::UTXO_PREFIX;
use crate::consensus::Block;
use crate::crypto::Hash;
use crate::storage::{Blockchain, ChainError};
use crate::tx::{TxOutput, TxOutputs};

/// The UTXO index over a chain store.
#[derive(Debug, Clone)]
pub struct UtxoSet {
    chain: Blockchain,
}

impl UtxoSet {
    pub fn new(chain: Blockchain) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    fn key_for(tx_id: &Hash) -> Vec<u8> {
        let mut key = Vec::with_capacity(UTXO_PREFIX.len() + 32);
        key.extend_from_slice(UTXO_PREFIX);
        key.extend_from_slice(&tx_id.0);
        key
    }

    fn tx_id_from_key(key: &[u8]) -> Hash {
        let mut id = [0u8; 32];
        id.copy_from_slice(&key[UTXO_PREFIX.len()..]);
        Hash(id)
    }

    /// Collect outputs locked to `pub_key_hash` until their total covers
    /// `amount`. Returns the accumulated value and, per transaction id,
    /// the indices of the selected outputs. Callers must not rely on
    /// which outputs are chosen, only that the total suffices.
    pub fn find_spendable(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, HashMap<Hash, Vec<i32>>), ChainError> {
        let mut spendable: HashMap<Hash, Vec<i32>> = HashMap::new();
        let mut accumulated = 0u64;

        'scan: for entry in self.chain.db().scan_prefix(UTXO_PREFIX) {
            let (key, value) = entry?;
            let tx_id = Self::tx_id_from_key(&key);
            let outs = TxOutputs::deserialize(&value)?;

            for (out_index, output) in outs.outputs.iter().enumerate() {
                if output.is_locked_with_key(pub_key_hash) {
                    accumulated += output.value;
                    spendable.entry(tx_id).or_default().push(out_index as i32);

                    if accumulated >= amount {
                        break 'scan;
                    }
                }
            }
        }

        Ok((accumulated, spendable))
    }

    /// Every unspent output locked to `pub_key_hash`.
    pub fn find_all(&self, pub_key_hash: &[u8]) -> Result<Vec<TxOutput>, ChainError> {
        let mut utxos = Vec::new();

        for entry in self.chain.db().scan_prefix(UTXO_PREFIX) {
            let (_, value) = entry?;
            let outs = TxOutputs::deserialize(&value)?;
            for output in outs.outputs {
                if output.is_locked_with_key(pub_key_hash) {
                    utxos.push(output);
                }
            }
        }

        Ok(utxos)
    }

    /// Total value spendable by `pub_key_hash`.
    pub fn balance(&self, pub_key_hash: &[u8]) -> Result<u64, ChainError> {
        Ok(self
            .find_all(pub_key_hash)?
            .iter()
            .map(|output| output.value)
            .sum())
    }

    /// Number of transactions with at least one unspent output.
    pub fn count(&self) -> Result<usize, ChainError> {
        let mut counter = 0;
        for entry in self.chain.db().scan_prefix(UTXO_PREFIX) {
            entry?;
            counter += 1;
        }
        Ok(counter)
    }

    /// Drop every index entry and rebuild the view from the chain.
    pub fn reindex(&self) -> Result<(), ChainError> {
        let stale: Vec<_> = self
            .chain
            .db()
            .scan_prefix(UTXO_PREFIX)
            .keys()
            .collect::<Result<_, _>>()?;
        for key in stale {
            self.chain.db().remove(key)?;
        }

        for (tx_id, outs) in self.chain.find_all_utxo()? {
            self.chain
                .db()
                .insert(Self::key_for(&tx_id), outs.serialize())?;
        }
        self.chain.db().flush()?;

        Ok(())
    }

    /// Apply one accepted block incrementally: drop the outputs its
    /// inputs consume, then record the outputs of every transaction in
    /// the block (coinbase included).
    pub fn update(&self, block: &Block) -> Result<(), ChainError> {
        for tx in &block.transactions {
            if tx.is_coinbase() {
                continue;
            }
            for input in &tx.inputs {
                let key = Self::key_for(&input.prev_tx_id);
                let value = self
                    .chain
                    .db()
                    .get(&key)?
                    .ok_or(ChainError::TxNotFound(input.prev_tx_id))?;
                let outs = TxOutputs::deserialize(&value)?;

                let remaining = TxOutputs {
                    outputs: outs
                        .outputs
                        .into_iter()
                        .enumerate()
                        .filter(|(out_index, _)| *out_index as i32 != input.prev_out_index)
                        .map(|(_, output)| output)
                        .collect(),
                };

                if remaining.outputs.is_empty() {
                    self.chain.db().remove(&key)?;
                } else {
                    self.chain.db().insert(&key, remaining.serialize())?;
                }
            }
        }

        for tx in &block.transactions {
            let outs = TxOutputs {
                outputs: tx.outputs.clone(),
            };
            self.chain
                .db()
                .insert(Self::key_for(&tx.id), outs.serialize())?;
        }
        self.chain.db().flush()?;

        Ok(())
    }
}
