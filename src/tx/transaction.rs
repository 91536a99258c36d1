//! Transactions over the UTXO model.
//!
//! A transaction consumes previous outputs through signed inputs and
//! creates new outputs locked to public-key hashes. The coinbase of each
//! block has a sentinel input and mints the height-determined subsidy.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::consensus::block_reward;
use crate::crypto::{hash_pub_key, sha256, verify_signature, Hash, KeyPair};
use crate::storage::{Blockchain, ChainError, UtxoSet};
use crate::wallet::{pub_key_hash_from_address, Wallets};

/// Size of the random coinbase data used when the caller supplies none.
const COINBASE_DATA_LENGTH: usize = 24;

#[derive(Debug, Error)]
pub enum TxError {
    #[error("not enough funds: have {have}, need {need}")]
    NotEnoughFunds { have: u64, need: u64 },
    #[error("address is not valid")]
    InvalidAddress,
    #[error("no wallet for address {0}")]
    UnknownWallet(String),
    #[error("previous transaction is not known")]
    PrevTxNotFound,
}

/// Reference to a previous output, plus the proof of ownership.
///
/// The coinbase sentinel has a zero `prev_tx_id`, index `-1`, no signature,
/// and arbitrary data in the `pubkey` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxInput {
    pub prev_tx_id: Hash,
    pub prev_out_index: i32,
    pub signature: Vec<u8>,
    pub pubkey: Vec<u8>,
}

/// A value locked to a 20-byte public-key hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub pubkey_hash: Vec<u8>,
}

impl TxOutput {
    /// Create an output locked to the pubkey hash decoded from `address`.
    pub fn new(value: u64, address: &str) -> Result<TxOutput, TxError> {
        let pubkey_hash = pub_key_hash_from_address(address).ok_or(TxError::InvalidAddress)?;
        Ok(TxOutput { value, pubkey_hash })
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pubkey_hash == pub_key_hash
    }
}

/// The value stored per transaction id in the UTXO index: the outputs of
/// that transaction still unspent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxOutputs {
    pub outputs: Vec<TxOutput>,
}

impl TxOutputs {
    pub fn serialize(&self) -> Vec<u8> {
        bincode::serialize(self).expect("outputs serialization is infallible")
    }

    pub fn deserialize(bytes: &[u8]) -> Result<TxOutputs, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Hash,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Build a coinbase transaction paying `block_reward(height)` to the
    /// recipient. When `data` is `None`, 24 random bytes are used so two
    /// coinbases at the same height still get distinct ids.
    pub fn coinbase(to: &str, data: Option<Vec<u8>>, height: i64) -> Result<Transaction, TxError> {
        let data = data.unwrap_or_else(|| {
            let mut random = vec![0u8; COINBASE_DATA_LENGTH];
            OsRng.fill_bytes(&mut random);
            random
        });

        let input = TxInput {
            prev_tx_id: Hash::zero(),
            prev_out_index: -1,
            signature: Vec::new(),
            pubkey: data,
        };
        let output = TxOutput::new(block_reward(height), to)?;

        let mut tx = Transaction {
            id: Hash::zero(),
            inputs: vec![input],
            outputs: vec![output],
        };
        tx.id = tx.hash();
        Ok(tx)
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].prev_tx_id.is_zero()
            && self.inputs[0].prev_out_index == -1
    }

    /// SHA-256 of this transaction's serialization with the id cleared.
    pub fn hash(&self) -> Hash {
        let mut copy = self.clone();
        copy.id = Hash::zero();
        sha256(&copy.serialize())
    }

    pub fn serialize(&self) -> Vec<u8> {
        bincode::serialize(self).expect("transaction serialization is infallible")
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Copy with every input's signature and pubkey cleared; the signing
    /// and verification digests are computed over mutations of this copy.
    pub fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .inputs
            .iter()
            .map(|input| TxInput {
                prev_tx_id: input.prev_tx_id,
                prev_out_index: input.prev_out_index,
                signature: Vec::new(),
                pubkey: Vec::new(),
            })
            .collect();

        Transaction {
            id: self.id,
            inputs,
            outputs: self.outputs.clone(),
        }
    }

    /// Sign every input with the sender's key.
    ///
    /// Per input, the digest is the hash of the trimmed copy carrying the
    /// spent output's pubkey hash in that input's pubkey slot. `prev_txs`
    /// must contain every referenced transaction.
    pub fn sign(
        &mut self,
        keypair: &KeyPair,
        prev_txs: &HashMap<Hash, Transaction>,
    ) -> Result<(), TxError> {
        if self.is_coinbase() {
            return Ok(());
        }

        for input in &self.inputs {
            if !prev_txs.contains_key(&input.prev_tx_id) {
                return Err(TxError::PrevTxNotFound);
            }
        }

        let mut trimmed = self.trimmed_copy();

        for i in 0..self.inputs.len() {
            let prev_tx = &prev_txs[&self.inputs[i].prev_tx_id];
            let spent = prev_tx
                .outputs
                .get(self.inputs[i].prev_out_index as usize)
                .ok_or(TxError::PrevTxNotFound)?;

            trimmed.inputs[i].signature = Vec::new();
            trimmed.inputs[i].pubkey = spent.pubkey_hash.clone();
            trimmed.id = trimmed.hash();
            trimmed.inputs[i].pubkey = Vec::new();

            self.inputs[i].signature = keypair.sign(&trimmed.id);
        }

        Ok(())
    }

    /// Verify every input signature by reconstructing the per-input digest.
    /// A coinbase is trivially valid; an unresolvable or out-of-range
    /// reference makes the transaction invalid.
    pub fn verify(&self, prev_txs: &HashMap<Hash, Transaction>) -> bool {
        if self.is_coinbase() {
            return true;
        }

        let mut trimmed = self.trimmed_copy();

        for (i, input) in self.inputs.iter().enumerate() {
            let prev_tx = match prev_txs.get(&input.prev_tx_id) {
                Some(tx) => tx,
                None => return false,
            };
            let spent = match prev_tx.outputs.get(input.prev_out_index as usize) {
                Some(output) => output,
                None => return false,
            };

            trimmed.inputs[i].signature = Vec::new();
            trimmed.inputs[i].pubkey = spent.pubkey_hash.clone();
            trimmed.id = trimmed.hash();
            trimmed.inputs[i].pubkey = Vec::new();

            if !verify_signature(&input.pubkey, &trimmed.id, &input.signature) {
                return false;
            }
        }

        true
    }
}

/// Build and sign a transfer of `amount` from `from` to `to`.
///
/// Spendable outputs are gathered from the UTXO index until the amount is
/// covered; any excess comes back as a change output. Fails without side
/// effects when the sender's total is insufficient.
pub fn new_transaction(
    wallets: &Wallets,
    from: &str,
    to: &str,
    amount: u64,
    chain: &Blockchain,
    utxos: &UtxoSet,
) -> Result<Transaction, ChainError> {
    let wallet = wallets
        .get_wallet(from)
        .ok_or_else(|| TxError::UnknownWallet(from.to_string()))?;
    let pubkey_hash = hash_pub_key(wallet.public_key());

    let (accumulated, spendable) = utxos.find_spendable(&pubkey_hash, amount)?;
    if accumulated < amount {
        return Err(TxError::NotEnoughFunds {
            have: accumulated,
            need: amount,
        }
        .into());
    }

    let mut inputs = Vec::new();
    for (tx_id, out_indices) in spendable {
        for out_index in out_indices {
            inputs.push(TxInput {
                prev_tx_id: tx_id,
                prev_out_index: out_index,
                signature: Vec::new(),
                pubkey: wallet.public_key().to_vec(),
            });
        }
    }

    let mut outputs = vec![TxOutput::new(amount, to).map_err(ChainError::from)?];
    if accumulated > amount {
        outputs.push(TxOutput::new(accumulated - amount, from).map_err(ChainError::from)?);
    }

    let mut tx = Transaction {
        id: Hash::zero(),
        inputs,
        outputs,
    };
    tx.id = tx.hash();
    chain.sign_transaction(&mut tx, wallet.keypair())?;

    Ok(tx)
}
