//! The chain store.
//!
//! One sled tree holds everything: block bytes under their hash, the
//! current tip hash under the distinguished key `lh`, and the UTXO index
//! under the `utxo-` prefix (see `storage::utxo`). Iteration walks
//! `prev_hash` links from the tip back to genesis.

use log::info;
use sled::transaction::TransactionError;
use sled::Db;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::consensus::{validate_pow, Block};
use crate::constants::{DIFFICULTY, GENESIS_DATA, TIP_KEY};
use crate::crypto::{Hash, KeyPair};
use crate::tx::{Transaction, TxError, TxOutputs};

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("store error: {0}")]
    Store(#[from] sled::Error),
    #[error("corrupt store entry: {0}")]
    Codec(#[from] bincode::Error),
    #[error("block {0} not found")]
    BlockNotFound(Hash),
    #[error("transaction {0} not found")]
    TxNotFound(Hash),
    #[error("no existing blockchain found")]
    NoChain,
    #[error("invalid transaction {0}")]
    InvalidTransaction(Hash),
    #[error(transparent)]
    Tx(#[from] TxError),
}

/// Outcome of offering a block received from the network to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockAccept {
    /// Persisted and now the tip.
    Accepted,
    /// Hash already present; nothing to do.
    AlreadyKnown,
    /// More than one height ahead of the local tip; dropped.
    Ahead,
    /// At or below the local tip height; dropped.
    Stale,
    /// Height fits but the digest misses the target derived from the
    /// block's stored difficulty.
    InvalidPow,
}

/// Handle to the chain store. Cheap to clone; all clones share the same
/// underlying sled tree.
#[derive(Debug, Clone)]
pub struct Blockchain {
    db: Db,
}

impl Blockchain {
    /// Open the store at `path`, mining a genesis block rewarding
    /// `address` if the store is empty. Re-running against a non-empty
    /// store just loads the existing tip.
    pub fn create<P: AsRef<Path>>(path: P, address: &str) -> Result<Self, ChainError> {
        let db = sled::open(path)?;
        Self::bootstrap(db, address)
    }

    /// Open an existing store; fails with `NoChain` when no tip exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ChainError> {
        let db = sled::open(path)?;
        let chain = Self { db };
        if chain.tip_hash()?.is_none() {
            return Err(ChainError::NoChain);
        }
        Ok(chain)
    }

    /// Open the store tolerating emptiness. A node started this way has
    /// height -1 and will adopt a genesis block synced from peers.
    pub fn open_or_empty<P: AsRef<Path>>(path: P) -> Result<Self, ChainError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// In-memory store with a mined genesis; for tests.
    pub fn create_temporary(address: &str) -> Result<Self, ChainError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::bootstrap(db, address)
    }

    /// Empty in-memory store; for tests.
    pub fn open_temporary() -> Result<Self, ChainError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn bootstrap(db: Db, address: &str) -> Result<Self, ChainError> {
        let chain = Self { db };
        if chain.tip_hash()?.is_none() {
            info!("no existing blockchain found, mining genesis block");
            let coinbase =
                Transaction::coinbase(address, Some(GENESIS_DATA.as_bytes().to_vec()), 0)?;
            let genesis = Block::genesis(coinbase);
            chain.persist_block(&genesis)?;
            info!("genesis created: {}", genesis.hash);
        }
        Ok(chain)
    }

    /// The underlying sled tree, shared with the UTXO index.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Current tip hash, if a chain exists.
    pub fn tip_hash(&self) -> Result<Option<Hash>, ChainError> {
        match self.db.get(TIP_KEY)? {
            Some(bytes) => {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&bytes);
                Ok(Some(Hash(hash)))
            }
            None => Ok(None),
        }
    }

    /// Current tip block; `NoChain` when the store is empty.
    pub fn tip(&self) -> Result<Block, ChainError> {
        let hash = self.tip_hash()?.ok_or(ChainError::NoChain)?;
        self.get_block(&hash)
    }

    /// Height of the tip, or -1 for an empty store.
    pub fn best_height(&self) -> Result<i64, ChainError> {
        match self.tip_hash()? {
            Some(hash) => Ok(self.get_block(&hash)?.height),
            None => Ok(-1),
        }
    }

    pub fn get_block(&self, hash: &Hash) -> Result<Block, ChainError> {
        let bytes = self
            .db
            .get(hash.0)?
            .ok_or(ChainError::BlockNotFound(*hash))?;
        Ok(Block::deserialize(&bytes)?)
    }

    /// All block hashes, tip first.
    pub fn block_hashes(&self) -> Result<Vec<Hash>, ChainError> {
        let mut hashes = Vec::new();
        for block in self.iter()? {
            hashes.push(block?.hash);
        }
        Ok(hashes)
    }

    /// Iterate blocks from the tip back to genesis.
    pub fn iter(&self) -> Result<ChainIterator, ChainError> {
        Ok(ChainIterator {
            db: self.db.clone(),
            current: self.tip_hash()?,
        })
    }

    /// Linear scan for a transaction by id.
    pub fn find_transaction(&self, id: &Hash) -> Result<Transaction, ChainError> {
        for block in self.iter()? {
            for tx in block?.transactions {
                if tx.id == *id {
                    return Ok(tx);
                }
            }
        }
        Err(ChainError::TxNotFound(*id))
    }

    /// Atomically write a block and point the tip at it. The pairing is a
    /// single sled transaction so no reader ever observes a tip without
    /// its block.
    fn persist_block(&self, block: &Block) -> Result<(), ChainError> {
        let bytes = block.serialize();
        let result: Result<(), TransactionError<()>> = self.db.transaction(|txdb| {
            txdb.insert(&block.hash.0[..], bytes.as_slice())?;
            txdb.insert(TIP_KEY, &block.hash.0[..])?;
            Ok(())
        });
        result.map_err(|e| match e {
            TransactionError::Storage(e) => ChainError::Store(e),
            TransactionError::Abort(()) => unreachable!("transaction never aborts"),
        })?;
        self.db.flush()?;
        Ok(())
    }

    /// Mine a block of `transactions` on top of the current tip at the
    /// network difficulty. Returns `Ok(None)` when the search is
    /// interrupted.
    pub fn mine_block(
        &self,
        transactions: Vec<Transaction>,
        interrupt: Option<&crossbeam_channel::Receiver<()>>,
    ) -> Result<Option<Block>, ChainError> {
        self.mine_block_with_difficulty(transactions, DIFFICULTY, interrupt)
    }

    /// Difficulty-parameterized variant of `mine_block`; tests use low
    /// difficulties to keep the search fast.
    pub fn mine_block_with_difficulty(
        &self,
        transactions: Vec<Transaction>,
        difficulty: u32,
        interrupt: Option<&crossbeam_channel::Receiver<()>>,
    ) -> Result<Option<Block>, ChainError> {
        for tx in &transactions {
            if !self.verify_transaction(tx)? {
                return Err(ChainError::InvalidTransaction(tx.id));
            }
        }

        let tip = self.tip()?;
        let block = Block::mine_with_difficulty(
            transactions,
            tip.hash,
            tip.height + 1,
            difficulty,
            interrupt,
        );

        match block {
            Some(block) => {
                self.persist_block(&block)?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// Offer a block received from the network.
    ///
    /// Only the direct successor of the tip is eligible (an empty store
    /// counts as height -1, so a synced genesis fits). The proof of work
    /// is rechecked from the block's stored difficulty and merkle root.
    pub fn accept_block(&self, block: &Block) -> Result<BlockAccept, ChainError> {
        if self.db.get(block.hash.0)?.is_some() {
            return Ok(BlockAccept::AlreadyKnown);
        }

        let height = self.best_height()?;
        if block.height > height + 1 {
            return Ok(BlockAccept::Ahead);
        }
        if block.height < height + 1 {
            return Ok(BlockAccept::Stale);
        }

        if !validate_pow(block) {
            return Ok(BlockAccept::InvalidPow);
        }

        self.persist_block(block)?;
        Ok(BlockAccept::Accepted)
    }

    /// Sign every input of `tx`, resolving the referenced transactions
    /// from the chain.
    pub fn sign_transaction(&self, tx: &mut Transaction, keypair: &KeyPair) -> Result<(), ChainError> {
        let prev_txs = self.previous_transactions(tx)?;
        tx.sign(keypair, &prev_txs)?;
        Ok(())
    }

    /// Verify `tx` against the chain. A reference to a transaction the
    /// chain does not contain makes the transaction invalid.
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool, ChainError> {
        if tx.is_coinbase() {
            return Ok(true);
        }

        let prev_txs = match self.previous_transactions(tx) {
            Ok(map) => map,
            Err(ChainError::TxNotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(tx.verify(&prev_txs))
    }

    fn previous_transactions(
        &self,
        tx: &Transaction,
    ) -> Result<HashMap<Hash, Transaction>, ChainError> {
        let mut prev_txs = HashMap::new();
        for input in &tx.inputs {
            let prev = self.find_transaction(&input.prev_tx_id)?;
            prev_txs.insert(prev.id, prev);
        }
        Ok(prev_txs)
    }

    /// Walk the whole chain and collect, per transaction, the outputs not
    /// consumed by any later input. Source data for `UtxoSet::reindex`.
    pub fn find_all_utxo(&self) -> Result<HashMap<Hash, TxOutputs>, ChainError> {
        let mut utxo: HashMap<Hash, TxOutputs> = HashMap::new();
        let mut spent: HashMap<Hash, HashSet<i32>> = HashMap::new();

        // Tip-to-genesis order: a spending input is always seen before
        // the output it consumes.
        for block in self.iter()? {
            let block = block?;
            for tx in &block.transactions {
                for (out_index, output) in tx.outputs.iter().enumerate() {
                    let is_spent = spent
                        .get(&tx.id)
                        .map(|outs| outs.contains(&(out_index as i32)))
                        .unwrap_or(false);
                    if !is_spent {
                        utxo.entry(tx.id).or_default().outputs.push(output.clone());
                    }
                }

                if !tx.is_coinbase() {
                    for input in &tx.inputs {
                        spent
                            .entry(input.prev_tx_id)
                            .or_default()
                            .insert(input.prev_out_index);
                    }
                }
            }
        }

        Ok(utxo)
    }
}

/// Iterator over blocks, tip to genesis.
pub struct ChainIterator {
    db: Db,
    current: Option<Hash>,
}

impl Iterator for ChainIterator {
    type Item = Result<Block, ChainError>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current?;

        let bytes = match self.db.get(hash.0) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.current = None;
                return Some(Err(ChainError::BlockNotFound(hash)));
            }
            Err(e) => {
                self.current = None;
                return Some(Err(e.into()));
            }
        };

        match Block::deserialize(&bytes) {
            Ok(block) => {
                self.current = if block.prev_hash.is_zero() {
                    None
                } else {
                    Some(block.prev_hash)
                };
                Some(Ok(block))
            }
            Err(e) => {
                self.current = None;
                Some(Err(e.into()))
            }
        }
    }
}
