//! Mempool of validated, not-yet-mined transactions.
//!
//! A mutex-guarded map from transaction id to transaction. Callers verify
//! transactions against the chain before inserting. The pool is unbounded;
//! a block acceptance removes the mined ids, and conflicting entries are
//! left to fail re-verification when the miner next drains the pool.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::crypto::Hash;
use crate::tx::Transaction;

#[derive(Debug, Default)]
pub struct Mempool {
    pool: Mutex<HashMap<Hash, Transaction>>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction keyed by its id. Returns false when the id
    /// was already present.
    pub fn insert(&self, tx: Transaction) -> bool {
        let mut pool = self.pool.lock().unwrap();
        pool.insert(tx.id, tx).is_none()
    }

    pub fn remove(&self, id: &Hash) -> Option<Transaction> {
        self.pool.lock().unwrap().remove(id)
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.pool.lock().unwrap().contains_key(id)
    }

    pub fn get(&self, id: &Hash) -> Option<Transaction> {
        self.pool.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.pool.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.lock().unwrap().is_empty()
    }

    /// Clone out the current contents; the miner works on this snapshot
    /// while the pool keeps taking insertions.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.pool.lock().unwrap().values().cloned().collect()
    }
}
