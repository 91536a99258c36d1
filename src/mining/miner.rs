//! The continuous miner.
//!
//! One loop per mining node: snapshot the mempool, re-verify each
//! candidate, prepend a fresh coinbase, and run the PoW search on a
//! blocking thread with the shared interrupt receiver. A peer's accepted
//! block interrupts the search; the working set is discarded and the loop
//! starts over on the new tip. Empty pools still produce coinbase-only
//! blocks, which is what keeps emission moving.

use crossbeam_channel::Receiver;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::consensus::Block;
use crate::constants::DIFFICULTY;
use crate::p2p::Node;
use crate::storage::ChainError;
use crate::tx::Transaction;

pub struct Miner {
    node: Arc<Node>,
    interrupt_rx: Receiver<()>,
    reward_addr: String,
    difficulty: u32,
}

impl Miner {
    pub fn new(node: Arc<Node>, interrupt_rx: Receiver<()>, reward_addr: String) -> Self {
        Self {
            node,
            interrupt_rx,
            reward_addr,
            difficulty: DIFFICULTY,
        }
    }

    /// Mine at a non-network difficulty. Tests use this to keep searches
    /// fast; production nodes stay on the default.
    pub fn with_difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// Run forever. Store failures abort the current attempt and the
    /// loop restarts; an invalid pooled transaction is evicted so it
    /// cannot wedge block production.
    pub async fn run(self) {
        info!("mining enabled, rewards go to {}", self.reward_addr);

        loop {
            match self.mine_once().await {
                Ok(Some(_)) | Ok(None) => {}
                Err(ChainError::InvalidTransaction(id)) => {
                    warn!("evicting invalid transaction {} from mempool", id);
                    self.node.mempool().remove(&id);
                }
                Err(e) => {
                    error!("mining attempt failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
    }

    /// One mining attempt. `Ok(None)` means the search was interrupted
    /// by an accepted block.
    pub async fn mine_once(&self) -> Result<Option<Block>, ChainError> {
        let mut transactions: Vec<Transaction> = Vec::new();
        for tx in self.node.mempool().snapshot() {
            match self.node.chain().verify_transaction(&tx)? {
                true => transactions.push(tx),
                false => warn!("dropping invalid mempool transaction {}", tx.id),
            }
        }

        let height = self.node.chain().best_height()? + 1;
        let coinbase = Transaction::coinbase(&self.reward_addr, None, height)
            .map_err(ChainError::from)?;
        transactions.insert(0, coinbase);

        if transactions.len() == 1 {
            info!("mining coinbase-only block at height {}", height);
        } else {
            info!(
                "mining block at height {} with {} transaction(s)",
                height,
                transactions.len() - 1
            );
        }

        let chain = self.node.chain().clone();
        let interrupt = self.interrupt_rx.clone();
        let difficulty = self.difficulty;
        let mined = tokio::task::spawn_blocking(move || {
            chain.mine_block_with_difficulty(transactions, difficulty, Some(&interrupt))
        })
        .await
        .expect("mining task panicked")?;

        let block = match mined {
            Some(block) => block,
            None => {
                info!("mining interrupted, a peer's block won this round");
                return Ok(None);
            }
        };

        self.node.utxos().reindex()?;
        for tx in &block.transactions {
            if !tx.is_coinbase() {
                self.node.mempool().remove(&tx.id);
            }
        }

        info!("mined block {} at height {}", block.hash, block.height);
        self.node.broadcast_block(&block).await;

        Ok(Some(block))
    }
}
