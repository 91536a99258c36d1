//! Node configuration from the environment.
//!
//! `NODE_ID` selects a per-node subdirectory so several nodes can share a
//! machine; `BLOCKCHAIN_DATA_DIR` moves the whole data root; `SEED_NODE`
//! names the first known peer; `NODE_ADDR` overrides the address the node
//! announces to peers (defaults to the listen address).

use std::env;
use std::path::PathBuf;

use crate::constants::DEFAULT_SEED;

#[derive(Debug, Clone)]
pub struct Config {
    pub node_id: Option<String>,
    pub seed_node: String,
    pub node_addr: Option<String>,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let non_empty = |value: Option<String>| value.filter(|s| !s.is_empty());

        Self {
            node_id: non_empty(lookup("NODE_ID")),
            seed_node: non_empty(lookup("SEED_NODE")).unwrap_or_else(|| DEFAULT_SEED.to_string()),
            node_addr: non_empty(lookup("NODE_ADDR")),
            data_dir: non_empty(lookup("BLOCKCHAIN_DATA_DIR"))
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./tmp")),
        }
    }

    fn node_dir(&self) -> PathBuf {
        match &self.node_id {
            Some(id) => self.data_dir.join(id),
            None => self.data_dir.clone(),
        }
    }

    /// Directory of the sled store.
    pub fn db_path(&self) -> PathBuf {
        self.node_dir().join("blocks")
    }

    /// Path of the wallet file.
    pub fn wallet_path(&self) -> PathBuf {
        self.node_dir().join("wallets.dat")
    }

    /// Address announced to peers for a node listening on `port`.
    pub fn announce_addr(&self, port: u16) -> String {
        self.node_addr
            .clone()
            .unwrap_or_else(|| format!("localhost:{}", port))
    }
}
