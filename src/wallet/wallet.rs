//! Keypair wallets and the on-disk wallet collection.
//!
//! The wallet file is a bincode map from address to the key record
//! `{ private_scalar, pubkey_x, pubkey_y, pubkey_raw }`. Wallets never
//! touch consensus; losing the file loses the keys, nothing else.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::crypto::{hash_pub_key, KeyError, KeyPair};
use crate::wallet::address_from_pub_key_hash;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wallet file is corrupt: {0}")]
    Codec(#[from] bincode::Error),
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// A single keypair plus its cached raw public key.
#[derive(Clone)]
pub struct Wallet {
    keypair: KeyPair,
    public_key: Vec<u8>,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Wallet({})", self.address())
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl Wallet {
    /// Generate a fresh keypair.
    pub fn new() -> Self {
        let keypair = KeyPair::generate();
        let public_key = keypair.public_key_bytes();
        Self {
            keypair,
            public_key,
        }
    }

    fn from_keypair(keypair: KeyPair) -> Self {
        let public_key = keypair.public_key_bytes();
        Self {
            keypair,
            public_key,
        }
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    /// Raw `X || Y` public key.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Base58Check address of this wallet's public key.
    pub fn address(&self) -> String {
        address_from_pub_key_hash(&hash_pub_key(&self.public_key))
    }
}

/// On-disk form of a wallet.
#[derive(Serialize, Deserialize)]
struct WalletRecord {
    private_scalar: Vec<u8>,
    pubkey_x: Vec<u8>,
    pubkey_y: Vec<u8>,
    pubkey_raw: Vec<u8>,
}

impl Serialize for Wallet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (pubkey_x, pubkey_y) = self.keypair.public_key_coords();
        WalletRecord {
            private_scalar: self.keypair.scalar_bytes(),
            pubkey_x,
            pubkey_y,
            pubkey_raw: self.public_key.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Wallet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = WalletRecord::deserialize(deserializer)?;
        let keypair = KeyPair::from_scalar_bytes(&record.private_scalar)
            .map_err(|e| D::Error::custom(e.to_string()))?;
        Ok(Wallet::from_keypair(keypair))
    }
}

/// The wallet collection backing the CLI and the HTTP send endpoint.
#[derive(Debug)]
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
    path: PathBuf,
}

impl Wallets {
    /// Load the collection from `path`; a missing file yields an empty
    /// collection that will be created on the first save.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self {
                wallets: HashMap::new(),
                path,
            });
        }

        let bytes = fs::read(&path)?;
        let wallets: HashMap<String, Wallet> = bincode::deserialize(&bytes)?;
        Ok(Self { wallets, path })
    }

    /// Generate a new wallet, insert it, and return its address. The
    /// caller decides when to `save`.
    pub fn create_wallet(&mut self) -> String {
        let wallet = Wallet::new();
        let address = wallet.address();
        self.wallets.insert(address.clone(), wallet);
        address
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.wallets.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Persist the collection to its file.
    pub fn save(&self) -> Result<(), WalletError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = bincode::serialize(&self.wallets)?;
        fs::write(&self.path, bytes)?;
        Ok(())
    }
}
