//! Transaction module - UTXO value transfers with P-256 ECDSA signatures

mod transaction;

pub use transaction::*;
