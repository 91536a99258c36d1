//! Oxide chain core library.
//!
//! A proof-of-work UTXO ledger: blocks link by SHA-256 hash, outputs are
//! pay-to-public-key-hash over P-256 ECDSA, peers gossip blocks and
//! transactions over a TCP overlay, and miners extend the chain for a
//! halving subsidy.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod mempool;
pub mod mining;
pub mod p2p;
pub mod rpc;
pub mod storage;
pub mod tx;
pub mod wallet;

/// Protocol constants. Changing any of these forks the chain.
pub mod constants {
    /// Mining reward before the first halving.
    pub const INITIAL_SUBSIDY: u64 = 50;

    /// Blocks between subsidy halvings.
    pub const HALVING_INTERVAL: i64 = 210_000;

    /// Hard cap on total coins, implied by the halving schedule.
    pub const MAX_SUPPLY: u64 = 21_000_000;

    /// Difficulty of every block after genesis: the block digest must be
    /// below `2^(256 - DIFFICULTY)`.
    pub const DIFFICULTY: u32 = 22;

    /// Lower difficulty for the genesis block so chain creation is quick.
    pub const GENESIS_DIFFICULTY: u32 = 16;

    /// Coinbase data embedded in the genesis transaction.
    pub const GENESIS_DATA: &str = "First Transaction from Genesis";

    /// Store key holding the current tip hash.
    pub const TIP_KEY: &[u8] = b"lh";

    /// Key prefix namespacing UTXO index entries in the store.
    pub const UTXO_PREFIX: &[u8] = b"utxo-";

    /// Wire protocol version exchanged in the handshake.
    pub const PROTOCOL_VERSION: u32 = 1;

    /// Capacity of the miner interrupt channel. Producers drop tokens
    /// when the buffer is full; one pending token is enough.
    pub const INTERRUPT_BUFFER: usize = 10;

    /// Fixed width of the command field in a wire frame.
    pub const COMMAND_LENGTH: usize = 12;

    /// Default P2P listen port.
    pub const DEFAULT_PORT: u16 = 3000;

    /// Default seed peer when `SEED_NODE` is unset.
    pub const DEFAULT_SEED: &str = "localhost:3000";

    /// Address version byte prepended before Base58Check encoding.
    pub const ADDRESS_VERSION: u8 = 0x00;

    /// Length of the Base58Check checksum.
    pub const CHECKSUM_LENGTH: usize = 4;
}
