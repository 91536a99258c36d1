//! The node: TCP server, protocol handlers, and broadcast primitives.
//!
//! One owning struct carries everything the handlers touch: chain store,
//! UTXO index, mempool, peer set, wallet collection, the miner interrupt
//! sender, and the in-transit block list used during initial sync. Each
//! inbound connection is served by a short-lived task that reads exactly
//! one message.

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::consensus::Block;
use crate::constants::{INTERRUPT_BUFFER, PROTOCOL_VERSION};
use crate::crypto::Hash;
use crate::mempool::Mempool;
use crate::p2p::{
    decode_payload, frame, frame_empty, parse_frame, AddrMsg, BlockMsg, GetBlocksMsg, GetDataMsg,
    InvKind, InvMsg, PeerSet, TxMsg, VersionMsg, CMD_ADDR, CMD_BLOCK, CMD_GET_BLOCKS,
    CMD_GET_DATA, CMD_INV, CMD_PING, CMD_PONG, CMD_TX, CMD_VERSION,
};
use crate::storage::{BlockAccept, Blockchain, UtxoSet};
use crate::tx::Transaction;
use crate::wallet::Wallets;

/// Shared node state. Handlers, the miner, and the HTTP façade all hold
/// an `Arc<Node>`.
pub struct Node {
    /// Address announced to peers.
    addr: String,
    chain: Blockchain,
    utxos: UtxoSet,
    mempool: Mempool,
    peers: PeerSet,
    wallets: Wallets,
    mining_addr: Option<String>,
    interrupt_tx: Sender<()>,
    /// Block hashes announced but not yet fetched during initial sync.
    blocks_in_transit: Mutex<Vec<Vec<u8>>>,
}

impl Node {
    /// Build the node and the miner's interrupt receiver.
    pub fn new(
        addr: String,
        seed: String,
        chain: Blockchain,
        wallets: Wallets,
        mining_addr: Option<String>,
    ) -> (Arc<Node>, Receiver<()>) {
        let (interrupt_tx, interrupt_rx) = bounded(INTERRUPT_BUFFER);
        let utxos = UtxoSet::new(chain.clone());

        let node = Arc::new(Node {
            addr,
            chain,
            utxos,
            mempool: Mempool::new(),
            peers: PeerSet::new(seed),
            wallets,
            mining_addr,
            interrupt_tx,
            blocks_in_transit: Mutex::new(Vec::new()),
        });

        (node, interrupt_rx)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    pub fn wallets(&self) -> &Wallets {
        &self.wallets
    }

    pub fn mining_addr(&self) -> Option<&str> {
        self.mining_addr.as_deref()
    }

    /// Accept loop. Binds `listen_addr`, introduces the node to the seed
    /// peer, then serves each inbound connection in its own task.
    pub async fn run(self: Arc<Self>, listen_addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(listen_addr).await?;
        info!("node {} listening on {}", self.addr, listen_addr);

        if let Some(seed) = self.peers.seed() {
            if seed != self.addr {
                info!("introducing ourselves to seed {}", seed);
                self.send_version(&seed).await;
            }
        }

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let node = Arc::clone(&self);
                    tokio::spawn(async move {
                        node.handle_connection(stream).await;
                    });
                }
                Err(e) => warn!("failed to accept connection: {}", e),
            }
        }
    }

    /// Read one message to EOF and dispatch it.
    pub async fn handle_connection(&self, mut stream: TcpStream) {
        let mut request = Vec::new();
        if let Err(e) = stream.read_to_end(&mut request).await {
            warn!("failed to read request: {}", e);
            return;
        }

        let (command, payload) = match parse_frame(&request) {
            Some(parsed) => parsed,
            None => {
                warn!("dropping runt frame of {} bytes", request.len());
                return;
            }
        };
        debug!("received {} command", command);

        match command.as_str() {
            CMD_VERSION => self.handle_version(payload).await,
            CMD_GET_BLOCKS => self.handle_get_blocks(payload).await,
            CMD_INV => self.handle_inv(payload).await,
            CMD_GET_DATA => self.handle_get_data(payload).await,
            CMD_BLOCK => self.handle_block(payload).await,
            CMD_TX => self.handle_tx(payload).await,
            CMD_ADDR => self.handle_addr(payload).await,
            CMD_PING => self.handle_ping(&mut stream).await,
            other => warn!("unknown command {:?}", other),
        }
    }

    /// Handshake: record the peer, compare heights, share our peer list.
    async fn handle_version(&self, payload: &[u8]) {
        let msg: VersionMsg = match decode_payload(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("bad version payload: {}", e);
                return;
            }
        };

        let our_height = match self.chain.best_height() {
            Ok(height) => height,
            Err(e) => {
                error!("cannot read chain height: {}", e);
                return;
            }
        };

        if self.peers.add(msg.addr_from.clone()) {
            info!(
                "added peer {} ({} known)",
                msg.addr_from,
                self.peers.len()
            );
        }
        debug!(
            "version from {}: height {} (ours {})",
            msg.addr_from, msg.best_height, our_height
        );

        if our_height < msg.best_height {
            self.send_get_blocks(&msg.addr_from).await;
        } else if our_height > msg.best_height {
            self.send_version(&msg.addr_from).await;
        }

        self.send_addr(&msg.addr_from).await;
    }

    /// Serve our tip-to-genesis hash list as a block inventory.
    async fn handle_get_blocks(&self, payload: &[u8]) {
        let msg: GetBlocksMsg = match decode_payload(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("bad getblocks payload: {}", e);
                return;
            }
        };

        let hashes = match self.chain.block_hashes() {
            Ok(hashes) => hashes,
            Err(e) => {
                error!("cannot list block hashes: {}", e);
                return;
            }
        };

        let items = hashes.into_iter().map(|hash| hash.0.to_vec()).collect();
        self.send_inv(&msg.addr_from, InvKind::Block, items).await;
    }

    /// Start draining an announced block list, or fetch an unseen
    /// transaction.
    async fn handle_inv(&self, payload: &[u8]) {
        let msg: InvMsg = match decode_payload(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("bad inv payload: {}", e);
                return;
            }
        };
        debug!("inventory: {} {:?} item(s)", msg.items.len(), msg.kind);

        let first = match msg.items.first() {
            Some(first) => first.clone(),
            None => return,
        };

        match msg.kind {
            InvKind::Block => {
                {
                    let mut transit = self.blocks_in_transit.lock().unwrap();
                    *transit = msg.items[1..].to_vec();
                }
                self.send_get_data(&msg.addr_from, InvKind::Block, first)
                    .await;
            }
            InvKind::Tx => {
                let Some(id) = hash_from_bytes(&first) else {
                    warn!("inv carries malformed transaction id");
                    return;
                };
                if !self.mempool.contains(&id) {
                    self.send_get_data(&msg.addr_from, InvKind::Tx, first).await;
                }
            }
        }
    }

    /// Serve one block from the store or one transaction from the pool.
    /// Unknown ids get no reply.
    async fn handle_get_data(&self, payload: &[u8]) {
        let msg: GetDataMsg = match decode_payload(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("bad getdata payload: {}", e);
                return;
            }
        };

        let Some(id) = hash_from_bytes(&msg.id) else {
            warn!("getdata carries malformed id");
            return;
        };

        match msg.kind {
            InvKind::Block => match self.chain.get_block(&id) {
                Ok(block) => self.send_block(&msg.addr_from, &block).await,
                Err(e) => debug!("no block to serve for {}: {}", id, e),
            },
            InvKind::Tx => {
                if let Some(tx) = self.mempool.get(&id) {
                    self.send_tx(&msg.addr_from, &tx).await;
                } else {
                    debug!("no mempool transaction {}", id);
                }
            }
        }
    }

    /// Block ingress: try to accept, then continue the in-transit drain
    /// or rebuild the UTXO index.
    async fn handle_block(&self, payload: &[u8]) {
        let msg: BlockMsg = match decode_payload(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("bad block payload: {}", e);
                return;
            }
        };
        let block = match Block::deserialize(&msg.block) {
            Ok(block) => block,
            Err(e) => {
                warn!("undecodable block from {}: {}", msg.addr_from, e);
                return;
            }
        };
        debug!("received block {} at height {}", block.hash, block.height);

        let mut accepted = false;
        match self.chain.accept_block(&block) {
            Ok(BlockAccept::Accepted) => {
                info!("accepted block {} at height {}", block.hash, block.height);
                accepted = true;
            }
            Ok(BlockAccept::Ahead) => {
                let ours = self.chain.best_height().unwrap_or(-1);
                warn!(
                    "missing blocks: received height {} but tip is {}",
                    block.height, ours
                );
            }
            Ok(BlockAccept::Stale) | Ok(BlockAccept::AlreadyKnown) => {
                debug!("block {} already known or outdated", block.hash);
            }
            Ok(BlockAccept::InvalidPow) => {
                warn!("rejected block {}: proof-of-work check failed", block.hash);
            }
            Err(e) => {
                // A failed write near the tip pointer is not recoverable;
                // stop before anything can diverge from disk.
                error!("fatal store failure while accepting block: {}", e);
                std::process::exit(1);
            }
        }

        if accepted {
            if let Err(e) = self.utxos.reindex() {
                error!("utxo reindex failed: {}", e);
            }
            // Non-blocking: a full buffer means a token is already pending.
            let _ = self.interrupt_tx.try_send(());
        }

        let next = {
            let mut transit = self.blocks_in_transit.lock().unwrap();
            if transit.is_empty() {
                None
            } else {
                Some(transit.remove(0))
            }
        };

        match next {
            Some(hash) => {
                self.send_get_data(&msg.addr_from, InvKind::Block, hash)
                    .await;
            }
            None => {
                if !accepted {
                    if let Err(e) = self.utxos.reindex() {
                        error!("utxo reindex failed: {}", e);
                    }
                }
            }
        }
    }

    /// Transaction ingress: verify against the chain, then pool it.
    /// Mining is a separate continuous loop and is not triggered here.
    async fn handle_tx(&self, payload: &[u8]) {
        let msg: TxMsg = match decode_payload(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("bad tx payload: {}", e);
                return;
            }
        };
        let tx = match Transaction::deserialize(&msg.tx) {
            Ok(tx) => tx,
            Err(e) => {
                warn!("undecodable transaction from {}: {}", msg.addr_from, e);
                return;
            }
        };

        match self.chain.verify_transaction(&tx) {
            Ok(true) => {
                let id = tx.id;
                if self.mempool.insert(tx) {
                    info!(
                        "transaction {} pooled (mempool size {})",
                        id,
                        self.mempool.len()
                    );
                }
            }
            Ok(false) => warn!("rejected invalid transaction {}", tx.id),
            Err(e) => error!("cannot verify transaction {}: {}", tx.id, e),
        }
    }

    /// Address exchange: adopt unknown peers and introduce ourselves.
    async fn handle_addr(&self, payload: &[u8]) {
        let msg: AddrMsg = match decode_payload(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("bad addr payload: {}", e);
                return;
            }
        };

        for addr in msg.addresses {
            if addr != self.addr && self.peers.add(addr.clone()) {
                info!("discovered peer {} ({} known)", addr, self.peers.len());
                self.send_version(&addr).await;
            }
        }
    }

    /// Liveness: answer a ping on the same connection.
    async fn handle_ping(&self, stream: &mut TcpStream) {
        if let Err(e) = stream.write_all(&frame_empty(CMD_PONG)).await {
            warn!("failed to answer ping: {}", e);
        }
    }

    /// Send a raw frame to a peer. One connection per message; a connect
    /// failure drops the address from the peer set.
    async fn send_data(&self, addr: &str, data: Vec<u8>) {
        let mut stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("peer {} unreachable, removing: {}", addr, e);
                self.peers.remove(addr);
                return;
            }
        };

        if let Err(e) = stream.write_all(&data).await {
            warn!("failed to send to {}: {}", addr, e);
            return;
        }
        let _ = stream.shutdown().await;
    }

    pub async fn send_version(&self, addr: &str) {
        let best_height = match self.chain.best_height() {
            Ok(height) => height,
            Err(e) => {
                error!("cannot read chain height: {}", e);
                return;
            }
        };
        let msg = VersionMsg {
            version: PROTOCOL_VERSION,
            best_height,
            addr_from: self.addr.clone(),
        };
        self.send_data(addr, frame(CMD_VERSION, &msg)).await;
    }

    async fn send_get_blocks(&self, addr: &str) {
        let msg = GetBlocksMsg {
            addr_from: self.addr.clone(),
        };
        self.send_data(addr, frame(CMD_GET_BLOCKS, &msg)).await;
    }

    async fn send_inv(&self, addr: &str, kind: InvKind, items: Vec<Vec<u8>>) {
        let msg = InvMsg {
            addr_from: self.addr.clone(),
            kind,
            items,
        };
        self.send_data(addr, frame(CMD_INV, &msg)).await;
    }

    async fn send_get_data(&self, addr: &str, kind: InvKind, id: Vec<u8>) {
        let msg = GetDataMsg {
            addr_from: self.addr.clone(),
            kind,
            id,
        };
        self.send_data(addr, frame(CMD_GET_DATA, &msg)).await;
    }

    async fn send_block(&self, addr: &str, block: &Block) {
        let msg = BlockMsg {
            addr_from: self.addr.clone(),
            block: block.serialize(),
        };
        self.send_data(addr, frame(CMD_BLOCK, &msg)).await;
    }

    async fn send_tx(&self, addr: &str, tx: &Transaction) {
        let msg = TxMsg {
            addr_from: self.addr.clone(),
            tx: tx.serialize(),
        };
        self.send_data(addr, frame(CMD_TX, &msg)).await;
    }

    async fn send_addr(&self, addr: &str) {
        let msg = AddrMsg {
            addresses: self.peers.all(),
        };
        self.send_data(addr, frame(CMD_ADDR, &msg)).await;
    }

    /// Send a transaction to every known peer except ourselves.
    pub async fn broadcast_tx(&self, tx: &Transaction) {
        for peer in self.peers.broadcast_targets(&self.addr) {
            self.send_tx(&peer, tx).await;
        }
    }

    /// Announce a block to every known peer except ourselves.
    pub async fn broadcast_block(&self, block: &Block) {
        let targets = self.peers.broadcast_targets(&self.addr);
        debug!(
            "broadcasting block {} to {} peer(s)",
            block.height,
            targets.len()
        );
        for peer in targets {
            self.send_inv(&peer, InvKind::Block, vec![block.hash.0.to_vec()])
                .await;
        }
    }
}

fn hash_from_bytes(bytes: &[u8]) -> Option<Hash> {
    if bytes.len() != 32 {
        return None;
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(bytes);
    Some(Hash(hash))
}
