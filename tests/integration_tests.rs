//! End-to-end scenarios against in-memory stores and real sockets:
//! genesis balances, coinbase accrual, transfers, tamper detection,
//! index rebuild equivalence, and two-node convergence over TCP.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use oxide_core::crypto::hash_pub_key;
use oxide_core::mining::Miner;
use oxide_core::p2p::{frame, BlockMsg, Node, CMD_BLOCK};
use oxide_core::storage::{BlockAccept, Blockchain, UtxoSet};
use oxide_core::tx::{new_transaction, Transaction};
use oxide_core::wallet::Wallets;

const TEST_DIFFICULTY: u32 = 8;

struct TestBench {
    chain: Blockchain,
    utxos: UtxoSet,
    wallets: Wallets,
    miner_addr: String,
    _dir: tempfile::TempDir,
}

fn bench() -> TestBench {
    let dir = tempfile::tempdir().unwrap();
    let mut wallets = Wallets::load(dir.path().join("wallets.dat")).unwrap();
    let miner_addr = wallets.create_wallet();

    let chain = Blockchain::create_temporary(&miner_addr).unwrap();
    let utxos = UtxoSet::new(chain.clone());
    utxos.reindex().unwrap();

    TestBench {
        chain,
        utxos,
        wallets,
        miner_addr,
        _dir: dir,
    }
}

fn pkh(bench: &TestBench, address: &str) -> Vec<u8> {
    hash_pub_key(bench.wallets.get_wallet(address).unwrap().public_key())
}

fn mine(bench: &TestBench, extra: Vec<Transaction>) -> oxide_core::consensus::Block {
    let height = bench.chain.best_height().unwrap() + 1;
    let coinbase = Transaction::coinbase(&bench.miner_addr, None, height).unwrap();
    let mut txs = vec![coinbase];
    txs.extend(extra);
    let block = bench
        .chain
        .mine_block_with_difficulty(txs, TEST_DIFFICULTY, None)
        .unwrap()
        .unwrap();
    bench.utxos.reindex().unwrap();
    block
}

/// S1: a fresh chain holds one coinbase worth 50 for its creator.
#[test]
fn test_genesis_balance() {
    let bench = bench();

    assert_eq!(bench.chain.best_height().unwrap(), 0);
    assert_eq!(bench.utxos.count().unwrap(), 1);
    assert_eq!(
        bench.utxos.balance(&pkh(&bench, &bench.miner_addr)).unwrap(),
        50
    );
}

/// S2: one empty-mempool mining round pays another full subsidy.
#[test]
fn test_coinbase_accrual() {
    let bench = bench();
    let block = mine(&bench, vec![]);

    assert_eq!(block.height, 1);
    assert_eq!(block.transactions.len(), 1);
    assert_eq!(bench.chain.best_height().unwrap(), 1);
    assert_eq!(
        bench.utxos.balance(&pkh(&bench, &bench.miner_addr)).unwrap(),
        100
    );
}

/// S3: a 10-coin transfer leaves the sender with change plus the new
/// subsidy and the receiver with the amount.
#[test]
fn test_transfer() {
    let mut bench = bench();
    let receiver = bench.wallets.create_wallet();

    let tx = new_transaction(
        &bench.wallets,
        &bench.miner_addr,
        &receiver,
        10,
        &bench.chain,
        &bench.utxos,
    )
    .unwrap();
    mine(&bench, vec![tx]);

    assert_eq!(
        bench.utxos.balance(&pkh(&bench, &bench.miner_addr)).unwrap(),
        90
    );
    assert_eq!(bench.utxos.balance(&pkh(&bench, &receiver)).unwrap(), 10);
}

/// Overspending fails up front and mutates nothing.
#[test]
fn test_overspend_rejected() {
    let mut bench = bench();
    let receiver = bench.wallets.create_wallet();

    let result = new_transaction(
        &bench.wallets,
        &bench.miner_addr,
        &receiver,
        51,
        &bench.chain,
        &bench.utxos,
    );

    assert!(result.is_err());
    assert_eq!(bench.chain.best_height().unwrap(), 0);
    assert_eq!(
        bench.utxos.balance(&pkh(&bench, &bench.miner_addr)).unwrap(),
        50
    );
}

/// S6: a signed transfer verifies; flipping one byte of an output value
/// breaks it.
#[test]
fn test_tamper_detection() {
    let mut bench = bench();
    let receiver = bench.wallets.create_wallet();

    let tx = new_transaction(
        &bench.wallets,
        &bench.miner_addr,
        &receiver,
        10,
        &bench.chain,
        &bench.utxos,
    )
    .unwrap();
    assert!(bench.chain.verify_transaction(&tx).unwrap());

    let mut tampered = tx.clone();
    tampered.outputs[0].value ^= 0x01;
    assert!(!bench.chain.verify_transaction(&tampered).unwrap());
}

/// Incremental updates after each block equal a full rebuild.
#[test]
fn test_incremental_update_equals_reindex() {
    let mut bench = bench();
    let receiver = bench.wallets.create_wallet();

    // Block 1: coinbase only, applied incrementally.
    let height = bench.chain.best_height().unwrap() + 1;
    let coinbase = Transaction::coinbase(&bench.miner_addr, None, height).unwrap();
    let block1 = bench
        .chain
        .mine_block_with_difficulty(vec![coinbase], TEST_DIFFICULTY, None)
        .unwrap()
        .unwrap();
    bench.utxos.update(&block1).unwrap();

    // Block 2: spend 30, applied incrementally.
    let tx = new_transaction(
        &bench.wallets,
        &bench.miner_addr,
        &receiver,
        30,
        &bench.chain,
        &bench.utxos,
    )
    .unwrap();
    let height = bench.chain.best_height().unwrap() + 1;
    let coinbase = Transaction::coinbase(&bench.miner_addr, None, height).unwrap();
    let block2 = bench
        .chain
        .mine_block_with_difficulty(vec![coinbase, tx], TEST_DIFFICULTY, None)
        .unwrap()
        .unwrap();
    bench.utxos.update(&block2).unwrap();

    let miner_balance = bench.utxos.balance(&pkh(&bench, &bench.miner_addr)).unwrap();
    let receiver_balance = bench.utxos.balance(&pkh(&bench, &receiver)).unwrap();
    let entries = bench.utxos.count().unwrap();

    bench.utxos.reindex().unwrap();

    assert_eq!(
        bench.utxos.balance(&pkh(&bench, &bench.miner_addr)).unwrap(),
        miner_balance
    );
    assert_eq!(
        bench.utxos.balance(&pkh(&bench, &receiver)).unwrap(),
        receiver_balance
    );
    assert_eq!(bench.utxos.count().unwrap(), entries);
    assert_eq!(miner_balance + receiver_balance, 150);
}

/// A replica fed blocks one by one reaches the same tip.
#[test]
fn test_replica_convergence_by_acceptance() {
    let bench = bench();
    let replica = Blockchain::open_temporary().unwrap();

    let genesis = bench.chain.iter().unwrap().last().unwrap().unwrap();
    assert_eq!(
        replica.accept_block(&genesis).unwrap(),
        BlockAccept::Accepted
    );

    for _ in 0..3 {
        let block = mine(&bench, vec![]);
        assert_eq!(replica.accept_block(&block).unwrap(), BlockAccept::Accepted);
    }

    assert_eq!(replica.best_height().unwrap(), 3);
    assert_eq!(
        replica.tip_hash().unwrap().unwrap(),
        bench.chain.tip_hash().unwrap().unwrap()
    );
}

async fn wait_for_height(chain: &Blockchain, height: i64) -> bool {
    for _ in 0..100 {
        if chain.best_height().unwrap() >= height {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

/// S4-style: a fresh node syncs genesis through the handshake, then
/// follows broadcast blocks to the same tip.
#[tokio::test]
async fn test_two_nodes_converge_over_tcp() {
    let bench = bench();
    let addr1 = "127.0.0.1:47811";
    let addr2 = "127.0.0.1:47812";

    let wallets1 = Wallets::load(bench._dir.path().join("w1.dat")).unwrap();
    let (node1, _rx1) = Node::new(
        addr1.to_string(),
        addr1.to_string(),
        bench.chain.clone(),
        wallets1,
        None,
    );

    let chain2 = Blockchain::open_temporary().unwrap();
    let wallets2 = Wallets::load(bench._dir.path().join("w2.dat")).unwrap();
    let (node2, _rx2) = Node::new(
        addr2.to_string(),
        addr1.to_string(),
        chain2.clone(),
        wallets2,
        None,
    );

    tokio::spawn(Arc::clone(&node1).run(addr1));
    tokio::time::sleep(Duration::from_millis(300)).await;
    tokio::spawn(Arc::clone(&node2).run(addr2));

    // The handshake pulls genesis across.
    assert!(wait_for_height(&chain2, 0).await, "genesis did not sync");

    // Two mined-and-broadcast blocks follow.
    for expected in 1..=2 {
        let block = mine(&bench, vec![]);
        node1.broadcast_block(&block).await;
        assert!(
            wait_for_height(&chain2, expected).await,
            "height {} did not propagate",
            expected
        );
    }

    assert_eq!(
        chain2.tip_hash().unwrap().unwrap(),
        bench.chain.tip_hash().unwrap().unwrap()
    );
}

/// S5-style: a competing block delivered over the wire interrupts a
/// running search within its poll interval.
#[tokio::test]
async fn test_block_delivery_interrupts_miner() {
    let bench = bench();
    let addr2 = "127.0.0.1:47821";

    // Node 2 starts from the same genesis.
    let chain2 = Blockchain::open_temporary().unwrap();
    let genesis = bench.chain.iter().unwrap().last().unwrap().unwrap();
    chain2.accept_block(&genesis).unwrap();

    let wallets2 = Wallets::load(bench._dir.path().join("w2.dat")).unwrap();
    let miner_wallet = oxide_core::wallet::Wallet::new();
    let (node2, interrupt_rx) = Node::new(
        addr2.to_string(),
        addr2.to_string(),
        chain2.clone(),
        wallets2,
        Some(miner_wallet.address()),
    );
    tokio::spawn(Arc::clone(&node2).run(addr2));
    tokio::time::sleep(Duration::from_millis(200)).await;

    // An unwinnable search: only an accepted block can end it.
    let miner = Miner::new(Arc::clone(&node2), interrupt_rx, miner_wallet.address())
        .with_difficulty(255);
    let search = tokio::spawn(async move { miner.mine_once().await });
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Node 1 wins the race and delivers its block over TCP.
    let block = mine(&bench, vec![]);
    let msg = BlockMsg {
        addr_from: "127.0.0.1:47822".to_string(),
        block: block.serialize(),
    };
    let mut stream = TcpStream::connect(addr2).await.unwrap();
    stream.write_all(&frame(CMD_BLOCK, &msg)).await.unwrap();
    stream.shutdown().await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(10), search)
        .await
        .expect("search was not interrupted")
        .unwrap()
        .unwrap();

    assert!(outcome.is_none(), "interrupted search must yield no block");
    assert_eq!(chain2.best_height().unwrap(), 1);
    assert_eq!(
        chain2.tip_hash().unwrap().unwrap(),
        bench.chain.tip_hash().unwrap().unwrap()
    );
}
