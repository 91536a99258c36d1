//! Oxide node command-line interface.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::sync::Arc;

use oxide_core::config::Config;
use oxide_core::consensus::validate_pow;
use oxide_core::constants::DEFAULT_PORT;
use oxide_core::mining::Miner;
use oxide_core::p2p::Node;
use oxide_core::rpc;
use oxide_core::storage::{Blockchain, UtxoSet};
use oxide_core::tx::{new_transaction, Transaction};
use oxide_core::wallet::{pub_key_hash_from_address, validate_address, Wallets};

#[derive(Parser)]
#[command(name = "oxide-node", version, about = "Proof-of-work UTXO ledger node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
#[command(rename_all = "lowercase")]
enum Command {
    /// Create a new keypair and print its address
    Createwallet,
    /// List the addresses in the wallet file
    Listaddresses,
    /// Initialize the chain store with a genesis block rewarding ADDRESS
    Createblockchain {
        #[arg(long)]
        address: String,
    },
    /// Print the balance of an address
    Getbalance {
        #[arg(long)]
        address: String,
    },
    /// Send coins: builds, signs, and mines a transfer locally
    Send {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
    },
    /// Print the blocks in the chain, tip first
    Printchain,
    /// Rebuild the UTXO index from the chain
    Reindexutxo,
    /// Start the P2P server, optionally mining to ADDRESS
    Startnode {
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        #[arg(long)]
        miner: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Createwallet => create_wallet(&config),
        Command::Listaddresses => list_addresses(&config),
        Command::Createblockchain { address } => create_blockchain(&config, &address),
        Command::Getbalance { address } => get_balance(&config, &address),
        Command::Send { from, to, amount } => send(&config, &from, &to, amount),
        Command::Printchain => print_chain(&config),
        Command::Reindexutxo => reindex_utxo(&config),
        Command::Startnode { port, miner } => start_node(config, port, miner).await,
    }
}

fn create_wallet(config: &Config) -> Result<()> {
    let mut wallets = Wallets::load(config.wallet_path())?;
    let address = wallets.create_wallet();
    wallets.save()?;

    println!("New address: {}", address);
    Ok(())
}

fn list_addresses(config: &Config) -> Result<()> {
    let wallets = Wallets::load(config.wallet_path())?;
    for address in wallets.addresses() {
        println!("{}", address);
    }
    Ok(())
}

fn create_blockchain(config: &Config, address: &str) -> Result<()> {
    if !validate_address(address) {
        bail!("address is not valid");
    }

    let chain = Blockchain::create(config.db_path(), address)?;
    let utxos = UtxoSet::new(chain.clone());
    utxos.reindex()?;

    println!("Genesis block: {}", chain.tip()?.hash);
    println!("Finished!");
    Ok(())
}

fn get_balance(config: &Config, address: &str) -> Result<()> {
    let pubkey_hash = pub_key_hash_from_address(address).ok_or(anyhow!("address is not valid"))?;

    let chain = Blockchain::open(config.db_path())?;
    let utxos = UtxoSet::new(chain);
    let balance = utxos.balance(&pubkey_hash)?;

    println!("Balance of {}: {}", address, balance);
    Ok(())
}

fn send(config: &Config, from: &str, to: &str, amount: u64) -> Result<()> {
    if !validate_address(from) {
        bail!("from address is not valid");
    }
    if !validate_address(to) {
        bail!("to address is not valid");
    }
    if amount == 0 {
        bail!("amount must be positive");
    }

    let wallets = Wallets::load(config.wallet_path())?;
    let chain = Blockchain::open(config.db_path())?;
    let utxos = UtxoSet::new(chain.clone());

    let tx = new_transaction(&wallets, from, to, amount, &chain, &utxos)?;
    let height = chain.best_height()? + 1;
    let coinbase = Transaction::coinbase(from, None, height)?;

    let block = chain
        .mine_block(vec![coinbase, tx], None)?
        .ok_or(anyhow!("mining was interrupted"))?;
    utxos.update(&block)?;

    println!("Mined block {} at height {}", block.hash, block.height);
    println!("Success!");
    Ok(())
}

fn print_chain(config: &Config) -> Result<()> {
    let chain = Blockchain::open(config.db_path())?;

    for block in chain.iter()? {
        let block = block?;
        println!("============ Block {} ============", block.hash);
        println!("Height:     {}", block.height);
        println!("Prev hash:  {}", block.prev_hash);
        println!("Difficulty: {}", block.difficulty);
        println!("PoW valid:  {}", validate_pow(&block));
        for tx in &block.transactions {
            let kind = if tx.is_coinbase() { "coinbase" } else { "transfer" };
            println!("  tx {} ({}, {} output(s))", tx.id, kind, tx.outputs.len());
        }
        println!();
    }
    Ok(())
}

fn reindex_utxo(config: &Config) -> Result<()> {
    let chain = Blockchain::open(config.db_path())?;
    let utxos = UtxoSet::new(chain);
    utxos.reindex()?;

    println!(
        "Done! There are {} transactions in the UTXO set.",
        utxos.count()?
    );
    Ok(())
}

async fn start_node(config: Config, port: u16, miner: Option<String>) -> Result<()> {
    if let Some(reward_addr) = &miner {
        if !validate_address(reward_addr) {
            bail!("miner address is not valid");
        }
    }

    let chain = Blockchain::open_or_empty(config.db_path())?;
    if chain.best_height()? < 0 {
        info!("starting with an empty store; the chain will sync from peers");
    }
    let wallets = Wallets::load(config.wallet_path())?;

    let announce = config.announce_addr(port);
    let (node, interrupt_rx) = Node::new(
        announce,
        config.seed_node.clone(),
        chain,
        wallets,
        miner.clone(),
    );

    if let Some(reward_addr) = miner {
        let mining_node = Arc::clone(&node);
        tokio::spawn(async move {
            Miner::new(mining_node, interrupt_rx, reward_addr).run().await;
        });
    }

    let api_node = Arc::clone(&node);
    tokio::spawn(async move {
        if let Err(e) = rpc::serve(api_node, rpc::api_port(port)).await {
            log::error!("http api failed: {}", e);
        }
    });

    let listen = format!("0.0.0.0:{}", port);
    node.run(&listen).await.context("p2p server failed")?;
    Ok(())
}
