//! PAC node
//!
//! Loads the chain for the configured network, then mines up to the last
//! PoW height and stakes after it until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pac_core::config::{DevnetConfig, Network, NodeConfig};
use pac_core::constants::{COIN, STAKE_TIMESTAMP_MASK};
use pac_core::mining::{unix_time, Miner, MiningResult, Staker};
use pac_core::node::{GenesisInfo, Node};
use pac_core::storage::ChainView;
use pac_core::wallet::Wallet;
use parking_lot::Mutex;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pac-node", about = "PAC hybrid PoW/PoS node")]
struct Args {
    /// Config file; defaults are used when it does not exist
    #[arg(short, long, default_value = "pac.toml")]
    config: PathBuf,

    #[arg(short, long, value_enum)]
    network: Option<Network>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Produce PoS blocks once past the last PoW height
    #[arg(long)]
    staking: bool,

    /// Devnet only: override the PoS target spacing in seconds
    #[arg(long)]
    pos_target_spacing: Option<String>,

    /// Write the effective config to the config path and exit
    #[arg(long)]
    generate_config: bool,
}

fn load_config(args: &Args) -> Result<NodeConfig, Box<dyn std::error::Error>> {
    let mut config = if args.config.exists() {
        NodeConfig::load(&args.config)?
    } else {
        NodeConfig::default()
    };

    if let Some(network) = args.network {
        config.network = network;
    }
    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }
    if args.staking {
        config.staking = true;
    }
    if let Some(spacing) = &args.pos_target_spacing {
        config.devnet = Some(DevnetConfig { pos_target_spacing: Some(spacing.clone()) });
    }
    Ok(config)
}

fn load_wallet(config: &NodeConfig) -> Result<Wallet, Box<dyn std::error::Error>> {
    let path = config.data_dir.join("wallet.dat");
    if path.exists() {
        return Ok(Wallet::load(&path)?);
    }
    let mut wallet = Wallet::new();
    let address = wallet.generate_key().address.clone();
    wallet.save(&path)?;
    info!(%address, "created wallet");
    Ok(wallet)
}

/// Mine one PoW block across all cores
async fn mine_once(node: &Arc<Mutex<Node>>, miner: &Miner, threads: usize) -> Option<pac_core::consensus::Block> {
    let (template, params) = {
        let node = node.lock();
        let template = miner.assemble_block(node.chain(), node.params(), vec![], None, unix_time())?;
        (template, node.params().clone())
    };

    let (tx, mut rx) = tokio::sync::mpsc::channel(threads);
    miner.reset();
    for i in 0..threads {
        let worker = miner.clone();
        let tx = tx.clone();
        let params = params.clone();
        let mut block = template.clone();
        block.header.nonce = i as u64 * (u64::MAX / threads as u64);
        tokio::task::spawn_blocking(move || {
            let _ = tx.blocking_send(worker.mine_block(block, &params));
        });
    }
    drop(tx);

    while let Some(result) = rx.recv().await {
        if let MiningResult::Success(block) = result {
            miner.stop();
            return Some(block);
        }
    }
    None
}

async fn stake_once(node: &Arc<Mutex<Node>>, wallet: &Arc<Wallet>, staker: &Staker) -> Option<pac_core::consensus::Block> {
    let node = Arc::clone(node);
    let wallet = Arc::clone(wallet);
    let staker = staker.clone();
    let result = tokio::task::spawn_blocking(move || {
        let node = node.lock();
        staker.stake_block(node.chain(), &wallet, node.params(), vec![], None, unix_time())
    })
    .await;

    match result {
        Ok(MiningResult::Success(block)) => Some(block),
        Ok(_) => None,
        Err(err) => {
            error!(%err, "staking task failed");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args)?;

    if args.generate_config {
        config.save(&args.config)?;
        println!("wrote {}", args.config.display());
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let params = config.consensus_params()?;
    let genesis = GenesisInfo::new(&params);
    info!(
        network = %params.network,
        genesis = %genesis.hash,
        bits = %format_args!("{:#010x}", genesis.bits),
        port = params.default_port,
        last_pow_block = params.last_pow_block,
        "starting node"
    );

    let node = Arc::new(Mutex::new(Node::open(&config)?));
    let wallet = Arc::new(load_wallet(&config)?);
    let reward_key = wallet.get_pubkey_hashes().first().copied().ok_or("wallet holds no keys")?;

    let miner = Miner::new(reward_key);
    let staker = Staker::new(config.stake_search_window_secs);
    let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let staking = config.staking;

    let producer = {
        let node = Arc::clone(&node);
        let miner = miner.clone();
        let staker = staker.clone();
        tokio::spawn(async move {
            loop {
                let pow_phase = {
                    let node = node.lock();
                    node.height() < node.params().last_pow_block
                };

                let block = if pow_phase {
                    mine_once(&node, &miner, threads).await
                } else if staking {
                    stake_once(&node, &wallet, &staker).await
                } else {
                    None
                };

                let Some(block) = block else {
                    sleep(Duration::from_secs(STAKE_TIMESTAMP_MASK + 1)).await;
                    continue;
                };

                {
                    let mut node = node.lock();
                    match node.process_block(&block) {
                        Ok(index) => {
                            let balance = wallet.get_balance(&node.chain().utxo_set);
                            info!(
                                height = index.height,
                                tip = %index.hash,
                                pos = index.is_proof_of_stake(),
                                balance = balance / COIN,
                                "produced block"
                            );
                        }
                        Err(err) => warn!(%err, "produced block not accepted"),
                    }
                }

                if !pow_phase {
                    sleep(Duration::from_secs(1)).await;
                }
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    miner.stop();
    staker.stop();
    producer.abort();

    let node = node.lock();
    info!(height = node.height(), tip = %node.chain().tip().hash, "stopped");
    Ok(())
}
