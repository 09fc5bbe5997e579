#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use nanochain::api;
use nanochain::config::load_config;
use nanochain::node::Node;
use nanochain::state::State;
use nanochain::wallet;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "nanochain", about = "A minimal proof-of-work blockchain node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the node: coordinator, miner, and HTTP API.
    Run {
        /// Path to the TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Generate a new keystore account.
    WalletNew {
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },
    /// Print all balances recorded in the local ledger.
    Balances {
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run { config } => run(config.as_deref()).await,
        Command::WalletNew { data_dir } => wallet_new(&data_dir),
        Command::Balances { data_dir } => balances(&data_dir),
    };

    if let Err(e) = result {
        error!(error = %e, "exiting with error");
        std::process::exit(1);
    }
}

async fn run(config_path: Option<&std::path::Path>) -> nanochain::error::Result<()> {
    let config = load_config(config_path)?;
    let addr: SocketAddr = format!("{}:{}", config.node.ip, config.node.port)
        .parse()
        .map_err(|e| {
            nanochain::error::ChainError::Config(format!("invalid listen address: {}", e))
        })?;

    let (node, channels) = Node::new(&config)?;

    let shutdown = node.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    let coordinator = tokio::spawn(node.clone().run_coordinator(channels));
    api::serve(node, addr).await?;

    // The API returns once the shutdown token fires; let the coordinator
    // flush the ledger before exiting.
    let _ = coordinator.await;
    Ok(())
}

fn wallet_new(data_dir: &std::path::Path) -> nanochain::error::Result<()> {
    let wallet = wallet::new_keystore_account(data_dir)?;
    println!("new account: {}", wallet.address);
    println!(
        "keystore: {}",
        wallet::keystore_dir(data_dir)
            .join(format!("{}.json", wallet.address))
            .display()
    );
    Ok(())
}

fn balances(data_dir: &std::path::Path) -> nanochain::error::Result<()> {
    let state = State::load_from_disk(data_dir)?;

    println!("head: {}", state.latest_block_hash());
    let mut entries: Vec<_> = state.balances().iter().collect();
    entries.sort();
    for (account, balance) in entries {
        println!("{}: {}", account, balance);
    }
    Ok(())
}
