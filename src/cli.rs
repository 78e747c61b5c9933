// CLI commands

use crate::chain::HeaderChain;
use crate::config::{Config, ConfigArgs};
use crate::core::{BlockHeader, Hash256};
use crate::error::{Error, Result};
use crate::query::Indexer;
use crate::server;
use crate::storage::{SledStorage, Storage, StorageKind};
use crate::sync::SharedState;
use crate::upstream::BitcoindClient;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "chain-indexer")]
#[command(about = "Address index over a bitcoind-compatible node", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync with the upstream node and follow its tip until interrupted
    Run,

    /// Show what the local index holds
    Info,

    /// Print a decoded header
    Header {
        height: u32,
    },

    /// Print balance, history and unspent coins of an address
    Address {
        address: String,
    },

    /// Merkle inclusion proof for a confirmed transaction
    Proof {
        txid: String,
        /// Block height (asks upstream when omitted)
        #[arg(long)]
        height: Option<u32>,
    },

    /// Relay a raw transaction through the upstream node
    Broadcast {
        tx_hex: String,
    },
}

#[derive(Serialize)]
struct AddressReport {
    address: String,
    balance: crate::query::Balance,
    status: Option<String>,
    history: Vec<crate::query::HistoryEntry>,
    unspent: Vec<crate::query::Unspent>,
}

/// CLI handler
pub struct CliHandler {
    config: Config,
}

impl CliHandler {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Handle CLI command
    pub async fn handle(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Run => server::run(self.config.clone()).await,
            Commands::Info => self.info(),
            Commands::Header { height } => {
                let info = self.open()?.header_info(height)?;
                print_json(&info)
            }
            Commands::Address { address } => self.address(address),
            Commands::Proof { txid, height } => {
                let txid = Hash256::from_hex(&txid)?;
                let proof = self.open()?.merkle_proof(&txid, height).await?;
                print_json(&proof)
            }
            Commands::Broadcast { tx_hex } => {
                let txid = self.open()?.broadcast(&tx_hex).await?;
                println!("{}", txid);
                Ok(())
            }
        }
    }

    /// Query facade over the on-disk index, without syncing
    fn open(&self) -> Result<Indexer<SledStorage, BitcoindClient>> {
        if self.config.storage == StorageKind::Memory {
            return Err(Error::Storage(
                "memory storage keeps nothing between runs; use --storage sled".to_string(),
            ));
        }

        let storage = Arc::new(SledStorage::new(self.config.index_path())?);
        storage.handshake(self.config.network)?;
        let chain = HeaderChain::from_headers(storage.all_headers()?)?;

        let upstream = Arc::new(BitcoindClient::new(
            &self.config.rpc_url,
            self.config.rpc_user.clone(),
            self.config.rpc_password.clone(),
            self.config.rpc_timeout,
        )?);

        Ok(Indexer::new(
            storage,
            upstream,
            SharedState::new(chain),
            self.config.network,
        ))
    }

    fn info(&self) -> Result<()> {
        let indexer = self.open()?;
        let height = indexer.block_count();

        println!("Index Info:");
        println!("  Network: {}", self.config.network);
        println!("  Path: {}", self.config.index_path().display());
        println!("  Blocks: {}", height);
        if height > 0 {
            let tip = BlockHeader::from_hex(&indexer.header(height - 1)?)?;
            println!("  Tip: {}", tip.hash());
            println!("  Tip time: {}", tip.timestamp);
        }

        Ok(())
    }

    fn address(&self, address: String) -> Result<()> {
        let indexer = self.open()?;
        let report = AddressReport {
            balance: indexer.balance(&address)?,
            status: indexer.address_status(&address)?,
            history: indexer.history(&address)?,
            unspent: indexer.unspent(&address)?,
            address,
        };
        print_json(&report)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
