// Chain indexer: address index over a bitcoind-compatible node
// for thin wallet clients

pub mod chain;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod query;
pub mod server;
pub mod storage;
pub mod sync;
pub mod upstream;

#[cfg(test)]
mod test_utils;

// Re-exports for convenience
pub use chain::HeaderChain;
pub use cli::{Cli, CliHandler};
pub use config::Config;
pub use crate::core::{Block, BlockHeader, Hash256, Network, OutPoint, Transaction};
pub use error::{Error, ErrorKind, Result};
pub use query::Indexer;
pub use server::Server;
pub use storage::{Coin, MemoryStorage, SledStorage, Storage};
pub use sync::{CancelFlag, Event, EventBus, SyncEngine};
pub use upstream::{BitcoindClient, Upstream};
