// Durable header and coin index storage

mod coin;
mod memory;
mod sled_store;

pub use coin::Coin;
pub use memory::MemoryStorage;
pub use sled_store::SledStorage;

use crate::core::{Hash256, Network, OutPoint};
use crate::error::{Error, Result};

/// Layout version written on first open
pub const STORAGE_VERSION: u32 = 1;

/// Storage backend selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StorageKind {
    /// Durable sled database under the data directory
    Sled,
    /// Process-local maps, lost on exit
    Memory,
}

/// Header list and address→coin index.
///
/// Every call is atomic and visible to the next call from the same process.
/// Mutations of a coin address it by outpoint and apply to every address
/// recorded for that outpoint.
pub trait Storage: Send + Sync {
    fn info(&self, key: &str) -> Result<Option<String>>;
    fn put_info(&self, key: &str, value: &str) -> Result<()>;

    fn push_header(&self, header_hex: &str, height: u32) -> Result<()>;
    /// Remove the highest header; no-op when none is stored
    fn pop_header(&self) -> Result<()>;
    /// Every stored header in height order
    fn all_headers(&self) -> Result<Vec<String>>;

    fn add_coin(&self, address: &str, outpoint: &OutPoint, value: u64, height: u32) -> Result<()>;
    fn remove_coin(&self, outpoint: &OutPoint) -> Result<()>;
    /// Mark spent; unknown outpoints (coinbase, non-standard outputs) are ignored
    fn set_spent(&self, outpoint: &OutPoint, spent_by: &Hash256, height: u32) -> Result<()>;
    fn set_unspent(&self, outpoint: &OutPoint) -> Result<()>;

    /// Addresses owning an outpoint, empty when it is not indexed
    fn addresses_for(&self, outpoint: &OutPoint) -> Result<Vec<String>>;
    /// Transaction recorded as spending `outpoint` in an indexed block
    fn spender(&self, outpoint: &OutPoint) -> Result<Option<Hash256>>;
    fn coins(&self, address: &str) -> Result<Vec<Coin>>;
    /// Addresses with a coin created or spent at `height`, deduplicated
    fn touched_addresses_at(&self, height: u32) -> Result<Vec<String>>;

    /// Record version and network on first open, verify them afterwards
    fn handshake(&self, network: Network) -> Result<()> {
        let version = match self.info("version")? {
            Some(version) => version,
            None => {
                self.put_info("version", &STORAGE_VERSION.to_string())?;
                self.put_info("network", network.name())?;
                log::info!("Initialized storage (version {}, {})", STORAGE_VERSION, network);
                return Ok(());
            }
        };

        if version != STORAGE_VERSION.to_string() {
            return Err(Error::VersionMismatch {
                expected: STORAGE_VERSION,
                found: version,
            });
        }

        match self.info("network")? {
            Some(stored) if stored == network.name() => Ok(()),
            stored => Err(Error::UnsupportedNetwork {
                expected: network.name().to_string(),
                found: stored.unwrap_or_else(|| "none".to_string()),
            }),
        }
    }
}
