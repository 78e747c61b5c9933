// Upstream full node access

#[cfg(test)]
mod mock;
mod rpc;

#[cfg(test)]
pub use mock::MockUpstream;
pub use rpc::BitcoindClient;

use crate::core::{Block, Hash256, Transaction};
use crate::error::Result;
use async_trait::async_trait;

/// Trusted validating node the index is derived from.
///
/// Blocks and transactions returned here are not validated again.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Chain the node runs on ("main", "test", "regtest", ...)
    async fn chain_name(&self) -> Result<String>;

    /// Height of the node's best block
    async fn tip_height(&self) -> Result<u32>;

    async fn block_hash(&self, height: u32) -> Result<Hash256>;

    /// Full block, including blocks no longer on the active chain
    async fn block(&self, hash: &Hash256) -> Result<Block>;

    /// Confirmation height, `None` while the transaction is unconfirmed
    async fn transaction_height(&self, txid: &Hash256) -> Result<Option<u32>>;

    async fn raw_mempool(&self) -> Result<Vec<Hash256>>;

    /// Raw transaction hex
    async fn raw_transaction(&self, txid: &Hash256) -> Result<String>;

    /// Fetch several transactions at once. Transactions the node no longer
    /// knows (evicted or mined and pruned from its mempool) are left out.
    async fn raw_transactions(&self, txids: &[Hash256]) -> Result<Vec<Transaction>>;

    /// Relay a raw transaction, returning its txid
    async fn send_raw_transaction(&self, tx_hex: &str) -> Result<Hash256>;

    /// Fee rate in coins per kilobyte for confirmation within `blocks`,
    /// `None` when the node has no estimate
    async fn estimate_fee(&self, blocks: u32) -> Result<Option<f64>>;

    /// Height and hash of the node's best block
    async fn tip(&self) -> Result<(u32, Hash256)> {
        let height = self.tip_height().await?;
        let hash = self.block_hash(height).await?;
        Ok((height, hash))
    }
}
