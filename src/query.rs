// Read side of the index, as served to thin clients

use crate::chain::merkle_branch;
use crate::core::script::is_valid_address;
use crate::core::{sha256, BlockHeader, Hash256, Network, OutPoint, Transaction};
use crate::error::{Error, Result};
use crate::storage::{Coin, Storage};
use crate::sync::{SharedState, SyncStatus};
use crate::upstream::Upstream;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;

/// Decoded block header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderInfo {
    pub block_height: u32,
    pub version: u32,
    /// `None` for genesis
    pub prev_block_hash: Option<String>,
    pub merkle_root: String,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

/// One transaction affecting an address; height 0 means unconfirmed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub tx_hash: String,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Balance {
    pub confirmed: u64,
    /// Net unconfirmed change, negative when unconfirmed spends dominate
    pub unconfirmed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unspent {
    pub tx_hash: String,
    pub tx_pos: u32,
    pub value: u64,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MerkleResult {
    pub block_height: u32,
    pub merkle: Vec<String>,
    pub pos: usize,
}

/// Queries over the header chain, the coin index and the mempool overlay
pub struct Indexer<S, U> {
    storage: Arc<S>,
    upstream: Arc<U>,
    state: SharedState,
    network: Network,
}

impl<S: Storage, U: Upstream> Indexer<S, U> {
    pub fn new(storage: Arc<S>, upstream: Arc<U>, state: SharedState, network: Network) -> Self {
        Self {
            storage,
            upstream,
            state,
            network,
        }
    }

    pub fn block_count(&self) -> u32 {
        self.state.chain.read().height()
    }

    pub fn header(&self, height: u32) -> Result<String> {
        Ok(self.state.chain.read().header_at(height)?.to_string())
    }

    pub fn header_info(&self, height: u32) -> Result<HeaderInfo> {
        let header = BlockHeader::from_hex(&self.header(height)?)?;
        let prev = header.prev_block_hash;
        Ok(HeaderInfo {
            block_height: height,
            version: header.version,
            prev_block_hash: (!prev.is_zero()).then(|| prev.to_hex()),
            merkle_root: header.merkle_root.to_hex(),
            timestamp: header.timestamp,
            bits: header.bits,
            nonce: header.nonce,
        })
    }

    pub fn chunk(&self, index: u32) -> Result<String> {
        Ok(self.state.chain.read().chunk_at(index)?.to_string())
    }

    pub fn sync_status(&self) -> SyncStatus {
        *self.state.status.read()
    }

    /// Confirmed and unconfirmed coins of `address`
    pub fn coins(&self, address: &str) -> Result<Vec<Coin>> {
        if !is_valid_address(address, self.network) {
            return Err(Error::Decode(format!("invalid {} address: {}", self.network, address)));
        }
        let durable = self.storage.coins(address)?;
        Ok(self.state.overlay.read().merge_coins(address, durable))
    }

    /// Addresses owning output `index` of `txid`
    pub fn addresses_for(&self, txid: &Hash256, index: u32) -> Result<Vec<String>> {
        self.storage.addresses_for(&OutPoint::new(*txid, index))
    }

    /// Transactions creating or spending the address's coins, confirmed ones
    /// by ascending height, unconfirmed ones last
    pub fn history(&self, address: &str) -> Result<Vec<HistoryEntry>> {
        let mut entries: Vec<(Hash256, u32)> = Vec::new();
        let mut seen = HashSet::new();
        for coin in self.coins(address)? {
            let mut events = vec![(coin.outpoint.txid, coin.height)];
            if let (Some(txid), Some(height)) = (coin.spent_by, coin.spent_height) {
                events.push((txid, height));
            }
            for event in events {
                if seen.insert(event) {
                    entries.push(event);
                }
            }
        }

        entries.sort_by_key(|(_, height)| if *height == 0 { u32::MAX } else { *height });
        Ok(entries
            .into_iter()
            .map(|(txid, height)| HistoryEntry {
                tx_hash: txid.to_hex(),
                height,
            })
            .collect())
    }

    pub fn balance(&self, address: &str) -> Result<Balance> {
        let mut balance = Balance::default();
        for coin in self.coins(address)? {
            match (coin.is_confirmed(), coin.spent_height) {
                (true, None) => balance.confirmed += coin.value,
                (true, Some(0)) => balance.unconfirmed -= coin.value as i64,
                (false, None) => balance.unconfirmed += coin.value as i64,
                _ => {}
            }
        }
        Ok(balance)
    }

    /// Coins not spent by any transaction, confirmed or not
    pub fn unspent(&self, address: &str) -> Result<Vec<Unspent>> {
        Ok(self
            .coins(address)?
            .into_iter()
            .filter(|coin| !coin.is_spent())
            .map(|coin| Unspent {
                tx_hash: coin.outpoint.txid.to_hex(),
                tx_pos: coin.outpoint.index,
                value: coin.value,
                height: coin.height,
            })
            .collect())
    }

    /// Digest clients compare to detect history changes; `None` when the
    /// address has no history
    pub fn address_status(&self, address: &str) -> Result<Option<String>> {
        let history = self.history(address)?;
        if history.is_empty() {
            return Ok(None);
        }
        let mut joined = String::new();
        for entry in &history {
            let _ = write!(joined, "{}:{}:", entry.tx_hash, entry.height);
        }
        Ok(Some(hex::encode(sha256(joined.as_bytes()))))
    }

    /// Inclusion proof of `txid` in the indexed block at `height`, or at the
    /// height upstream reports when none is given
    pub async fn merkle_proof(&self, txid: &Hash256, height: Option<u32>) -> Result<MerkleResult> {
        let height = match height {
            Some(height) => height,
            None => self
                .upstream
                .transaction_height(txid)
                .await?
                .ok_or_else(|| Error::NotFound(format!("transaction {} is unconfirmed", txid)))?,
        };

        let header = BlockHeader::from_hex(&self.header(height)?)?;
        let block = self.upstream.block(&header.hash()).await?;
        let proof = merkle_branch(&block.txids(), txid)?;

        Ok(MerkleResult {
            block_height: height,
            merkle: proof.branch.iter().map(Hash256::to_hex).collect(),
            pos: proof.pos,
        })
    }

    pub async fn raw_transaction(&self, txid: &Hash256) -> Result<String> {
        self.upstream.raw_transaction(txid).await
    }

    /// Relay a raw transaction; malformed input is rejected before it reaches upstream
    pub async fn broadcast(&self, tx_hex: &str) -> Result<Hash256> {
        let tx = Transaction::from_hex(tx_hex)?;
        let txid = self.upstream.send_raw_transaction(tx_hex).await?;
        log::info!("Broadcast transaction {}", tx.txid());
        Ok(txid)
    }

    pub async fn estimate_fee(&self, blocks: u32) -> Result<Option<f64>> {
        self.upstream.estimate_fee(blocks).await
    }
}
