// Scripted upstream for tests

use super::Upstream;
use crate::core::{Block, Hash256, Transaction};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct State {
    /// Active chain, by height
    active: Vec<Hash256>,
    /// Every block ever served, including stale ones
    known: HashMap<Hash256, Block>,
    mempool: Vec<Transaction>,
    /// In the txid list but gone by the time it is fetched
    evicted: Vec<Hash256>,
    broadcasts: Vec<String>,
    offline: bool,
    block_requests: usize,
    batch_requests: usize,
}

/// In-memory node serving a chain that tests can extend and reorganize.
pub struct MockUpstream {
    chain: String,
    state: Mutex<State>,
}

impl MockUpstream {
    pub fn new(blocks: Vec<Block>) -> Self {
        let upstream = Self {
            chain: "main".to_string(),
            state: Mutex::new(State::default()),
        };
        upstream.set_chain(blocks);
        upstream
    }

    pub fn with_chain_name(mut self, chain: &str) -> Self {
        self.chain = chain.to_string();
        self
    }

    /// Replace the active chain; previously served blocks stay fetchable
    pub fn set_chain(&self, blocks: Vec<Block>) {
        let mut state = self.state.lock();
        state.active = blocks.iter().map(Block::hash).collect();
        for block in blocks {
            state.known.insert(block.hash(), block);
        }
    }

    pub fn push_block(&self, block: Block) {
        let mut state = self.state.lock();
        state.active.push(block.hash());
        state.known.insert(block.hash(), block);
    }

    pub fn set_mempool(&self, transactions: Vec<Transaction>) {
        self.state.lock().mempool = transactions;
    }

    pub fn evict(&self, txid: Hash256) {
        self.state.lock().evicted.push(txid);
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.state.lock().broadcasts.clone()
    }

    /// Number of `block` calls served so far
    pub fn block_requests(&self) -> usize {
        self.state.lock().block_requests
    }

    /// Number of `raw_transactions` calls served so far
    pub fn batch_requests(&self) -> usize {
        self.state.lock().batch_requests
    }

    fn check_online(&self) -> Result<()> {
        if self.state.lock().offline {
            return Err(Error::Upstream("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn chain_name(&self) -> Result<String> {
        self.check_online()?;
        Ok(self.chain.clone())
    }

    async fn tip_height(&self) -> Result<u32> {
        self.check_online()?;
        let state = self.state.lock();
        match state.active.len() {
            0 => Err(Error::Upstream("no blocks".to_string())),
            len => Ok(len as u32 - 1),
        }
    }

    async fn block_hash(&self, height: u32) -> Result<Hash256> {
        self.check_online()?;
        let state = self.state.lock();
        state
            .active
            .get(height as usize)
            .copied()
            .ok_or_else(|| Error::Upstream(format!("Block height {} out of range", height)))
    }

    async fn block(&self, hash: &Hash256) -> Result<Block> {
        self.check_online()?;
        let mut state = self.state.lock();
        state.block_requests += 1;
        state
            .known
            .get(hash)
            .cloned()
            .ok_or_else(|| Error::Upstream(format!("Block {} not found", hash)))
    }

    async fn transaction_height(&self, txid: &Hash256) -> Result<Option<u32>> {
        self.check_online()?;
        let state = self.state.lock();
        for (height, hash) in state.active.iter().enumerate() {
            let found = state
                .known
                .get(hash)
                .is_some_and(|block| block.txids().contains(txid));
            if found {
                return Ok(Some(height as u32));
            }
        }
        if state.mempool.iter().any(|tx| tx.txid() == *txid) {
            return Ok(None);
        }
        Err(Error::Upstream(format!("No such transaction {}", txid)))
    }

    async fn raw_mempool(&self) -> Result<Vec<Hash256>> {
        self.check_online()?;
        Ok(self.state.lock().mempool.iter().map(Transaction::txid).collect())
    }

    async fn raw_transaction(&self, txid: &Hash256) -> Result<String> {
        self.check_online()?;
        let state = self.state.lock();
        let in_blocks = state.known.values().flat_map(|block| block.transactions.iter());
        state
            .mempool
            .iter()
            .chain(in_blocks)
            .find(|tx| tx.txid() == *txid)
            .map(Transaction::to_hex)
            .ok_or_else(|| Error::Upstream(format!("No such transaction {}", txid)))
    }

    async fn raw_transactions(&self, txids: &[Hash256]) -> Result<Vec<Transaction>> {
        self.check_online()?;
        let mut state = self.state.lock();
        state.batch_requests += 1;
        Ok(txids
            .iter()
            .filter(|txid| !state.evicted.contains(*txid))
            .filter_map(|txid| state.mempool.iter().find(|tx| tx.txid() == *txid).cloned())
            .collect())
    }

    async fn send_raw_transaction(&self, tx_hex: &str) -> Result<Hash256> {
        self.check_online()?;
        let tx = Transaction::from_hex(tx_hex)?;
        let mut state = self.state.lock();
        state.broadcasts.push(tx_hex.to_string());
        state.mempool.push(tx.clone());
        Ok(tx.txid())
    }

    async fn estimate_fee(&self, blocks: u32) -> Result<Option<f64>> {
        self.check_online()?;
        Ok((blocks > 1).then_some(0.0002))
    }
}
