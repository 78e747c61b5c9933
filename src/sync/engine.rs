// Catch-up loop: import and revert blocks until the local tip matches upstream

use super::events::{Event, EventBus};
use super::status::{Progress, SyncState};
use super::SharedState;
use crate::chain::sort_transactions;
use crate::core::script::output_addresses;
use crate::core::{Block, Hash256, Network, OutPoint};
use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::upstream::Upstream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Blocks between progress lines during bulk sync
const PROGRESS_INTERVAL: u32 = 1000;

/// Process-wide stop request, checked once per loop iteration
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local tip equals the upstream tip
    Converged,
    /// Stopped between two blocks on request
    Cancelled,
}

/// Drives the local index towards the upstream chain one block at a time.
pub struct SyncEngine<S, U> {
    storage: Arc<S>,
    upstream: Arc<U>,
    state: SharedState,
    events: EventBus,
    network: Network,
}

impl<S: Storage, U: Upstream> SyncEngine<S, U> {
    pub fn new(
        storage: Arc<S>,
        upstream: Arc<U>,
        state: SharedState,
        events: EventBus,
        network: Network,
    ) -> Self {
        Self {
            storage,
            upstream,
            state,
            events,
            network,
        }
    }

    fn is_finished(&self) -> bool {
        self.state.status.read().is_finished()
    }

    /// Import or revert until the local tip hash equals upstream's.
    ///
    /// Each iteration either imports the upstream block that extends the
    /// local tip, or reverts the local tip when upstream's block at the next
    /// height does not extend it.
    pub async fn catch_up(&self, cancel: &CancelFlag) -> Result<SyncOutcome> {
        loop {
            if cancel.is_cancelled() {
                log::info!("Sync cancelled at height {}", self.state.chain.read().height());
                return Ok(SyncOutcome::Cancelled);
            }

            let (upstream_height, upstream_tip) = self.upstream.tip().await?;
            let (count, local_tip) = {
                let chain = self.state.chain.read();
                (chain.height(), chain.tip_hash()?)
            };

            self.record_progress(count, upstream_height + 1);

            if local_tip == upstream_tip {
                let mut status = self.state.status.write();
                if !status.is_finished() {
                    status.status = SyncState::Finished;
                    log::info!("Sync finished at {} blocks", count);
                }
                return Ok(SyncOutcome::Converged);
            }

            if count <= upstream_height {
                let hash = self.upstream.block_hash(count).await?;
                let block = self.upstream.block(&hash).await?;
                if block.header.prev_block_hash == local_tip {
                    self.import_block(&block)?;
                    continue;
                }
            }

            if count == 0 {
                return Err(Error::Upstream(format!(
                    "upstream genesis does not extend {}",
                    Hash256::zero()
                )));
            }

            let block = self.upstream.block(&local_tip).await?;
            if block.hash() != local_tip {
                return Err(Error::Upstream(format!(
                    "asked for block {}, got {}",
                    local_tip,
                    block.hash()
                )));
            }
            self.revert_block(&block)?;
        }
    }

    fn record_progress(&self, count: u32, total: u32) {
        let mut status = self.state.status.write();
        if status.is_finished() {
            return;
        }
        if status.status == SyncState::Idle {
            log::info!("Sync started: {} local blocks, {} upstream", count, total);
        }
        status.status = SyncState::Syncing;
        status.progress = Progress { count, total };
        if count > 0 && count % PROGRESS_INTERVAL == 0 {
            log::info!("Sync progress: {}/{} blocks", count, total);
        }
    }

    /// Append `block` on top of the local tip and index its transactions
    pub fn import_block(&self, block: &Block) -> Result<()> {
        let header_hex = block.header.to_hex();
        let height = self.state.chain.read().height();

        self.storage.push_header(&header_hex, height)?;
        self.state.chain.write().append(&header_hex)?;

        for tx in sort_transactions(&block.transactions)? {
            let txid = tx.txid();
            for prev in tx.spent_outputs() {
                self.storage.set_spent(prev, &txid, height)?;
            }
            for (index, output) in tx.outputs.iter().enumerate() {
                let outpoint = OutPoint::new(txid, index as u32);
                for address in output_addresses(&output.script_pubkey, self.network) {
                    self.storage.add_coin(&address, &outpoint, output.value, height)?;
                }
            }
        }

        if self.is_finished() {
            for address in self.storage.touched_addresses_at(height)? {
                self.events.emit(Event::TouchedAddress(address));
            }
        }

        log::info!("Imported block #{} {}", height, block.hash());
        self.new_height(Some(height));
        Ok(())
    }

    /// Remove the local tip `block` and undo its transactions
    pub fn revert_block(&self, block: &Block) -> Result<()> {
        let height = self
            .state
            .chain
            .read()
            .height()
            .checked_sub(1)
            .ok_or(Error::Underflow)?;

        let touched = if self.is_finished() {
            self.storage.touched_addresses_at(height)?
        } else {
            Vec::new()
        };

        self.storage.pop_header()?;
        self.state.chain.write().rollback()?;

        let ordered = sort_transactions(&block.transactions)?;
        for tx in ordered.into_iter().rev() {
            let txid = tx.txid();
            for index in 0..tx.outputs.len() as u32 {
                self.storage.remove_coin(&OutPoint::new(txid, index))?;
            }
            for prev in tx.spent_outputs() {
                self.storage.set_unspent(prev)?;
            }
        }

        for address in touched {
            self.events.emit(Event::TouchedAddress(address));
        }

        log::info!("Reverted block #{} {}", height, block.hash());
        self.new_height(height.checked_sub(1));
        Ok(())
    }

    /// Reset the mempool overlay, then announce the tip
    fn new_height(&self, tip: Option<u32>) {
        self.state.overlay.write().clear();
        if let Some(tip) = tip {
            self.events.emit(Event::NewHeight(tip));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Transaction, TxInput};
    use crate::storage::MemoryStorage;
    use crate::test_utils::{self, address, coinbase_outpoint, spend, NETWORK};
    use crate::upstream::MockUpstream;
    use tokio::sync::broadcast::Receiver;

    struct Fixture {
        storage: Arc<MemoryStorage>,
        upstream: Arc<MockUpstream>,
        state: SharedState,
        events: EventBus,
        engine: SyncEngine<MemoryStorage, MockUpstream>,
    }

    fn fixture(blocks: Vec<crate::core::Block>) -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let upstream = Arc::new(MockUpstream::new(blocks));
        let state = SharedState::default();
        let events = EventBus::new(4096);
        let engine = SyncEngine::new(
            storage.clone(),
            upstream.clone(),
            state.clone(),
            events.clone(),
            NETWORK,
        );
        Fixture {
            storage,
            upstream,
            state,
            events,
            engine,
        }
    }

    fn drain(rx: &mut Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn touched(events: &[Event]) -> Vec<String> {
        events
            .iter()
            .filter_map(|event| match event {
                Event::TouchedAddress(address) => Some(address.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_bulk_sync_from_empty() {
        let blocks = test_utils::chain(5, 1);
        let f = fixture(blocks.clone());
        let mut rx = f.events.subscribe();

        let outcome = f.engine.catch_up(&CancelFlag::new()).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Converged);

        let chain = f.state.chain.read();
        assert_eq!(chain.height(), 5);
        assert_eq!(chain.tip_hash().unwrap(), blocks[4].hash());
        assert_eq!(f.storage.all_headers().unwrap().len(), 5);

        let status = *f.state.status.read();
        assert_eq!(status.status, SyncState::Finished);
        assert_eq!(status.progress, Progress { count: 5, total: 5 });

        // no touched addresses during bulk sync
        let events = drain(&mut rx);
        assert_eq!(events, (0..5).map(Event::NewHeight).collect::<Vec<_>>());
        assert_eq!(f.storage.coins(&address(1)).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_import_after_sync_reports_touched_before_height() {
        let mut blocks = test_utils::chain(3, 1);
        let f = fixture(blocks.clone());
        f.engine.catch_up(&CancelFlag::new()).await.unwrap();
        let mut rx = f.events.subscribe();

        let paid = spend(&[coinbase_outpoint(&blocks[0])], &[(2, 1000), (3, 2000)]);
        test_utils::extend(&mut blocks, 4, vec![paid]);
        f.upstream.push_block(blocks[3].clone());
        f.engine.catch_up(&CancelFlag::new()).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.last(), Some(&Event::NewHeight(3)));
        let mut addresses = touched(&events);
        addresses.sort();
        let mut expected = vec![address(1), address(2), address(3), address(4)];
        expected.sort();
        assert_eq!(addresses, expected);

        let coins = f.storage.coins(&address(1)).unwrap();
        let spent = coins
            .iter()
            .find(|coin| coin.outpoint == coinbase_outpoint(&blocks[0]))
            .unwrap();
        assert_eq!(spent.spent_height, Some(3));
        assert_eq!(coins.iter().filter(|coin| coin.is_spent()).count(), 1);
    }

    #[tokio::test]
    async fn test_import_then_revert_restores_index() {
        let mut blocks = test_utils::chain(2, 1);
        let f = fixture(blocks.clone());
        f.engine.catch_up(&CancelFlag::new()).await.unwrap();

        let before: Vec<_> = [1, 2, 3].iter().map(|tag| f.storage.coins(&address(*tag)).unwrap()).collect();
        let tip_before = f.state.chain.read().tip_hash().unwrap();

        let first = spend(&[coinbase_outpoint(&blocks[1])], &[(2, 700)]);
        let second = spend(&[OutPoint::new(first.txid(), 0)], &[(3, 600)]);
        // child before parent inside the block
        test_utils::extend(&mut blocks, 1, vec![second, first]);
        f.engine.import_block(&blocks[2]).unwrap();

        assert_eq!(f.storage.coins(&address(2)).unwrap()[0].spent_height, Some(2));
        assert_eq!(f.storage.coins(&address(3)).unwrap().len(), 1);

        f.engine.revert_block(&blocks[2]).unwrap();

        let after: Vec<_> = [1, 2, 3].iter().map(|tag| f.storage.coins(&address(*tag)).unwrap()).collect();
        assert_eq!(before, after);
        assert_eq!(f.state.chain.read().height(), 2);
        assert_eq!(f.state.chain.read().tip_hash().unwrap(), tip_before);
        assert_eq!(f.storage.all_headers().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_multisig_output_import_and_revert() {
        let mut blocks = test_utils::chain(2, 1);
        let f = fixture(blocks.clone());
        f.engine.catch_up(&CancelFlag::new()).await.unwrap();

        let keys = [[0x02; 33], [0x03; 33]];
        let participants: Vec<String> = keys.iter().map(test_utils::pubkey_address).collect();
        let funding = Transaction::new(
            vec![TxInput::new(coinbase_outpoint(&blocks[0]), vec![0x51])],
            vec![test_utils::multisig_output(&keys, 4000)],
        );
        let outpoint = OutPoint::new(funding.txid(), 0);
        test_utils::extend(&mut blocks, 3, vec![funding]);
        f.upstream.push_block(blocks[2].clone());

        let mut rx = f.events.subscribe();
        f.engine.catch_up(&CancelFlag::new()).await.unwrap();

        let events = touched(&drain(&mut rx));
        for participant in &participants {
            let coins = f.storage.coins(participant).unwrap();
            assert_eq!(coins.len(), 1);
            assert_eq!((coins[0].outpoint, coins[0].value, coins[0].height), (outpoint, 4000, 2));
            assert!(events.contains(participant));
        }
        let mut owners = f.storage.addresses_for(&outpoint).unwrap();
        owners.sort();
        let mut expected = participants.clone();
        expected.sort();
        assert_eq!(owners, expected);

        f.engine.revert_block(&blocks[2]).unwrap();
        for participant in &participants {
            assert!(f.storage.coins(participant).unwrap().is_empty());
        }
        assert!(f.storage.addresses_for(&outpoint).unwrap().is_empty());
        assert!(f.storage.touched_addresses_at(2).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_block_reorg() {
        let blocks = test_utils::chain(100, 1);
        let f = fixture(blocks.clone());
        f.engine.catch_up(&CancelFlag::new()).await.unwrap();
        assert_eq!(f.state.chain.read().height(), 100);

        let replacement = test_utils::fork(&blocks, 99, 1, 2);
        f.upstream.set_chain(replacement.clone());
        let requests = f.upstream.block_requests();
        let mut rx = f.events.subscribe();

        let outcome = f.engine.catch_up(&CancelFlag::new()).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Converged);

        // one revert (local tip) and one import (replacement)
        assert_eq!(f.upstream.block_requests() - requests, 2);
        let chain = f.state.chain.read();
        assert_eq!(chain.height(), 100);
        assert_eq!(chain.tip_hash().unwrap(), replacement[99].hash());

        let events = drain(&mut rx);
        let heights: Vec<_> = events
            .iter()
            .filter(|event| matches!(event, Event::NewHeight(_)))
            .cloned()
            .collect();
        assert_eq!(heights, vec![Event::NewHeight(98), Event::NewHeight(99)]);
        assert_eq!(touched(&events), vec![address(1), address(2)]);

        assert_eq!(f.storage.coins(&address(1)).unwrap().len(), 99);
        assert_eq!(f.storage.coins(&address(2)).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reorg_to_shorter_chain() {
        let blocks = test_utils::chain(6, 1);
        let f = fixture(blocks.clone());
        f.engine.catch_up(&CancelFlag::new()).await.unwrap();

        f.upstream.set_chain(test_utils::fork(&blocks, 3, 1, 2));
        f.engine.catch_up(&CancelFlag::new()).await.unwrap();

        assert_eq!(f.state.chain.read().height(), 4);
        assert_eq!(f.storage.coins(&address(1)).unwrap().len(), 3);
        assert_eq!(f.storage.coins(&address(2)).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_new_height_clears_overlay() {
        let mut blocks = test_utils::chain(2, 1);
        let f = fixture(blocks.clone());
        f.engine.catch_up(&CancelFlag::new()).await.unwrap();

        let unconfirmed = spend(&[coinbase_outpoint(&blocks[0])], &[(2, 100)]);
        f.upstream.set_mempool(vec![unconfirmed.clone()]);
        let mut tracker = crate::sync::MempoolTracker::new(
            f.storage.clone(),
            f.upstream.clone(),
            f.state.overlay.clone(),
            f.events.clone(),
            NETWORK,
            16,
        );
        tracker.update().await.unwrap();
        assert!(!f.state.overlay.read().is_empty());

        // mined in the next block
        test_utils::extend(&mut blocks, 1, vec![unconfirmed.clone()]);
        f.upstream.push_block(blocks[2].clone());
        f.engine.catch_up(&CancelFlag::new()).await.unwrap();
        assert!(f.state.overlay.read().is_empty());

        // still listed upstream, but now confirmed: nothing to report
        let mut rx = f.events.subscribe();
        assert_eq!(tracker.update().await.unwrap(), 0);
        assert!(drain(&mut rx).is_empty());
        assert!(f.state.overlay.read().has_seen(&unconfirmed.txid()));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_block() {
        let f = fixture(test_utils::chain(3, 1));
        let cancel = CancelFlag::new();
        cancel.cancel();

        assert_eq!(f.engine.catch_up(&cancel).await.unwrap(), SyncOutcome::Cancelled);
        assert_eq!(f.state.chain.read().height(), 0);
        assert!(!f.state.status.read().is_finished());
    }

    #[tokio::test]
    async fn test_genesis_must_extend_zero_hash() {
        let mut blocks = test_utils::chain(1, 1);
        blocks[0].header.prev_block_hash = Hash256::new([1; 32]);
        let f = fixture(blocks);

        let err = f.engine.catch_up(&CancelFlag::new()).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
        assert_eq!(f.state.chain.read().height(), 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let f = fixture(test_utils::chain(3, 1));
        f.upstream.set_offline(true);

        let err = f.engine.catch_up(&CancelFlag::new()).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
        assert_eq!(f.state.status.read().status, SyncState::Idle);
    }

    #[tokio::test]
    async fn test_cancel_flag_wakes_waiters() {
        let cancel = CancelFlag::new();
        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { cancel.cancelled().await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();
        waiter.await.unwrap();
        assert!(cancel.is_cancelled());
    }
}
