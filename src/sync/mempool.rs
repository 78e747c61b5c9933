// Unconfirmed transaction overlay

use super::events::{Event, EventBus};
use crate::chain::sort_transactions;
use crate::core::script::output_addresses;
use crate::core::{Hash256, Network, OutPoint, Transaction};
use crate::error::Result;
use crate::storage::{Coin, Storage};
use crate::upstream::Upstream;
use lru::LruCache;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Overlay shared by the sync engine (which clears it), the tracker (which
/// fills it) and queries (which read it)
pub type SharedOverlay = Arc<RwLock<MempoolOverlay>>;

/// Index of the unconfirmed transactions seen since the last height change.
///
/// Entries are never evicted one by one; the whole overlay is reset when the
/// tip moves.
#[derive(Debug, Default)]
pub struct MempoolOverlay {
    seen: HashSet<Hash256>,
    spent_by: HashMap<OutPoint, Hash256>,
    output_addresses: HashMap<OutPoint, Vec<String>>,
    /// address → txid → output index → value
    coins_by_address: HashMap<String, BTreeMap<Hash256, BTreeMap<u32, u64>>>,
}

impl MempoolOverlay {
    pub fn clear(&mut self) {
        self.seen.clear();
        self.spent_by.clear();
        self.output_addresses.clear();
        self.coins_by_address.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Number of transactions seen
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn has_seen(&self, txid: &Hash256) -> bool {
        self.seen.contains(txid)
    }

    /// Unconfirmed transaction spending `outpoint`
    pub fn spent_by(&self, outpoint: &OutPoint) -> Option<Hash256> {
        self.spent_by.get(outpoint).copied()
    }

    /// Coins created by unconfirmed transactions, at height 0
    pub fn unconfirmed_coins(&self, address: &str) -> Vec<Coin> {
        let Some(by_tx) = self.coins_by_address.get(address) else {
            return Vec::new();
        };
        by_tx
            .iter()
            .flat_map(|(txid, outputs)| {
                outputs
                    .iter()
                    .map(move |(index, value)| Coin::new(address, OutPoint::new(*txid, *index), *value, 0))
            })
            .collect()
    }

    /// Durable coins plus unconfirmed ones, with unconfirmed spends applied
    pub fn merge_coins(&self, address: &str, durable: Vec<Coin>) -> Vec<Coin> {
        let mut coins = durable;
        coins.extend(self.unconfirmed_coins(address));
        for coin in coins.iter_mut().filter(|coin| !coin.is_spent()) {
            if let Some(spender) = self.spent_by(&coin.outpoint) {
                coin.mark_spent(spender, 0);
            }
        }
        coins
    }

    /// Record `tx`, returning the outpoints it spends and the addresses its
    /// outputs pay
    fn add(&mut self, tx: &Transaction, network: Network) -> (Vec<OutPoint>, Vec<String>) {
        let txid = tx.txid();
        self.seen.insert(txid);

        let spent: Vec<OutPoint> = tx.spent_outputs().copied().collect();
        for outpoint in &spent {
            self.spent_by.insert(*outpoint, txid);
        }

        let mut paid = Vec::new();
        for (index, output) in tx.outputs.iter().enumerate() {
            let addresses = output_addresses(&output.script_pubkey, network);
            if addresses.is_empty() {
                continue;
            }
            let index = index as u32;
            for address in &addresses {
                self.coins_by_address
                    .entry(address.clone())
                    .or_default()
                    .entry(txid)
                    .or_default()
                    .insert(index, output.value);
            }
            paid.extend(addresses.iter().cloned());
            self.output_addresses.insert(OutPoint::new(txid, index), addresses);
        }

        (spent, paid)
    }
}

/// Keeps the overlay in step with the upstream mempool and reports the
/// addresses new unconfirmed transactions touch.
pub struct MempoolTracker<S, U> {
    storage: Arc<S>,
    upstream: Arc<U>,
    overlay: SharedOverlay,
    /// Owners of confirmed outpoints, looked up for unconfirmed spends
    address_cache: LruCache<OutPoint, Vec<String>>,
    events: EventBus,
    network: Network,
}

impl<S: Storage, U: Upstream> MempoolTracker<S, U> {
    pub fn new(
        storage: Arc<S>,
        upstream: Arc<U>,
        overlay: SharedOverlay,
        events: EventBus,
        network: Network,
        cache_size: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            storage,
            upstream,
            overlay,
            address_cache: LruCache::new(capacity),
            events,
            network,
        }
    }

    /// Pull transactions added to the upstream mempool since the last call.
    /// Returns the number of new transactions indexed.
    pub async fn update(&mut self) -> Result<usize> {
        let mempool = self.upstream.raw_mempool().await?;
        let fresh: Vec<Hash256> = {
            let overlay = self.overlay.read();
            mempool.into_iter().filter(|txid| !overlay.has_seen(txid)).collect()
        };
        if fresh.is_empty() {
            return Ok(0);
        }

        let transactions = self.upstream.raw_transactions(&fresh).await?;
        let ordered = sort_transactions(&transactions)?;

        let mut candidates = Vec::new();
        let mut touched = Vec::new();
        let mut added = 0;
        {
            let mut overlay = self.overlay.write();
            for tx in ordered {
                if self.is_confirmed(tx)? {
                    overlay.seen.insert(tx.txid());
                    continue;
                }
                let (spent, paid) = overlay.add(tx, self.network);
                candidates.extend(spent);
                touched.extend(paid);
                added += 1;
            }

            for outpoint in &candidates {
                if let Some(addresses) = overlay.output_addresses.get(outpoint) {
                    touched.extend(addresses.iter().cloned());
                    continue;
                }
                if let Some(addresses) = self.address_cache.get(outpoint) {
                    touched.extend(addresses.iter().cloned());
                    continue;
                }
                let addresses = self.storage.addresses_for(outpoint)?;
                if !addresses.is_empty() {
                    touched.extend(addresses.iter().cloned());
                    self.address_cache.put(*outpoint, addresses);
                }
            }
        }

        let mut emitted = HashSet::new();
        for address in touched {
            if emitted.insert(address.clone()) {
                self.events.emit(Event::TouchedAddress(address));
            }
        }

        log::debug!(
            "Mempool: {} new transactions, {} addresses touched, {} fetched of {} listed",
            added,
            emitted.len(),
            transactions.len(),
            fresh.len()
        );
        Ok(added)
    }

    /// A mined transaction already has its outputs in storage, or is
    /// recorded as the spender of a stored coin
    fn is_confirmed(&self, tx: &Transaction) -> Result<bool> {
        let txid = tx.txid();
        for index in 0..tx.outputs.len() as u32 {
            if !self.storage.addresses_for(&OutPoint::new(txid, index))?.is_empty() {
                return Ok(true);
            }
        }
        for prev in tx.spent_outputs() {
            if self.storage.spender(prev)? == Some(txid) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
