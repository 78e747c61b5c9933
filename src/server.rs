// Process bootstrap and the steady sync cadence

use crate::chain::HeaderChain;
use crate::config::Config;
use crate::core::Network;
use crate::error::{Error, Result};
use crate::query::Indexer;
use crate::storage::{MemoryStorage, SledStorage, Storage, StorageKind};
use crate::sync::{
    CancelFlag, Event, EventBus, MempoolTracker, SharedState, SyncEngine, SyncOutcome,
};
use crate::upstream::{BitcoindClient, Upstream};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;

/// Sleep before the next tick so ticks start `interval` apart; no sleep
/// when the tick itself overran the interval
pub fn next_delay(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Sync engine, mempool tracker and the state they share with queries
pub struct Server<S, U> {
    storage: Arc<S>,
    upstream: Arc<U>,
    state: SharedState,
    events: EventBus,
    engine: SyncEngine<S, U>,
    tracker: MempoolTracker<S, U>,
    network: Network,
    poll_interval: Duration,
}

impl<S: Storage, U: Upstream> Server<S, U> {
    /// Check storage and upstream agree with the configured network, then
    /// load the stored headers
    pub async fn bootstrap(storage: Arc<S>, upstream: Arc<U>, config: &Config) -> Result<Self> {
        storage.handshake(config.network)?;

        let chain_name = upstream.chain_name().await?;
        if !config.network.accepts_chain(&chain_name) {
            return Err(Error::UnsupportedNetwork {
                expected: config.network.name().to_string(),
                found: chain_name,
            });
        }

        let chain = HeaderChain::from_headers(storage.all_headers()?)?;
        log::info!(
            "Loaded {} headers from storage, tip {}",
            chain.height(),
            chain.tip_hash()?
        );

        let state = SharedState::new(chain);
        let events = EventBus::new(config.event_capacity);
        let engine = SyncEngine::new(
            storage.clone(),
            upstream.clone(),
            state.clone(),
            events.clone(),
            config.network,
        );
        let tracker = MempoolTracker::new(
            storage.clone(),
            upstream.clone(),
            state.overlay.clone(),
            events.clone(),
            config.network,
            config.address_cache_size,
        );

        Ok(Self {
            storage,
            upstream,
            state,
            events,
            engine,
            tracker,
            network: config.network,
            poll_interval: config.poll_interval,
        })
    }

    /// Query facade over the same state
    pub fn indexer(&self) -> Indexer<S, U> {
        Indexer::new(
            self.storage.clone(),
            self.upstream.clone(),
            self.state.clone(),
            self.network,
        )
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// One round: sync to the upstream tip, then pick up new mempool entries
    pub async fn tick(&mut self, cancel: &CancelFlag) -> Result<SyncOutcome> {
        let outcome = self.engine.catch_up(cancel).await?;
        if outcome == SyncOutcome::Converged {
            self.tracker.update().await?;
        }
        Ok(outcome)
    }

    /// Bulk catch-up, then ticks every poll interval until cancelled.
    /// The first error stops the loop and is returned.
    pub async fn run(&mut self, cancel: &CancelFlag) -> Result<()> {
        log::info!("Catching up with upstream");
        if self.engine.catch_up(cancel).await? == SyncOutcome::Cancelled {
            return Ok(());
        }

        loop {
            let started = Instant::now();
            if self.tick(cancel).await? == SyncOutcome::Cancelled {
                break;
            }

            let delay = next_delay(self.poll_interval, started.elapsed());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => break,
            }
        }

        log::info!("Stopped at {} blocks", self.state.chain.read().height());
        Ok(())
    }
}

/// Log every event at debug level until the bus closes
async fn log_events(mut rx: tokio::sync::broadcast::Receiver<Event>) {
    loop {
        match rx.recv().await {
            Ok(Event::NewHeight(height)) => log::debug!("New height {}", height),
            Ok(Event::TouchedAddress(address)) => log::debug!("Touched {}", address),
            Err(RecvError::Lagged(skipped)) => log::warn!("Event log skipped {} events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn serve<S: Storage + 'static>(storage: Arc<S>, config: &Config) -> Result<()> {
    let upstream = Arc::new(BitcoindClient::new(
        &config.rpc_url,
        config.rpc_user.clone(),
        config.rpc_password.clone(),
        config.rpc_timeout,
    )?);
    let mut server = Server::bootstrap(storage, upstream, config).await?;

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupt received, finishing current block");
                cancel.cancel();
            }
        });
    }
    let event_log = tokio::spawn(log_events(server.events().subscribe()));

    let result = server.run(&cancel).await;
    event_log.abort();
    result
}

/// Run the indexer daemon with the configured storage backend
pub async fn run(config: Config) -> Result<()> {
    log::info!(
        "Starting chain indexer ({}, {:?} storage, upstream {})",
        config.network,
        config.storage,
        config.rpc_url
    );

    match config.storage {
        StorageKind::Sled => {
            let storage = Arc::new(SledStorage::new(config.index_path())?);
            let result = serve(storage.clone(), &config).await;
            storage.flush()?;
            result
        }
        StorageKind::Memory => serve(Arc::new(MemoryStorage::new()), &config).await,
    }
}
