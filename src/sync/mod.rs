// Chain synchronization with the upstream node

mod engine;
mod events;
mod mempool;
mod status;

pub use engine::{CancelFlag, SyncEngine, SyncOutcome};
pub use events::{Event, EventBus};
pub use mempool::{MempoolOverlay, MempoolTracker, SharedOverlay};
pub use status::{Progress, SyncState, SyncStatus};

use crate::chain::HeaderChain;
use parking_lot::RwLock;
use std::sync::Arc;

/// State written by the sync side and read by queries.
///
/// Locks are taken for synchronous steps only and never held across an
/// `.await`.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    pub chain: Arc<RwLock<HeaderChain>>,
    pub status: Arc<RwLock<SyncStatus>>,
    pub overlay: SharedOverlay,
}

impl SharedState {
    pub fn new(chain: HeaderChain) -> Self {
        Self {
            chain: Arc::new(RwLock::new(chain)),
            ..Self::default()
        }
    }
}
