// Bulk sync progress

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Progress {
    /// Local block count
    pub count: u32,
    /// Upstream block count
    pub total: u32,
}

/// Where the indexer stands relative to the upstream chain.
/// Once `Finished`, it stays finished for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SyncStatus {
    pub status: SyncState,
    pub progress: Progress,
}

impl SyncStatus {
    pub fn is_finished(&self) -> bool {
        self.status == SyncState::Finished
    }
}
