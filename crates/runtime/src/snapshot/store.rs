//! SnapshotStore trait definition

use async_trait::async_trait;

use super::model::Snapshot;

/// Error type for store operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Filesystem or transport failure
    #[error("io error: {0}")]
    Io(String),

    /// Snapshot could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Any other backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Persistence backend for snapshots
///
/// Implementations must be safe for concurrent use by many connections.
#[async_trait]
pub trait SnapshotStore<C>: Send + Sync {
    /// Look up a snapshot; `Ok(None)` when absent
    async fn get_snapshot(&self, id: &str) -> Result<Option<Snapshot<C>>, StoreError>;

    /// Persist a snapshot
    ///
    /// Saving an id that already exists is a no-op; the stored copy wins.
    async fn save_snapshot(&self, snapshot: &Snapshot<C>) -> Result<(), StoreError>;

    /// Snapshots of a session ordered by sequence, then creation time
    async fn list_snapshots(
        &self,
        session_id: &str,
        include_orphaned: bool,
    ) -> Result<Vec<Snapshot<C>>, StoreError>;

    /// Mark every snapshot of the session with `sequence > after` as orphaned
    ///
    /// Returns the number of snapshots newly orphaned.
    async fn invalidate_snapshots_after(
        &self,
        session_id: &str,
        after: u64,
    ) -> Result<usize, StoreError>;
}

/// Sort order shared by store implementations
pub fn sort_snapshots<C>(snapshots: &mut [Snapshot<C>]) {
    snapshots.sort_by(|a, b| {
        a.sequence
            .cmp(&b.sequence)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}
