//! In-memory implementation of SnapshotStore

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::model::Snapshot;
use super::store::{sort_snapshots, SnapshotStore, StoreError};

/// In-memory snapshot store
///
/// Keeps every snapshot in a map keyed by id. Suitable for tests and for
/// single-process deployments that do not need snapshots to outlive the
/// process.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(InMemorySnapshotStore::<MyState>::new());
/// let flow = SessionFlowBuilder::new("chat").store(store.clone()).build(turn);
/// ```
pub struct InMemorySnapshotStore<C> {
    snapshots: RwLock<HashMap<String, Snapshot<C>>>,
}

impl<C> InMemorySnapshotStore<C> {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of stored snapshots
    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.snapshots.write().clear();
    }
}

impl<C> Default for InMemorySnapshotStore<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<C> SnapshotStore<C> for InMemorySnapshotStore<C>
where
    C: Clone + Send + Sync + 'static,
{
    async fn get_snapshot(&self, id: &str) -> Result<Option<Snapshot<C>>, StoreError> {
        Ok(self.snapshots.read().get(id).cloned())
    }

    async fn save_snapshot(&self, snapshot: &Snapshot<C>) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.write();
        if snapshots.contains_key(&snapshot.id) {
            debug!(snapshot_id = %snapshot.id, "Snapshot already stored");
            return Ok(());
        }
        snapshots.insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    async fn list_snapshots(
        &self,
        session_id: &str,
        include_orphaned: bool,
    ) -> Result<Vec<Snapshot<C>>, StoreError> {
        let mut result: Vec<Snapshot<C>> = self
            .snapshots
            .read()
            .values()
            .filter(|s| s.session_id == session_id)
            .filter(|s| include_orphaned || !s.orphaned)
            .cloned()
            .collect();

        sort_snapshots(&mut result);
        Ok(result)
    }

    async fn invalidate_snapshots_after(
        &self,
        session_id: &str,
        after: u64,
    ) -> Result<usize, StoreError> {
        let mut count = 0;
        for snapshot in self.snapshots.write().values_mut() {
            if snapshot.session_id == session_id && snapshot.sequence > after && !snapshot.orphaned
            {
                snapshot.orphaned = true;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Message, SessionState};
    use crate::snapshot::SnapshotEvent;

    fn chain(session_id: &str, len: usize) -> Vec<Snapshot<()>> {
        let mut out: Vec<Snapshot<()>> = Vec::new();
        for i in 0..len {
            let state = SessionState {
                messages: vec![Message::user(format!("turn {i}"))],
                custom: (),
                artifacts: Vec::new(),
            };
            let snapshot = Snapshot::new(
                session_id,
                out.last(),
                i as u64 + 1,
                SnapshotEvent::TurnEnd,
                state,
            )
            .unwrap();
            out.push(snapshot);
        }
        out
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = InMemorySnapshotStore::<()>::new();
        let snapshots = chain("s1", 1);

        store.save_snapshot(&snapshots[0]).await.unwrap();

        let loaded = store.get_snapshot(&snapshots[0].id).await.unwrap();
        assert_eq!(loaded.as_ref(), Some(&snapshots[0]));
        assert!(store.get_snapshot("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_save_is_noop() {
        let store = InMemorySnapshotStore::<()>::new();
        let snapshot = chain("s1", 1).remove(0);

        store.save_snapshot(&snapshot).await.unwrap();
        let mut later = snapshot.clone();
        later.turn_index = 99;
        store.save_snapshot(&later).await.unwrap();

        let listed = store.list_snapshots("s1", true).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].turn_index, snapshot.turn_index);
    }

    #[tokio::test]
    async fn test_list_orders_by_sequence_and_filters_session() {
        let store = InMemorySnapshotStore::<()>::new();
        let snapshots = chain("s1", 3);
        for s in snapshots.iter().rev() {
            store.save_snapshot(s).await.unwrap();
        }
        store.save_snapshot(&chain("s2", 1)[0]).await.unwrap();

        let listed = store.list_snapshots("s1", false).await.unwrap();
        let sequences: Vec<u64> = listed.iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn test_invalidate_after_orphans_only_later_snapshots() {
        let store = InMemorySnapshotStore::<()>::new();
        for s in chain("s1", 4) {
            store.save_snapshot(&s).await.unwrap();
        }
        let other = chain("s2", 4);
        for s in &other {
            store.save_snapshot(s).await.unwrap();
        }

        let orphaned = store.invalidate_snapshots_after("s1", 2).await.unwrap();
        assert_eq!(orphaned, 2);

        let all = store.list_snapshots("s1", true).await.unwrap();
        for s in &all {
            assert_eq!(s.orphaned, s.sequence > 2, "sequence {}", s.sequence);
        }
        assert_eq!(store.list_snapshots("s1", false).await.unwrap().len(), 2);
        assert_eq!(store.list_snapshots("s2", false).await.unwrap().len(), 4);

        // Already orphaned entries are not counted again
        assert_eq!(store.invalidate_snapshots_after("s1", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemorySnapshotStore::<()>::new();
        store.save_snapshot(&chain("s1", 1)[0]).await.unwrap();
        assert!(!store.is_empty());

        store.clear();
        assert!(store.is_empty());
    }
}
