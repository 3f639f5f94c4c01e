//! Integration tests for FileSnapshotStore
//!
//! Each test works in its own directory under the system temp dir.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use sessionflow_runtime::snapshot::{Snapshot, SnapshotEvent, SnapshotStore};
use sessionflow_runtime::{Message, SessionState};
use sessionflow_storage::FileSnapshotStore;
use uuid::Uuid;

type Notes = BTreeMap<String, String>;

fn collect_ids(snapshots: &[Snapshot<Notes>]) -> Vec<String> {
    snapshots.iter().map(|s| s.id.clone()).collect()
}

fn temp_root() -> PathBuf {
    std::env::temp_dir().join(format!("sessionflow-store-{}", Uuid::now_v7()))
}

async fn open_store() -> (FileSnapshotStore<Notes>, PathBuf) {
    let root = temp_root();
    let store = FileSnapshotStore::open(&root)
        .await
        .expect("should create store directory");
    (store, root)
}

async fn cleanup(root: PathBuf) {
    tokio::fs::remove_dir_all(root).await.ok();
}

fn chain(session_id: &str, len: usize) -> Vec<Snapshot<Notes>> {
    let mut out: Vec<Snapshot<Notes>> = Vec::new();
    for i in 0..len {
        let mut custom = Notes::new();
        custom.insert("step".to_string(), i.to_string());
        let state = SessionState {
            messages: vec![Message::user(format!("message {i}"))],
            custom,
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

// ============================================
// Basic operations
// ============================================

#[tokio::test]
async fn test_save_and_get_round_trip() {
    let (store, root) = open_store().await;
    let snapshot = chain("s1", 1).remove(0);

    store.save_snapshot(&snapshot).await.unwrap();
    let loaded = store.get_snapshot(&snapshot.id).await.unwrap();

    assert_eq!(loaded, Some(snapshot.clone()));
    assert!(root.join(format!("{}.json", snapshot.id)).exists());
    cleanup(root).await;
}

#[tokio::test]
async fn test_get_missing_and_invalid_ids() {
    let (store, root) = open_store().await;

    assert!(store.get_snapshot("deadbeef").await.unwrap().is_none());
    assert!(store.get_snapshot("../escape").await.unwrap().is_none());
    cleanup(root).await;
}

#[tokio::test]
async fn test_duplicate_save_keeps_first_copy() {
    let (store, root) = open_store().await;
    let snapshot = chain("s1", 1).remove(0);

    store.save_snapshot(&snapshot).await.unwrap();
    let mut altered = snapshot.clone();
    altered.turn_index = 42;
    store.save_snapshot(&altered).await.unwrap();

    let listed = store.list_snapshots("s1", true).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].turn_index, snapshot.turn_index);
    cleanup(root).await;
}

#[tokio::test]
async fn test_list_is_ordered_and_scoped_to_session() {
    let (store, root) = open_store().await;
    let s1 = chain("s1", 3);
    for snapshot in s1.iter().rev() {
        store.save_snapshot(snapshot).await.unwrap();
    }
    for snapshot in chain("s2", 2) {
        store.save_snapshot(&snapshot).await.unwrap();
    }

    let listed = store.list_snapshots("s1", false).await.unwrap();
    assert_eq!(collect_ids(&listed), collect_ids(&s1));
    assert_eq!(store.list_snapshots("s2", false).await.unwrap().len(), 2);
    assert!(store.list_snapshots("s3", true).await.unwrap().is_empty());
    cleanup(root).await;
}

// ============================================
// Orphaning
// ============================================

#[test_log::test(tokio::test)]
async fn test_invalidate_after_marks_later_snapshots() {
    let (store, root) = open_store().await;
    let snapshots = chain("s1", 4);
    for snapshot in &snapshots {
        store.save_snapshot(snapshot).await.unwrap();
    }

    let orphaned = store.invalidate_snapshots_after("s1", 2).await.unwrap();
    assert_eq!(orphaned, 2);

    let active = store.list_snapshots("s1", false).await.unwrap();
    assert_eq!(collect_ids(&active), collect_ids(&snapshots[..2]));

    let all = store.list_snapshots("s1", true).await.unwrap();
    assert_eq!(all.len(), 4);
    for snapshot in &all {
        assert_eq!(snapshot.orphaned, snapshot.sequence > 2);
    }

    // Orphaning survives reopening the store
    let reopened = FileSnapshotStore::<Notes>::open(&root).await.unwrap();
    let reloaded = reopened.get_snapshot(&snapshots[3].id).await.unwrap().unwrap();
    assert!(reloaded.orphaned);
    cleanup(root).await;
}

#[tokio::test]
async fn test_unreadable_files_are_skipped() {
    let (store, root) = open_store().await;
    let snapshot = chain("s1", 1).remove(0);
    store.save_snapshot(&snapshot).await.unwrap();
    tokio::fs::write(root.join("garbage.json"), b"not json")
        .await
        .unwrap();
    tokio::fs::write(root.join("notes.txt"), b"ignored").await.unwrap();

    let listed = store.list_snapshots("s1", true).await.unwrap();
    assert_eq!(listed.len(), 1);
    cleanup(root).await;
}

// ============================================
// Concurrency
// ============================================

#[tokio::test]
async fn test_concurrent_saves_from_many_sessions() {
    let (store, root) = open_store().await;
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for n in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let session_id = format!("session-{n}");
            for snapshot in chain(&session_id, 3) {
                store.save_snapshot(&snapshot).await.unwrap();
                // Same snapshot again from the same writer
                store.save_snapshot(&snapshot).await.unwrap();
            }
            session_id
        }));
    }

    for handle in handles {
        let session_id = handle.await.unwrap();
        let listed = store.list_snapshots(&session_id, false).await.unwrap();
        assert_eq!(listed.len(), 3);
    }
    cleanup(root).await;
}
