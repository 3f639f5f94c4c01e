// Sessionflow Storage - File-backed snapshot store
//
// Layout: `<root>/<snapshot_id>.json`, one pretty-printed Snapshot per file.
// Snapshot ids are hex digests, so they are safe file names; anything else is
// rejected before touching the filesystem.

use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sessionflow_runtime::snapshot::{sort_snapshots, Snapshot, SnapshotStore, StoreError};
use sessionflow_runtime::CustomState;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

const EXTENSION: &str = "json";

/// Snapshot store persisting to a directory
///
/// Safe to share between connections. Writers (`save_snapshot`,
/// `invalidate_snapshots_after`) are serialized; readers are not blocked.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(FileSnapshotStore::<ChatState>::open("./snapshots").await?);
/// let flow = SessionFlowBuilder::new("chat").store(store).build(turn);
/// ```
pub struct FileSnapshotStore<C> {
    root: PathBuf,
    write_lock: Mutex<()>,
    _state: PhantomData<fn() -> C>,
}

impl<C: CustomState> FileSnapshotStore<C> {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "Opened file snapshot store");

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
            _state: PhantomData,
        })
    }

    /// Directory holding the snapshot files
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> Option<PathBuf> {
        is_valid_id(id).then(|| self.root.join(format!("{id}.{EXTENSION}")))
    }

    async fn read(&self, path: &Path) -> Result<Option<Snapshot<C>>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Write through a temporary file and rename it into place
    async fn write(&self, path: &Path, snapshot: &Snapshot<C>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = path.with_extension(format!("{EXTENSION}.tmp-{}", Uuid::now_v7()));

        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(err) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Snapshot<C>>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut snapshots = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            match self.read(&path).await {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => {}
                Err(StoreError::Serialization(err)) => {
                    warn!(path = %path.display(), error = %err, "Skipping unreadable snapshot file");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(snapshots)
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[async_trait]
impl<C: CustomState> SnapshotStore<C> for FileSnapshotStore<C> {
    async fn get_snapshot(&self, id: &str) -> Result<Option<Snapshot<C>>, StoreError> {
        match self.path_for(id) {
            Some(path) => self.read(&path).await,
            None => Ok(None),
        }
    }

    async fn save_snapshot(&self, snapshot: &Snapshot<C>) -> Result<(), StoreError> {
        let path = self
            .path_for(&snapshot.id)
            .ok_or_else(|| StoreError::Backend(format!("invalid snapshot id: {}", snapshot.id)))?;

        let _guard = self.write_lock.lock().await;
        if tokio::fs::try_exists(&path).await? {
            debug!(snapshot_id = %snapshot.id, "Snapshot already stored");
            return Ok(());
        }

        self.write(&path, snapshot).await?;
        debug!(snapshot_id = %snapshot.id, session_id = %snapshot.session_id, "Snapshot written");
        Ok(())
    }

    async fn list_snapshots(
        &self,
        session_id: &str,
        include_orphaned: bool,
    ) -> Result<Vec<Snapshot<C>>, StoreError> {
        let mut snapshots: Vec<Snapshot<C>> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|s| s.session_id == session_id)
            .filter(|s| include_orphaned || !s.orphaned)
            .collect();

        sort_snapshots(&mut snapshots);
        Ok(snapshots)
    }

    async fn invalidate_snapshots_after(
        &self,
        session_id: &str,
        after: u64,
    ) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut count = 0;
        for mut snapshot in self.read_all().await? {
            if snapshot.session_id != session_id || snapshot.sequence <= after || snapshot.orphaned
            {
                continue;
            }
            let Some(path) = self.path_for(&snapshot.id) else {
                continue;
            };
            snapshot.orphaned = true;
            self.write(&path, &snapshot).await?;
            count += 1;
        }

        debug!(session_id = %session_id, after, count, "Orphaned snapshots");
        Ok(count)
    }
}

impl<C> std::fmt::Debug for FileSnapshotStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSnapshotStore")
            .field("root", &self.root)
            .finish()
    }
}
