//! Session snapshots
//!
//! This module provides:
//! - [`Snapshot`], the immutable point-in-time capture of a session
//! - [`SnapshotStore`] trait for snapshot persistence
//! - [`InMemorySnapshotStore`] for tests and single-process use
//! - [`SnapshotPolicy`] and combinators deciding when snapshots are taken

mod memory;
mod model;
pub mod policy;
mod store;

pub use memory::InMemorySnapshotStore;
pub use model::{content_id, Snapshot, SnapshotEvent};
pub use policy::{SnapshotContext, SnapshotPolicy, SnapshotPolicyExt};
pub use store::{sort_snapshots, SnapshotStore, StoreError};
