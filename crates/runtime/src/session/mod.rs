//! Session: mutable working state of one invocation
//!
//! A [`Session`] wraps a [`SessionState`] behind a lock so the worker and
//! concurrently running tool tasks can read and update it. It also tracks the
//! snapshot chain (last snapshot, completed turns) and owns the optional
//! [`SnapshotStore`] that snapshots are written to.

mod context;
mod state;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::context::ActionContext;
use crate::error::Result;
use crate::snapshot::{Snapshot, SnapshotContext, SnapshotEvent, SnapshotPolicy, SnapshotStore};
use crate::telemetry::attrs;

pub use context::{session_from_context, with_session_context};
pub use state::{Artifact, CustomState, Message, MessageRole, Metadata, Part, SessionState};

struct Inner<C> {
    state: SessionState<C>,
    last_snapshot: Option<Snapshot<C>>,
    turn_index: u64,
}

/// Working container for one invocation's state
///
/// All accessors take a short exclusive lock and never hold it across an
/// `.await`. Reads return copies.
pub struct Session<C> {
    id: String,
    inner: Mutex<Inner<C>>,
    store: Option<Arc<dyn SnapshotStore<C>>>,
}

impl<C: CustomState> Session<C> {
    /// Fresh session with a generated id
    pub fn new(state: SessionState<C>) -> Self {
        Self::with_id(Uuid::now_v7().to_string(), state)
    }

    /// Fresh session with a pinned id
    pub fn with_id(id: impl Into<String>, state: SessionState<C>) -> Self {
        Self {
            id: id.into(),
            inner: Mutex::new(Inner {
                state,
                last_snapshot: None,
                turn_index: 0,
            }),
            store: None,
        }
    }

    /// Session hydrated from a snapshot
    ///
    /// The snapshot becomes the parent of the next one and the turn count
    /// continues from it.
    pub fn from_snapshot(snapshot: Snapshot<C>) -> Self {
        Self {
            id: snapshot.session_id.clone(),
            inner: Mutex::new(Inner {
                state: snapshot.state.clone(),
                turn_index: snapshot.turn_index,
                last_snapshot: Some(snapshot),
            }),
            store: None,
        }
    }

    /// Attach the store snapshots are written to
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore<C>>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> Option<&Arc<dyn SnapshotStore<C>>> {
        self.store.as_ref()
    }

    // ============================================
    // State accessors
    // ============================================

    /// Copy of the whole state
    pub fn state(&self) -> SessionState<C> {
        self.inner.lock().state.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().state.messages.clone()
    }

    /// Append messages in order
    pub fn add_messages(&self, messages: impl IntoIterator<Item = Message>) {
        self.inner.lock().state.messages.extend(messages);
    }

    pub fn add_message(&self, message: Message) {
        self.inner.lock().state.messages.push(message);
    }

    /// Replace the whole history
    pub fn set_messages(&self, messages: Vec<Message>) {
        self.inner.lock().state.messages = messages;
    }

    pub fn custom(&self) -> C {
        self.inner.lock().state.custom.clone()
    }

    pub fn set_custom(&self, custom: C) {
        self.inner.lock().state.custom = custom;
    }

    /// Read-modify-write the custom state under one lock
    ///
    /// Concurrent tool tasks must use this instead of `custom()` followed by
    /// `set_custom()`, which can lose updates.
    pub fn patch_custom<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut self.inner.lock().state.custom)
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.inner.lock().state.artifacts.clone()
    }

    /// Insert an artifact, replacing any artifact with the same name
    pub fn add_artifact(&self, artifact: Artifact) {
        self.inner.lock().state.upsert_artifact(artifact);
    }

    /// Replace the artifact list; later duplicates win
    pub fn set_artifacts(&self, artifacts: Vec<Artifact>) {
        let mut inner = self.inner.lock();
        inner.state.artifacts.clear();
        for artifact in artifacts {
            inner.state.upsert_artifact(artifact);
        }
    }

    // ============================================
    // Turn and snapshot tracking
    // ============================================

    /// Number of completed turns
    pub fn turn_index(&self) -> u64 {
        self.inner.lock().turn_index
    }

    /// Record a completed turn, returning the new count
    pub fn advance_turn(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.turn_index += 1;
        inner.turn_index
    }

    pub fn last_snapshot_id(&self) -> Option<String> {
        self.inner.lock().last_snapshot.as_ref().map(|s| s.id.clone())
    }

    /// Evaluate the policy and create a snapshot if it fires
    ///
    /// Returns `Ok(None)` when no store is attached, the policy declines, or
    /// the state is identical to the last snapshot. Saving at a chain position
    /// already stored reuses that snapshot; a stored capture that is orphaned
    /// or sits elsewhere is never reused.
    pub async fn maybe_snapshot(
        &self,
        ctx: &ActionContext,
        event: SnapshotEvent,
        policy: &dyn SnapshotPolicy<C>,
    ) -> Result<Option<Snapshot<C>>> {
        let Some(store) = self.store.clone() else {
            return Ok(None);
        };

        let (state, previous, turn_index) = {
            let inner = self.inner.lock();
            (
                inner.state.clone(),
                inner.last_snapshot.clone(),
                inner.turn_index,
            )
        };

        let fire = policy.should_snapshot(
            ctx,
            &SnapshotContext {
                event,
                state: &state,
                previous_state: previous.as_ref().map(|p| &p.state),
                sequence: previous.as_ref().map_or(1, |p| p.sequence + 1),
                turn_index,
            },
        );
        if !fire {
            return Ok(None);
        }

        let span = tracing::info_span!(
            "snapshot.create",
            "sessionflow.agent.name" = ctx.action_name().unwrap_or_default(),
            "sessionflow.session.id" = %self.id,
            "sessionflow.snapshot.event" = %event,
            "sessionflow.snapshot.id" = tracing::field::Empty,
        );

        self.create_snapshot(store, previous, turn_index, event, state)
            .instrument(span)
            .await
    }

    async fn create_snapshot(
        &self,
        store: Arc<dyn SnapshotStore<C>>,
        previous: Option<Snapshot<C>>,
        turn_index: u64,
        event: SnapshotEvent,
        state: SessionState<C>,
    ) -> Result<Option<Snapshot<C>>> {
        if let Some(last) = previous.as_ref().filter(|p| p.state == state) {
            debug!(snapshot_id = %last.id, "State unchanged since last snapshot");
            return Ok(None);
        }

        let mut candidate = Snapshot::new(&self.id, previous.as_ref(), turn_index, event, state)?;
        let stored = loop {
            match store.get_snapshot(&candidate.id).await? {
                None => {
                    store.save_snapshot(&candidate).await?;
                    break candidate;
                }
                Some(existing) if existing.matches_position(&candidate) => break existing,
                Some(existing) => {
                    debug!(
                        snapshot_id = %existing.id,
                        orphaned = existing.orphaned,
                        "Identical capture exists off the active timeline"
                    );
                    candidate = candidate.next_revision()?;
                }
            }
        };

        tracing::Span::current().record(attrs::SNAPSHOT_ID, stored.id.as_str());
        debug!(
            snapshot_id = %stored.id,
            sequence = stored.sequence,
            turn_index = stored.turn_index,
            "Snapshot created"
        );

        self.inner.lock().last_snapshot = Some(stored.clone());
        Ok(Some(stored))
    }
}

impl<C> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("messages", &inner.state.messages.len())
            .field("artifacts", &inner.state.artifacts.len())
            .field("turn_index", &inner.turn_index)
            .field(
                "last_snapshot_id",
                &inner.last_snapshot.as_ref().map(|s| s.id.as_str()),
            )
            .field("has_store", &self.store.is_some())
            .finish()
    }
}
