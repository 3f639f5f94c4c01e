//! Snapshot model and content addressing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::session::SessionState;

/// Lifecycle event at which the snapshot policy is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotEvent {
    /// The worker finished responding to one input
    TurnEnd,
    /// A batch of tool calls resolved, before results return to the model
    ToolIterationEnd,
    /// The invocation is about to return its final result
    InvocationEnd,
}

impl SnapshotEvent {
    pub const ALL: [SnapshotEvent; 3] = [
        SnapshotEvent::TurnEnd,
        SnapshotEvent::ToolIterationEnd,
        SnapshotEvent::InvocationEnd,
    ];
}

impl std::fmt::Display for SnapshotEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TurnEnd => write!(f, "turn_end"),
            Self::ToolIterationEnd => write!(f, "tool_iteration_end"),
            Self::InvocationEnd => write!(f, "invocation_end"),
        }
    }
}

/// Immutable point-in-time capture of a session's state
///
/// `orphaned` is the only field that changes after creation, and only from
/// `false` to `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<C> {
    /// Content-addressed identifier (see [`content_id`])
    pub id: String,

    /// Snapshot this one was chained from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Owning session
    pub session_id: String,

    /// Depth in the parent chain, starting at 1
    pub sequence: u64,

    pub created_at: DateTime<Utc>,

    /// Number of turns completed when the snapshot was captured
    pub turn_index: u64,

    /// Event that triggered the snapshot
    pub event: SnapshotEvent,

    /// Captured state
    pub state: SessionState<C>,

    /// No longer on the active timeline
    #[serde(default)]
    pub orphaned: bool,

    /// Bumped when an identical capture already exists off the active timeline
    #[serde(default, skip_serializing_if = "is_zero")]
    pub revision: u32,
}

fn is_zero(revision: &u32) -> bool {
    *revision == 0
}

impl<C: Serialize> Snapshot<C> {
    /// Build a snapshot chained to `parent`
    ///
    /// The identifier is derived from the session, the parent and the state,
    /// so the same state captured at the same point of the chain yields the
    /// same id, while the same state reached on another branch does not.
    pub fn new(
        session_id: impl Into<String>,
        parent: Option<&Snapshot<C>>,
        turn_index: u64,
        event: SnapshotEvent,
        state: SessionState<C>,
    ) -> Result<Self, serde_json::Error> {
        let session_id = session_id.into();
        let parent_id = parent.map(|p| p.id.clone());
        let id = content_id(&session_id, parent_id.as_deref(), 0, &state)?;

        Ok(Self {
            id,
            parent_id,
            session_id,
            sequence: parent.map_or(1, |p| p.sequence + 1),
            created_at: Utc::now(),
            turn_index,
            event,
            state,
            orphaned: false,
            revision: 0,
        })
    }

    /// Same capture under the next revision, with a fresh identifier
    pub fn next_revision(mut self) -> Result<Self, serde_json::Error> {
        self.revision += 1;
        self.id = content_id(
            &self.session_id,
            self.parent_id.as_deref(),
            self.revision,
            &self.state,
        )?;
        Ok(self)
    }

    /// Recompute the identifier and compare it to the stored one
    pub fn verify(&self) -> bool {
        content_id(
            &self.session_id,
            self.parent_id.as_deref(),
            self.revision,
            &self.state,
        )
        .map(|id| id == self.id)
        .unwrap_or(false)
    }
}

impl<C> Snapshot<C> {
    /// Whether a stored snapshot can stand in for `candidate`
    ///
    /// It must sit at the same place of the chain and still be active.
    pub fn matches_position(&self, candidate: &Snapshot<C>) -> bool {
        !self.orphaned
            && self.session_id == candidate.session_id
            && self.parent_id == candidate.parent_id
            && self.sequence == candidate.sequence
    }
}

/// Content-addressed snapshot identifier
///
/// `hex(sha256(session_id || 0x00 || parent_id || 0x00 || revision_le || canonical_json(state)))`,
/// with an empty parent for the first snapshot of a session. The state goes
/// through `serde_json::Value` first so object keys are emitted sorted.
pub fn content_id<C: Serialize>(
    session_id: &str,
    parent_id: Option<&str>,
    revision: u32,
    state: &SessionState<C>,
) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(&serde_json::to_value(state)?)?;

    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(parent_id.unwrap_or_default().as_bytes());
    hasher.update([0u8]);
    hasher.update(revision.to_le_bytes());
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::session::Message;

    fn state(text: &str) -> SessionState<HashMap<String, u32>> {
        let mut custom = HashMap::new();
        custom.insert("b".to_string(), 2);
        custom.insert("a".to_string(), 1);
        SessionState {
            messages: vec![Message::user(text)],
            custom,
            artifacts: Vec::new(),
        }
    }

    #[test]
    fn test_content_id_is_deterministic() {
        let first = content_id("s1", Some("p"), 0, &state("hello")).unwrap();
        let second = content_id("s1", Some("p"), 0, &state("hello")).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_content_id_depends_on_chain_position() {
        let base = content_id("s1", Some("p"), 0, &state("hello")).unwrap();

        assert_ne!(base, content_id("s1", Some("p"), 0, &state("bye")).unwrap());
        assert_ne!(base, content_id("s2", Some("p"), 0, &state("hello")).unwrap());
        assert_ne!(base, content_id("s1", Some("q"), 0, &state("hello")).unwrap());
        assert_ne!(base, content_id("s1", None, 0, &state("hello")).unwrap());
        assert_ne!(base, content_id("s1", Some("p"), 1, &state("hello")).unwrap());
    }

    #[test]
    fn test_same_state_on_another_branch_gets_another_id() {
        let root = Snapshot::new("s1", None, 1, SnapshotEvent::TurnEnd, state("a")).unwrap();
        let left =
            Snapshot::new("s1", Some(&root), 2, SnapshotEvent::TurnEnd, state("b")).unwrap();
        let detour =
            Snapshot::new("s1", Some(&left), 3, SnapshotEvent::TurnEnd, state("a")).unwrap();

        assert_ne!(detour.id, root.id);
        assert_eq!(detour.sequence, 3);
    }

    #[test]
    fn test_next_revision() {
        let root = Snapshot::new("s1", None, 1, SnapshotEvent::TurnEnd, state("a")).unwrap();
        let bumped = root.clone().next_revision().unwrap();

        assert_ne!(bumped.id, root.id);
        assert_eq!(bumped.revision, 1);
        assert_eq!(bumped.sequence, root.sequence);
        assert!(bumped.verify());
    }

    #[test]
    fn test_matches_position() {
        let root = Snapshot::new("s1", None, 1, SnapshotEvent::TurnEnd, state("a")).unwrap();
        let mut stored = root.clone();
        assert!(stored.matches_position(&root));

        stored.orphaned = true;
        assert!(!stored.matches_position(&root));
    }

    #[test]
    fn test_chain_fields() {
        let root = Snapshot::new("s1", None, 1, SnapshotEvent::TurnEnd, state("a")).unwrap();
        let child =
            Snapshot::new("s1", Some(&root), 2, SnapshotEvent::TurnEnd, state("b")).unwrap();

        assert_eq!(root.sequence, 1);
        assert!(root.parent_id.is_none());
        assert_eq!(child.sequence, 2);
        assert_eq!(child.parent_id.as_deref(), Some(root.id.as_str()));
        assert!(!child.orphaned);
    }

    #[test]
    fn test_verify_detects_tampering() {
        let mut snapshot =
            Snapshot::new("s1", None, 0, SnapshotEvent::InvocationEnd, state("a")).unwrap();
        assert!(snapshot.verify());

        snapshot.state.messages.push(Message::user("injected"));
        assert!(!snapshot.verify());
    }

    #[test]
    fn test_event_serialization() {
        assert_eq!(
            serde_json::to_value(SnapshotEvent::ToolIterationEnd).unwrap(),
            serde_json::json!("tool_iteration_end")
        );
        assert_eq!(SnapshotEvent::TurnEnd.to_string(), "turn_end");
    }
}
