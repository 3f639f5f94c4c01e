//! Snapshot policies
//!
//! A policy decides, at each lifecycle event, whether the session's current
//! state should be captured. Policies compose with [`SnapshotPolicyExt`].
//!
//! ```ignore
//! // Snapshot at turn end, but only when something changed
//! let policy = on_events([SnapshotEvent::TurnEnd]).and(on_change());
//! ```

use std::collections::HashSet;

use super::model::SnapshotEvent;
use crate::context::ActionContext;
use crate::session::SessionState;

/// Input to a policy decision
///
/// Borrowed for the duration of one evaluation.
#[derive(Debug)]
pub struct SnapshotContext<'a, C> {
    /// Event being evaluated
    pub event: SnapshotEvent,
    /// State that would be captured
    pub state: &'a SessionState<C>,
    /// State of the session's last snapshot, if any
    pub previous_state: Option<&'a SessionState<C>>,
    /// Sequence the new snapshot would get
    pub sequence: u64,
    /// Turns completed so far
    pub turn_index: u64,
}

/// Decides whether a snapshot is created
pub trait SnapshotPolicy<C>: Send + Sync {
    fn should_snapshot(&self, ctx: &ActionContext, snapshot: &SnapshotContext<'_, C>) -> bool;
}

// ============================================
// Built-in policies
// ============================================

/// Always snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

/// Never snapshot (the default)
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

/// Snapshot only for the listed events
#[derive(Debug, Clone)]
pub struct OnEvents {
    events: HashSet<SnapshotEvent>,
}

/// Snapshot only when the state differs from the last snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct OnChange;

/// Policy backed by a closure
#[derive(Clone)]
pub struct FnPolicy<F>(F);

/// Both policies must agree
#[derive(Debug, Clone)]
pub struct And<A, B>(A, B);

/// Either policy may fire
#[derive(Debug, Clone)]
pub struct Or<A, B>(A, B);

pub fn always() -> Always {
    Always
}

pub fn never() -> Never {
    Never
}

pub fn on_events(events: impl IntoIterator<Item = SnapshotEvent>) -> OnEvents {
    OnEvents {
        events: events.into_iter().collect(),
    }
}

pub fn on_change() -> OnChange {
    OnChange
}

/// Wrap a closure as a policy
///
/// ```ignore
/// let every_other_turn = from_fn(|_ctx, snap: &SnapshotContext<'_, MyState>| snap.turn_index % 2 == 0);
/// ```
pub fn from_fn<C, F>(f: F) -> FnPolicy<F>
where
    F: Fn(&ActionContext, &SnapshotContext<'_, C>) -> bool + Send + Sync,
{
    FnPolicy(f)
}

impl<C> SnapshotPolicy<C> for Always {
    fn should_snapshot(&self, _ctx: &ActionContext, _snapshot: &SnapshotContext<'_, C>) -> bool {
        true
    }
}

impl<C> SnapshotPolicy<C> for Never {
    fn should_snapshot(&self, _ctx: &ActionContext, _snapshot: &SnapshotContext<'_, C>) -> bool {
        false
    }
}

impl<C> SnapshotPolicy<C> for OnEvents {
    fn should_snapshot(&self, _ctx: &ActionContext, snapshot: &SnapshotContext<'_, C>) -> bool {
        self.events.contains(&snapshot.event)
    }
}

impl<C: PartialEq> SnapshotPolicy<C> for OnChange {
    fn should_snapshot(&self, _ctx: &ActionContext, snapshot: &SnapshotContext<'_, C>) -> bool {
        snapshot
            .previous_state
            .map_or(true, |previous| previous != snapshot.state)
    }
}

impl<C, F> SnapshotPolicy<C> for FnPolicy<F>
where
    F: Fn(&ActionContext, &SnapshotContext<'_, C>) -> bool + Send + Sync,
{
    fn should_snapshot(&self, ctx: &ActionContext, snapshot: &SnapshotContext<'_, C>) -> bool {
        (self.0)(ctx, snapshot)
    }
}

impl<C, A, B> SnapshotPolicy<C> for And<A, B>
where
    A: SnapshotPolicy<C>,
    B: SnapshotPolicy<C>,
{
    fn should_snapshot(&self, ctx: &ActionContext, snapshot: &SnapshotContext<'_, C>) -> bool {
        self.0.should_snapshot(ctx, snapshot) && self.1.should_snapshot(ctx, snapshot)
    }
}

impl<C, A, B> SnapshotPolicy<C> for Or<A, B>
where
    A: SnapshotPolicy<C>,
    B: SnapshotPolicy<C>,
{
    fn should_snapshot(&self, ctx: &ActionContext, snapshot: &SnapshotContext<'_, C>) -> bool {
        self.0.should_snapshot(ctx, snapshot) || self.1.should_snapshot(ctx, snapshot)
    }
}

/// Composition helpers for the built-in policies
pub trait SnapshotPolicyExt: Sized {
    /// Fire only when both fire
    fn and<B>(self, other: B) -> And<Self, B> {
        And(self, other)
    }

    /// Fire when either fires
    fn or<B>(self, other: B) -> Or<Self, B> {
        Or(self, other)
    }
}

impl SnapshotPolicyExt for Always {}
impl SnapshotPolicyExt for Never {}
impl SnapshotPolicyExt for OnEvents {}
impl SnapshotPolicyExt for OnChange {}
impl<F> SnapshotPolicyExt for FnPolicy<F> {}
impl<A, B> SnapshotPolicyExt for And<A, B> {}
impl<A, B> SnapshotPolicyExt for Or<A, B> {}

impl<F> std::fmt::Debug for FnPolicy<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPolicy").finish_non_exhaustive()
    }
}
