//! Session flow: a bidirectional action driven turn by turn
//!
//! The flow owns the session lifecycle. For every input value it:
//! 1. runs the user's turn function with a [`TurnContext`]
//! 2. counts the turn and evaluates the snapshot policy (`TurnEnd`)
//! 3. ends the turn so the caller's `receive()` view completes
//!
//! When the caller closes the connection the policy is evaluated once more
//! (`InvocationEnd`) and the final [`FlowOutput`] is returned.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, Instrument};

use super::chunk::StreamChunk;
use super::coordinator::SnapshotCoordinator;
use super::turn::TurnContext;
use crate::action::{ActionDescriptor, BidiAction, BidiOptions, Connection, Registrable};
use crate::channel::{InputStream, Responder};
use crate::config::RuntimeConfig;
use crate::context::ActionContext;
use crate::error::{BidiError, Result};
use crate::session::{session_from_context, with_session_context, CustomState, Session, SessionState};
use crate::snapshot::{policy, SnapshotEvent, SnapshotPolicy, SnapshotStore};
use crate::telemetry;

/// Type-erased turn function
pub type TurnFn<I, C, S> =
    Arc<dyn Fn(TurnContext<C, S>, I) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Initialization payload of a session flow
///
/// At most one source of initial state: either `snapshot_id`, or an explicit
/// `state` (optionally with a pinned `session_id`), or nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowInit<C> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SessionState<C>>,
}

impl<C> Default for FlowInit<C> {
    fn default() -> Self {
        Self {
            session_id: None,
            snapshot_id: None,
            state: None,
        }
    }
}

/// Options for starting a session flow connection
#[derive(Debug, Clone)]
pub struct FlowOptions<C> {
    pub init: FlowInit<C>,
    /// Channel capacity override
    pub capacity: Option<usize>,
}

impl<C> Default for FlowOptions<C> {
    fn default() -> Self {
        Self {
            init: FlowInit::default(),
            capacity: None,
        }
    }
}

impl<C> FlowOptions<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a persisted snapshot
    pub fn with_snapshot_id(mut self, id: impl Into<String>) -> Self {
        self.init.snapshot_id = Some(id.into());
        self
    }

    /// Start from client-managed state
    pub fn with_state(mut self, state: SessionState<C>) -> Self {
        self.init.state = Some(state);
        self
    }

    /// Pin the identifier of a fresh session
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.init.session_id = Some(id.into());
        self
    }

    /// Override the channel capacity (0 = unbuffered)
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// Final result of a session flow connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowOutput<C> {
    pub session_id: String,
    /// Session state when the flow finished
    pub state: SessionState<C>,
    /// Snapshots created during this invocation, in creation order
    pub snapshot_ids: Vec<String>,
    /// Turns completed over the session's lifetime
    pub turns: u64,
}

// ============================================
// Builder
// ============================================

/// Builder for [`SessionFlow`]
///
/// # Example
///
/// ```ignore
/// let flow = SessionFlowBuilder::<ChatState>::new("chat")
///     .store(Arc::new(InMemorySnapshotStore::new()))
///     .policy(on_events([SnapshotEvent::TurnEnd]))
///     .build(|turn: TurnContext<ChatState, String>, input: String| async move {
///         turn.session().add_message(Message::user(input));
///         turn.generate(&model).await?;
///         Ok(())
///     });
/// ```
pub struct SessionFlowBuilder<C> {
    name: String,
    store: Option<Arc<dyn SnapshotStore<C>>>,
    policy: Arc<dyn SnapshotPolicy<C>>,
    config: RuntimeConfig,
}

impl<C: CustomState> SessionFlowBuilder<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: None,
            policy: Arc::new(policy::never()),
            config: RuntimeConfig::default(),
        }
    }

    /// Store snapshots are persisted to and resumed from
    pub fn store(mut self, store: Arc<dyn SnapshotStore<C>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Snapshot policy (defaults to never)
    pub fn policy(mut self, policy: impl SnapshotPolicy<C> + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the flow around a turn function
    pub fn build<I, S, F, Fut>(self, turn: F) -> SessionFlow<I, C, S>
    where
        I: Send + 'static,
        S: Send + 'static,
        F: Fn(TurnContext<C, S>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let turn: TurnFn<I, C, S> = Arc::new(
            move |ctx: TurnContext<C, S>, input: I| -> BoxFuture<'static, Result<()>> {
                Box::pin(turn(ctx, input))
            },
        );

        let policy = self.policy.clone();
        let strict = self.config.strict_snapshots;
        let name: Arc<str> = self.name.clone().into();

        let action = BidiAction::new(
            self.name.clone(),
            move |ctx: ActionContext,
                  inputs: InputStream<I>,
                  init: FlowInit<C>,
                  responder: Responder<StreamChunk<S>>| {
                run_turns(
                    name.clone(),
                    turn.clone(),
                    SnapshotCoordinator::new(policy.clone(), strict),
                    ctx,
                    inputs,
                    init,
                    responder,
                )
            },
        )
        .with_config(self.config.clone());

        SessionFlow {
            action,
            store: self.store,
        }
    }
}

// ============================================
// Flow
// ============================================

/// A bidirectional action with session lifecycle and snapshotting
pub struct SessionFlow<I, C, S> {
    action: BidiAction<I, FlowOutput<C>, FlowInit<C>, StreamChunk<S>>,
    store: Option<Arc<dyn SnapshotStore<C>>>,
}

impl<I, C, S> Clone for SessionFlow<I, C, S> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            store: self.store.clone(),
        }
    }
}

impl<I, C, S> SessionFlow<I, C, S>
where
    I: Send + 'static,
    C: CustomState,
    S: Send + 'static,
{
    pub fn name(&self) -> &str {
        self.action.name()
    }

    pub fn descriptor(&self) -> &ActionDescriptor {
        self.action.descriptor()
    }

    pub fn store(&self) -> Option<&Arc<dyn SnapshotStore<C>>> {
        self.store.as_ref()
    }

    /// Start a connection
    ///
    /// Resolves the initial session before the worker starts, so setup errors
    /// are returned here and no connection is created:
    /// - [`BidiError::Configuration`] when resuming without a store
    /// - [`BidiError::SnapshotNotFound`] for an unknown snapshot id
    /// - [`BidiError::ConflictingOptions`] when a snapshot id is combined with
    ///   explicit state or a session id
    pub async fn stream_bidi(
        &self,
        ctx: &ActionContext,
        options: FlowOptions<C>,
    ) -> Result<Connection<I, FlowOutput<C>, StreamChunk<S>>> {
        let session = Arc::new(self.prepare_session(&options.init).await?);
        let ctx = with_session_context(ctx, session);

        let mut bidi = BidiOptions::new().with_init(options.init);
        if let Some(capacity) = options.capacity {
            bidi = bidi.with_capacity(capacity);
        }
        self.action.stream_bidi(&ctx, bidi)
    }

    async fn prepare_session(&self, init: &FlowInit<C>) -> Result<Session<C>> {
        let Some(snapshot_id) = &init.snapshot_id else {
            let state = init.state.clone().unwrap_or_default();
            let session = match &init.session_id {
                Some(id) => Session::with_id(id.clone(), state),
                None => Session::new(state),
            };
            return Ok(match &self.store {
                Some(store) => session.with_store(store.clone()),
                None => session,
            });
        };

        let store = self.store.as_ref().ok_or_else(|| {
            BidiError::config("resuming from a snapshot requires a snapshot store")
        })?;

        let snapshot = store
            .get_snapshot(snapshot_id)
            .await?
            .ok_or_else(|| BidiError::SnapshotNotFound(snapshot_id.clone()))?;

        if init.state.is_some() {
            return Err(BidiError::conflicting(
                "snapshot id and initial state are mutually exclusive",
            ));
        }
        if init.session_id.is_some() {
            return Err(BidiError::conflicting(
                "snapshot id and session id are mutually exclusive",
            ));
        }

        let orphaned = store
            .invalidate_snapshots_after(&snapshot.session_id, snapshot.sequence)
            .await?;

        info!(
            flow = %self.name(),
            session_id = %snapshot.session_id,
            snapshot_id = %snapshot.id,
            sequence = snapshot.sequence,
            orphaned,
            "Resuming session from snapshot"
        );

        Ok(Session::from_snapshot(snapshot).with_store(store.clone()))
    }
}

impl<I, C, S> Registrable for SessionFlow<I, C, S>
where
    I: Send + 'static,
    C: CustomState,
    S: Send + 'static,
{
    fn registry_name(&self) -> &str {
        self.name()
    }

    fn registry_descriptor(&self) -> ActionDescriptor {
        self.descriptor().clone()
    }
}

impl<I, C, S> fmt::Debug for SessionFlow<I, C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFlow")
            .field("action", &self.action)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

// ============================================
// Turn loop
// ============================================

async fn run_turns<I, C, S>(
    name: Arc<str>,
    turn: TurnFn<I, C, S>,
    snapshots: SnapshotCoordinator<C>,
    ctx: ActionContext,
    mut inputs: InputStream<I>,
    init: FlowInit<C>,
    responder: Responder<StreamChunk<S>>,
) -> Result<FlowOutput<C>>
where
    I: Send + 'static,
    C: CustomState,
    S: Send + 'static,
{
    let session = session_from_context::<C>(&ctx)
        .ok_or_else(|| BidiError::config("session flow started without a session"))?;
    let snapshots = Arc::new(snapshots);

    debug!(
        flow = %name,
        session_id = %session.id(),
        resumed_from = ?init.snapshot_id,
        "Session flow started"
    );

    while let Some(input) = inputs.next().await {
        let turn_index = session.turn_index();
        let span = tracing::info_span!(
            "session_flow.turn",
            "otel.name" = %telemetry::turn_span_name(&name, turn_index),
            "sessionflow.agent.name" = %name,
            "sessionflow.session.id" = %session.id(),
            "sessionflow.turn.index" = turn_index,
        );

        async {
            let turn_ctx = TurnContext::new(
                ctx.clone(),
                session.clone(),
                responder.clone(),
                snapshots.clone(),
                turn_index,
            );
            turn(turn_ctx, input).await?;

            session.advance_turn();
            snapshots
                .fire(&ctx, &session, SnapshotEvent::TurnEnd, Some(&responder))
                .await?;
            responder.end_turn().await
        }
        .instrument(span)
        .await?;
    }

    if ctx.is_cancelled() {
        return Err(BidiError::Cancelled);
    }

    snapshots
        .fire(&ctx, &session, SnapshotEvent::InvocationEnd, None::<&Responder<StreamChunk<S>>>)
        .await?;

    let output = FlowOutput {
        session_id: session.id().to_string(),
        state: session.state(),
        snapshot_ids: snapshots.created(),
        turns: session.turn_index(),
    };

    info!(
        flow = %name,
        session_id = %output.session_id,
        turns = output.turns,
        snapshots = output.snapshot_ids.len(),
        "Session flow finished"
    );
    Ok(output)
}
