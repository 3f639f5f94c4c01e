//! Per-turn handle given to session flow turn functions

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use tracing::debug;

use super::chunk::{GenerationChunk, StreamChunk};
use super::coordinator::SnapshotCoordinator;
use super::generate::{assemble_message, ModelGenerator};
use crate::channel::Responder;
use crate::context::ActionContext;
use crate::error::{BidiError, Result};
use crate::session::{Artifact, CustomState, Message, Session};
use crate::snapshot::SnapshotEvent;

/// Everything a turn function needs for one turn
///
/// - [`session`](Self::session) for reading and updating state
/// - `send_*` methods for streaming to the caller
/// - [`generate`](Self::generate) to run a model and stream its output
/// - [`tool_iteration_end`](Self::tool_iteration_end) after a batch of tool calls
///
/// The turn boundary itself is emitted by the flow once the turn function
/// returns.
pub struct TurnContext<C, S> {
    ctx: ActionContext,
    session: Arc<Session<C>>,
    responder: Responder<StreamChunk<S>>,
    snapshots: Arc<SnapshotCoordinator<C>>,
    turn_index: u64,
}

impl<C, S> TurnContext<C, S>
where
    C: CustomState,
    S: Send + 'static,
{
    pub(crate) fn new(
        ctx: ActionContext,
        session: Arc<Session<C>>,
        responder: Responder<StreamChunk<S>>,
        snapshots: Arc<SnapshotCoordinator<C>>,
        turn_index: u64,
    ) -> Self {
        Self {
            ctx,
            session,
            responder,
            snapshots,
            turn_index,
        }
    }

    /// Execution context (carries cancellation and the session)
    pub fn context(&self) -> &ActionContext {
        &self.ctx
    }

    pub fn session(&self) -> &Arc<Session<C>> {
        &self.session
    }

    /// Zero-based index of this turn within the session
    pub fn turn_index(&self) -> u64 {
        self.turn_index
    }

    pub fn is_cancelled(&self) -> bool {
        self.ctx.is_cancelled()
    }

    /// Stream a user-defined status value
    pub async fn send_status(&self, status: S) -> Result<()> {
        self.responder.send(StreamChunk::Status { status }).await
    }

    /// Stream one generation chunk verbatim
    pub async fn send_generation(&self, chunk: GenerationChunk) -> Result<()> {
        self.responder.send(StreamChunk::Generation { chunk }).await
    }

    /// Stream an artifact and upsert it into the session
    ///
    /// The session is updated before the artifact is streamed, so a snapshot
    /// taken at the end of this turn always contains it.
    pub async fn send_artifact(&self, artifact: Artifact) -> Result<()> {
        self.session.add_artifact(artifact.clone());
        self.responder.send(StreamChunk::Artifact { artifact }).await
    }

    /// Run the generator over the session history
    ///
    /// Every chunk is forwarded to the caller as it arrives. The assembled
    /// reply is appended to the session and returned.
    pub async fn generate(&self, generator: &dyn ModelGenerator) -> Result<Message> {
        let mut stream = generator
            .generate_stream(&self.ctx, self.session.messages())
            .await?;

        let mut chunks = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = self.ctx.cancelled() => return Err(BidiError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk?;
            self.send_generation(chunk.clone()).await?;
            chunks.push(chunk);
        }

        let message = assemble_message(&chunks);
        debug!(
            session_id = %self.session.id(),
            chunks = chunks.len(),
            "Generation finished"
        );
        self.session.add_message(message.clone());
        Ok(message)
    }

    /// Mark the end of a tool iteration
    ///
    /// Evaluates the snapshot policy with [`SnapshotEvent::ToolIterationEnd`]
    /// and returns the id of the snapshot taken, if any.
    pub async fn tool_iteration_end(&self) -> Result<Option<String>> {
        self.snapshots
            .fire(
                &self.ctx,
                &self.session,
                SnapshotEvent::ToolIterationEnd,
                Some(&self.responder),
            )
            .await
    }
}

impl<C, S> fmt::Debug for TurnContext<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnContext")
            .field("session", &self.session)
            .field("turn_index", &self.turn_index)
            .finish_non_exhaustive()
    }
}
