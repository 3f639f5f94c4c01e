// Snapshot coordination for a running session flow
//
// Wraps Session::maybe_snapshot with the flow-level steps: stream the
// notification, collect ids for the final output, and apply the strict/lenient
// store-failure rule.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::chunk::StreamChunk;
use crate::channel::Responder;
use crate::context::ActionContext;
use crate::error::Result;
use crate::session::{CustomState, Session};
use crate::snapshot::{SnapshotEvent, SnapshotPolicy};

pub(crate) struct SnapshotCoordinator<C> {
    policy: Arc<dyn SnapshotPolicy<C>>,
    strict: bool,
    created: Mutex<Vec<String>>,
}

impl<C: CustomState> SnapshotCoordinator<C> {
    pub(crate) fn new(policy: Arc<dyn SnapshotPolicy<C>>, strict: bool) -> Self {
        Self {
            policy,
            strict,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Evaluate the policy for `event`, returning the id of the snapshot taken
    ///
    /// With a responder the notification is streamed to the caller. Store and
    /// serialization failures are logged and swallowed unless strict.
    pub(crate) async fn fire<S>(
        &self,
        ctx: &ActionContext,
        session: &Session<C>,
        event: SnapshotEvent,
        responder: Option<&Responder<StreamChunk<S>>>,
    ) -> Result<Option<String>>
    where
        S: Send,
    {
        let snapshot = match session.maybe_snapshot(ctx, event, self.policy.as_ref()).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(None),
            Err(err) if self.strict => return Err(err),
            Err(err) => {
                warn!(
                    session_id = %session.id(),
                    event = %event,
                    error = %err,
                    "Snapshot failed, continuing without it"
                );
                return Ok(None);
            }
        };

        if let Some(responder) = responder {
            responder
                .send(StreamChunk::SnapshotCreated {
                    snapshot_id: snapshot.id.clone(),
                    turn_index: snapshot.turn_index,
                    event,
                })
                .await?;
        }

        let mut created = self.created.lock();
        if !created.contains(&snapshot.id) {
            created.push(snapshot.id.clone());
        }
        Ok(Some(snapshot.id))
    }

    /// Ids of the snapshots created during this invocation, in order
    pub(crate) fn created(&self) -> Vec<String> {
        self.created.lock().clone()
    }
}
