// Sessionflow Runtime - Bidirectional Streaming Actions
//
// Decision: Actions are typed over input, output, init and stream values; connections run the worker on its own task
// Decision: Turn boundaries are an explicit Responder::end_turn() call, never a data field on stream items
// Decision: Snapshot ids are content-addressed; identical states within a session deduplicate
// Decision: Store failures on the snapshot policy path are logged unless RuntimeConfig::strict_snapshots is set
//
// Module overview:
// - channel: duplex hand-off channels, InputStream and Responder
// - action: BidiAction, Connection, ActionRegistry
// - session: Session and SessionState, context propagation
// - snapshot: Snapshot model, SnapshotStore trait, in-memory store, policies
// - flow: SessionFlow turn loop, TurnContext, StreamChunk, ModelGenerator

pub mod action;
pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod flow;
pub mod session;
pub mod snapshot;
pub mod telemetry;

pub use action::{
    ActionDescriptor, ActionRegistry, BidiAction, BidiOptions, Connection, ConnectionState,
    Registrable, RegistryError, SchemaSlot, TypeDescriptor,
};
pub use channel::{InputStream, Responder};
pub use config::RuntimeConfig;
pub use context::ActionContext;
pub use error::{BidiError, Result};
pub use flow::{
    FlowInit, FlowOptions, FlowOutput, GenerationChunk, GenerationStream, ModelGenerator,
    SessionFlow, SessionFlowBuilder, StreamChunk, TurnContext,
};
pub use session::{
    session_from_context, with_session_context, Artifact, CustomState, Message, MessageRole, Part,
    Session, SessionState,
};
pub use snapshot::{
    InMemorySnapshotStore, Snapshot, SnapshotContext, SnapshotEvent, SnapshotPolicy,
    SnapshotPolicyExt, SnapshotStore, StoreError,
};

/// Common imports for defining actions and flows
pub mod prelude {
    pub use crate::action::{ActionRegistry, BidiAction, BidiOptions, Connection};
    pub use crate::channel::{InputStream, Responder};
    pub use crate::context::ActionContext;
    pub use crate::error::{BidiError, Result};
    pub use crate::flow::{
        FlowOptions, FlowOutput, GenerationChunk, ModelGenerator, SessionFlowBuilder,
        StreamChunk, TurnContext,
    };
    pub use crate::session::{Artifact, Message, Part, Session, SessionState};
    pub use crate::snapshot::policy::{always, never, on_change, on_events};
    pub use crate::snapshot::{InMemorySnapshotStore, SnapshotEvent, SnapshotPolicyExt};
}
