//! Bidirectional action definition

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use super::connection::{Connection, Terminal};
use crate::channel::{handoff, InputStream, Responder};
use crate::config::RuntimeConfig;
use crate::context::ActionContext;
use crate::error::{BidiError, Result};

/// Boxed future returned by a worker function
pub type BidiFuture<O> = BoxFuture<'static, Result<O>>;

/// Type-erased worker function
///
/// Shape: `(context, input stream, init value, responder) -> final result`.
pub type WorkerFn<I, O, N, S> =
    Arc<dyn Fn(ActionContext, InputStream<I>, N, Responder<S>) -> BidiFuture<O> + Send + Sync>;

/// Describes one of the four value types of an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Rust type name
    pub type_name: String,

    /// JSON schema supplied by a schema collaborator, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

impl TypeDescriptor {
    /// Describe `T` by its type name
    pub fn of<T: ?Sized>() -> Self {
        Self {
            type_name: type_name::<T>().to_string(),
            schema: None,
        }
    }
}

/// Which type descriptor a schema applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSlot {
    Input,
    Output,
    Init,
    Stream,
}

/// Introspectable description of a registered action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Unique action name
    pub name: String,
    /// Values sent by the caller
    pub input: TypeDescriptor,
    /// Final result of the worker
    pub output: TypeDescriptor,
    /// Initialization payload
    pub init: TypeDescriptor,
    /// Stream items emitted by the worker
    pub stream: TypeDescriptor,
}

impl ActionDescriptor {
    fn slot_mut(&mut self, slot: SchemaSlot) -> &mut TypeDescriptor {
        match slot {
            SchemaSlot::Input => &mut self.input,
            SchemaSlot::Output => &mut self.output,
            SchemaSlot::Init => &mut self.init,
            SchemaSlot::Stream => &mut self.stream,
        }
    }
}

/// Options for starting a connection
#[derive(Debug, Clone)]
pub struct BidiOptions<N> {
    /// Initialization payload (defaults to `N::default()`)
    pub init: Option<N>,
    /// Channel capacity override (defaults to the action's config)
    pub capacity: Option<usize>,
}

impl<N> Default for BidiOptions<N> {
    fn default() -> Self {
        Self {
            init: None,
            capacity: None,
        }
    }
}

impl<N> BidiOptions<N> {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply the initialization payload
    pub fn with_init(mut self, init: N) -> Self {
        self.init = Some(init);
        self
    }

    /// Override the channel capacity (0 = unbuffered)
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// A named, typed unit of bidirectional streaming work
///
/// Type parameters:
/// - `I`: input values sent by the caller
/// - `O`: final result
/// - `N`: initialization payload
/// - `S`: stream items emitted by the worker
///
/// Immutable once built; clones share the worker function.
///
/// # Example
///
/// ```ignore
/// let echo = BidiAction::new("echo", |_ctx, mut inputs: InputStream<String>, _init: (), out: Responder<String>| async move {
///     let mut count = 0;
///     while let Some(msg) = inputs.next().await {
///         out.send(format!("echo: {msg}")).await?;
///         count += 1;
///     }
///     Ok(format!("processed {count} messages"))
/// });
/// ```
pub struct BidiAction<I, O, N, S> {
    name: Arc<str>,
    worker: WorkerFn<I, O, N, S>,
    descriptor: ActionDescriptor,
    config: RuntimeConfig,
}

impl<I, O, N, S> Clone for BidiAction<I, O, N, S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            worker: self.worker.clone(),
            descriptor: self.descriptor.clone(),
            config: self.config.clone(),
        }
    }
}

impl<I, O, N, S> BidiAction<I, O, N, S>
where
    I: Send + 'static,
    O: Clone + Send + Sync + 'static,
    N: Default + Send + 'static,
    S: Send + 'static,
{
    /// Define an action from a worker function
    pub fn new<F, Fut>(name: impl Into<String>, worker: F) -> Self
    where
        F: Fn(ActionContext, InputStream<I>, N, Responder<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        let name: String = name.into();
        let worker: WorkerFn<I, O, N, S> = Arc::new(
            move |ctx: ActionContext,
                  inputs: InputStream<I>,
                  init: N,
                  responder: Responder<S>|
                  -> BidiFuture<O> { Box::pin(worker(ctx, inputs, init, responder)) },
        );

        Self {
            descriptor: ActionDescriptor {
                name: name.clone(),
                input: TypeDescriptor::of::<I>(),
                output: TypeDescriptor::of::<O>(),
                init: TypeDescriptor::of::<N>(),
                stream: TypeDescriptor::of::<S>(),
            },
            name: name.into(),
            worker,
            config: RuntimeConfig::default(),
        }
    }

    /// Use a runtime configuration for connections of this action
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a JSON schema to one of the type descriptors
    pub fn with_schema(mut self, slot: SchemaSlot, schema: serde_json::Value) -> Self {
        self.descriptor.slot_mut(slot).schema = Some(schema);
        self
    }

    /// Action name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type descriptors of this action
    pub fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    /// Runtime configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Start a connection
    ///
    /// Spawns the worker on a new task and returns immediately. The connection
    /// runs under a child of `ctx`, so cancelling `ctx` cancels it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn stream_bidi(
        &self,
        ctx: &ActionContext,
        options: BidiOptions<N>,
    ) -> Result<Connection<I, O, S>> {
        let capacity = options.capacity.unwrap_or(self.config.channel_capacity);
        let connection_id = Uuid::now_v7().to_string();
        let ctx = ctx.child().with_action_name(self.name.clone());
        let cancel = ctx.cancellation_token().clone();

        let (in_tx, in_rx) = handoff(capacity);
        let (out_tx, out_rx) = handoff(capacity);
        let (terminal_tx, terminal_rx) = watch::channel::<Terminal<O>>(None);

        let inputs = InputStream::new(in_rx, cancel.clone());
        let responder = Responder::new(out_tx, cancel.clone());
        let init = options.init.unwrap_or_default();

        let span = tracing::info_span!(
            "bidi.connection",
            "otel.name" = %crate::telemetry::connection_span_name(&self.name),
            "sessionflow.action.name" = %self.name,
            "sessionflow.connection.id" = %connection_id,
            "sessionflow.connection.state" = tracing::field::Empty,
        );

        debug!(
            connection_id = %connection_id,
            action = %self.name,
            capacity,
            "Starting connection"
        );

        let worker = self.worker.clone();
        let runner_cancel = cancel.clone();
        tokio::spawn(
            async move {
                let outcome = tokio::select! {
                    biased;
                    _ = runner_cancel.cancelled() => Err(BidiError::Cancelled),
                    result = worker(ctx, inputs, init, responder) => result,
                };

                let span = tracing::Span::current();
                match &outcome {
                    Ok(_) => {
                        span.record("sessionflow.connection.state", "completed");
                        debug!("Connection completed");
                    }
                    Err(BidiError::Cancelled) => {
                        span.record("sessionflow.connection.state", "cancelled");
                        info!("Connection cancelled");
                    }
                    Err(err) => {
                        span.record("sessionflow.connection.state", "failed");
                        warn!(error = %err, "Connection failed");
                    }
                }

                terminal_tx.send_if_modified(|terminal| {
                    if terminal.is_some() {
                        return false;
                    }
                    *terminal = Some(outcome);
                    true
                });
            }
            .instrument(span),
        );

        Ok(Connection::new(
            connection_id,
            self.name.to_string(),
            in_tx,
            out_rx,
            terminal_rx,
            cancel,
        ))
    }
}

impl<I, O, N, S> fmt::Debug for BidiAction<I, O, N, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BidiAction")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> BidiAction<u32, u32, u32, u32> {
        BidiAction::new(
            "counter",
            |_ctx, mut inputs: InputStream<u32>, start: u32, out: Responder<u32>| async move {
                let mut total = start;
                while let Some(n) = inputs.next().await {
                    total += n;
                    out.send(total).await?;
                }
                Ok(total)
            },
        )
    }

    #[test]
    fn test_descriptor_type_names() {
        let action = counter();
        let descriptor = action.descriptor();

        assert_eq!(descriptor.name, "counter");
        assert_eq!(descriptor.input.type_name, "u32");
        assert_eq!(descriptor.stream.type_name, "u32");
        assert!(descriptor.output.schema.is_none());
    }

    #[test]
    fn test_with_schema() {
        let action = counter().with_schema(
            SchemaSlot::Input,
            serde_json::json!({ "type": "integer" }),
        );

        assert_eq!(
            action.descriptor().input.schema,
            Some(serde_json::json!({ "type": "integer" }))
        );
        assert!(action.descriptor().init.schema.is_none());
    }

    #[tokio::test]
    async fn test_init_value_reaches_worker() {
        let action = counter();
        let conn = action
            .stream_bidi(
                &ActionContext::new(),
                BidiOptions::new().with_init(100).with_capacity(4),
            )
            .unwrap();

        conn.send(1).await.unwrap();
        conn.close();

        assert_eq!(conn.output().await.unwrap(), 101);
    }

    #[tokio::test]
    async fn test_default_init_when_not_supplied() {
        let action = counter().with_config(RuntimeConfig::new().with_channel_capacity(4));
        let conn = action
            .stream_bidi(&ActionContext::new(), BidiOptions::new())
            .unwrap();

        conn.send(5).await.unwrap();
        conn.close();

        assert_eq!(conn.output().await.unwrap(), 5);
    }
}
