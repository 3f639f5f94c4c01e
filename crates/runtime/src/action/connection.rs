//! Live invocation of a bidirectional action

use std::fmt;

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::channel::{Frame, HandoffReceiver, HandoffSender};
use crate::error::{BidiError, Result};

/// Terminal value of a connection; `None` while running
pub(crate) type Terminal<O> = Option<Result<O>>;

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Worker is still executing
    Running,
    /// Worker returned a value
    Completed,
    /// Worker returned an error or the connection was cancelled
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

enum Step<S> {
    Item(S),
    EndOfTurn,
    Finished(Option<BidiError>),
}

/// One running invocation of a [`BidiAction`](crate::BidiAction)
///
/// The worker runs on its own task, started when the connection is created.
/// The caller talks to it through:
/// - [`send`](Self::send) / [`close`](Self::close) for input
/// - [`receive`](Self::receive) for stream items, one turn per call
/// - [`output`](Self::output) / [`done`](Self::done) for the terminal result
///
/// With unbuffered channels (the default) `send` waits for the worker to take
/// the value and the worker's emits wait for `receive`, so a caller with both
/// directions in flight must drain `receive` concurrently with `send`.
pub struct Connection<I, O, S> {
    id: String,
    action_name: String,
    inbound: Mutex<Option<HandoffSender<I>>>,
    outbound: tokio::sync::Mutex<HandoffReceiver<Frame<S>>>,
    terminal: watch::Receiver<Terminal<O>>,
    cancel: CancellationToken,
}

impl<I, O, S> Connection<I, O, S>
where
    I: Send + 'static,
    O: Clone + Send + Sync + 'static,
    S: Send + 'static,
{
    pub(crate) fn new(
        id: String,
        action_name: String,
        inbound: HandoffSender<I>,
        outbound: HandoffReceiver<Frame<S>>,
        terminal: watch::Receiver<Terminal<O>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            action_name,
            inbound: Mutex::new(Some(inbound)),
            outbound: tokio::sync::Mutex::new(outbound),
            terminal,
            cancel,
        }
    }

    /// Unique connection identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the action this connection runs
    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    /// Send one input value to the worker
    ///
    /// Safe to call concurrently; each send is delivered atomically, but the
    /// interleaving between concurrent callers is unspecified.
    ///
    /// # Errors
    ///
    /// - [`BidiError::ConnectionClosed`] after [`close`](Self::close) or once
    ///   the worker stopped reading. The connection state is not affected.
    /// - [`BidiError::Cancelled`] if the connection is cancelled while waiting.
    ///
    /// On an unbuffered connection the value is queued before the worker
    /// acknowledges it. A send abandoned while waiting (dropped future,
    /// elapsed timeout) is still delivered to the worker.
    pub async fn send(&self, value: I) -> Result<()> {
        let tx = self
            .inbound
            .lock()
            .clone()
            .ok_or(BidiError::ConnectionClosed)?;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BidiError::Cancelled),
            sent = tx.send(value) => sent.map_err(|_| BidiError::ConnectionClosed),
        }
    }

    /// Signal that no further input will be sent
    ///
    /// The worker's input stream ends once in-flight sends complete. Idempotent.
    pub fn close(&self) {
        if self.inbound.lock().take().is_some() {
            debug!(connection_id = %self.id, action = %self.action_name, "Connection input closed");
        }
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.inbound.lock().is_none()
    }

    /// Cancel this connection
    ///
    /// Pending `send`/`receive` calls fail with [`BidiError::Cancelled`] and
    /// `output()` returns the same error.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stream the items of the current turn
    ///
    /// Each call returns a fresh view over the same outbound channel. The view
    /// ends at the next turn boundary, or when the connection terminates; a
    /// terminal error is yielded once as the last element. Dropping a view
    /// early never closes the connection.
    pub fn receive(&self) -> impl Stream<Item = Result<S>> + Send + '_ {
        futures::stream::unfold(false, move |finished| async move {
            if finished {
                return None;
            }
            match self.next_step().await {
                Step::Item(item) => Some((Ok(item), false)),
                Step::EndOfTurn => None,
                Step::Finished(Some(err)) => Some((Err(err), true)),
                Step::Finished(None) => None,
            }
        })
    }

    /// Wait for the terminal result
    ///
    /// Every caller observes the same value, however many times it is called.
    pub async fn output(&self) -> Result<O> {
        let mut terminal = self.terminal.clone();
        let result = match terminal.wait_for(|t| t.is_some()).await {
            Ok(outcome) => (*outcome)
                .clone()
                .unwrap_or_else(|| Err(BidiError::worker("connection finished without a result"))),
            Err(_) => Err(BidiError::worker("worker task exited without a result")),
        };
        result
    }

    /// Wait until the connection reached a terminal state
    pub async fn done(&self) {
        let mut terminal = self.terminal.clone();
        let _ = terminal.wait_for(|t| t.is_some()).await;
    }

    /// Whether the connection reached a terminal state
    pub fn is_done(&self) -> bool {
        self.terminal.borrow().is_some()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        match &*self.terminal.borrow() {
            None => ConnectionState::Running,
            Some(Ok(_)) => ConnectionState::Completed,
            Some(Err(_)) => ConnectionState::Failed,
        }
    }

    fn terminal_error(&self) -> Option<BidiError> {
        match &*self.terminal.borrow() {
            Some(Err(err)) => Some(err.clone()),
            Some(Ok(_)) => None,
            None => Some(BidiError::worker("worker task exited without a result")),
        }
    }

    async fn next_step(&self) -> Step<S> {
        let frame = {
            let mut outbound = self.outbound.lock().await;
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                frame = outbound.recv() => frame,
                _ = self.done() => None,
            }
        };

        match frame {
            Some(Frame::Item(item)) => Step::Item(item),
            Some(Frame::EndOfTurn) => Step::EndOfTurn,
            None => {
                self.done().await;
                Step::Finished(self.terminal_error())
            }
        }
    }
}

impl<I, O, S> fmt::Debug for Connection<I, O, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("action_name", &self.action_name)
            .field("closed", &self.inbound.lock().is_none())
            .field("done", &self.terminal.borrow().is_some())
            .finish()
    }
}
