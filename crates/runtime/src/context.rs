//! Execution context carried through every action invocation

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Context provided to workers and nested operations
///
/// The context provides:
/// - Cooperative cancellation shared by the caller and the worker
/// - The name of the action being executed
/// - The session attached at connection start (see [`crate::session::session_from_context`])
///
/// Cloning is cheap; clones share the same cancellation token.
///
/// # Example
///
/// ```ignore
/// let ctx = ActionContext::new();
/// let conn = action.stream_bidi(&ctx, BidiOptions::new())?;
///
/// // Cancels every connection started from this context
/// ctx.cancel();
/// ```
#[derive(Clone, Default)]
pub struct ActionContext {
    cancel: CancellationToken,
    action_name: Option<Arc<str>>,
    session: Option<Arc<dyn Any + Send + Sync>>,
}

impl ActionContext {
    /// Create a root context with a fresh cancellation token
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context driven by an existing cancellation token
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..Default::default()
        }
    }

    /// Derive a context whose cancellation is a child of this one
    ///
    /// Cancelling the parent cancels the child; cancelling the child leaves
    /// the parent running.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            action_name: self.action_name.clone(),
            session: self.session.clone(),
        }
    }

    /// The underlying cancellation token
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolve when cancellation is requested
    ///
    /// Useful in `select!` loops:
    ///
    /// ```ignore
    /// tokio::select! {
    ///     _ = ctx.cancelled() => return Err(BidiError::Cancelled),
    ///     chunk = model.next() => { ... }
    /// }
    /// ```
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Name of the action currently executing, if any
    pub fn action_name(&self) -> Option<&str> {
        self.action_name.as_deref()
    }

    pub(crate) fn with_action_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.action_name = Some(name.into());
        self
    }

    pub(crate) fn with_session_handle(mut self, session: Arc<dyn Any + Send + Sync>) -> Self {
        self.session = Some(session);
        self
    }

    pub(crate) fn session_handle(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.session.clone()
    }
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("action_name", &self.action_name)
            .field("cancelled", &self.is_cancelled())
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_follows_parent_cancellation() {
        let parent = ActionContext::new();
        let child = parent.child();

        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_child_cancellation_does_not_reach_parent() {
        let parent = ActionContext::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_action_name_is_inherited() {
        let ctx = ActionContext::new().with_action_name("echo");
        assert_eq!(ctx.child().action_name(), Some("echo"));
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let ctx = ActionContext::new();
        let waiter = ctx.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        ctx.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("cancellation should wake the waiter")
            .unwrap();
    }
}
