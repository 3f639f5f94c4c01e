// Session propagation through ActionContext
//
// The session is stored type-erased in the context and recovered by
// downcasting, so nested operations reach the same session without it being
// threaded through every signature.

use std::sync::Arc;

use super::{CustomState, Session};
use crate::context::ActionContext;

/// Derive a context that carries `session`
pub fn with_session_context<C: CustomState>(
    ctx: &ActionContext,
    session: Arc<Session<C>>,
) -> ActionContext {
    ctx.clone().with_session_handle(session)
}

/// Session attached to `ctx`, if one with custom state `C` is present
pub fn session_from_context<C: CustomState>(ctx: &ActionContext) -> Option<Arc<Session<C>>> {
    ctx.session_handle()?.downcast::<Session<C>>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Message, SessionState};

    #[test]
    fn test_round_trip_through_context() {
        let session = Arc::new(Session::<u32>::new(SessionState::default()));
        let ctx = with_session_context(&ActionContext::new(), session.clone());

        let found = session_from_context::<u32>(&ctx).expect("session attached");
        found.add_message(Message::user("via context"));

        assert!(Arc::ptr_eq(&found, &session));
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn test_missing_or_mismatched_session() {
        assert!(session_from_context::<u32>(&ActionContext::new()).is_none());

        let session = Arc::new(Session::<u32>::new(SessionState::default()));
        let ctx = with_session_context(&ActionContext::new(), session);
        assert!(session_from_context::<String>(&ctx).is_none());
    }

    #[test]
    fn test_child_context_keeps_session() {
        let session = Arc::new(Session::<u32>::new(SessionState::default()));
        let ctx = with_session_context(&ActionContext::new(), session);

        assert!(session_from_context::<u32>(&ctx.child()).is_some());
    }
}
