// Model generation abstraction
//
// The runtime does not talk to any model provider. A turn function hands a
// ModelGenerator to TurnContext::generate, which forwards every chunk to the
// caller and appends the assembled reply to the session.

use std::pin::Pin;

use futures::Stream;

use super::chunk::GenerationChunk;
use crate::context::ActionContext;
use crate::error::Result;
use crate::session::{Message, MessageRole, Part};

/// Type alias for boxed async stream of generation chunks
pub type GenerationStream = Pin<Box<dyn Stream<Item = Result<GenerationChunk>> + Send>>;

/// Provider-agnostic streaming generator
#[async_trait::async_trait]
pub trait ModelGenerator: Send + Sync {
    /// Stream a reply to the given conversation
    async fn generate_stream(
        &self,
        ctx: &ActionContext,
        messages: Vec<Message>,
    ) -> Result<GenerationStream>;
}

/// Fold streamed chunks into one message
///
/// Adjacent text parts are merged; other parts are kept in order.
pub fn assemble_message(chunks: &[GenerationChunk]) -> Message {
    let role = chunks
        .first()
        .map(|c| c.role)
        .unwrap_or(MessageRole::Assistant);

    let mut content: Vec<Part> = Vec::new();
    for part in chunks.iter().flat_map(|c| c.content.iter()) {
        match (content.last_mut(), part) {
            (Some(Part::Text { text: acc }), Part::Text { text }) => acc.push_str(text),
            _ => content.push(part.clone()),
        }
    }

    Message::new(role, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_merges_text() {
        let chunks = vec![
            GenerationChunk::text("Hel"),
            GenerationChunk::text("lo"),
            GenerationChunk::new(vec![Part::tool_call("c1", "search", serde_json::json!({}))]),
            GenerationChunk::text("!"),
        ];

        let message = assemble_message(&chunks);
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.content.len(), 3);
        assert_eq!(message.content[0].as_text(), Some("Hello"));
        assert_eq!(message.text(), "Hello!");
    }

    #[test]
    fn test_assemble_empty() {
        let message = assemble_message(&[]);
        assert!(message.content.is_empty());
    }
}
