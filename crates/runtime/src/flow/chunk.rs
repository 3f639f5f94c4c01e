// Stream items of a session flow
//
// Turn boundaries are not chunks: they travel as Frame::EndOfTurn and end the
// caller's receive() view instead of being yielded.

use serde::{Deserialize, Serialize};

use crate::session::{Artifact, MessageRole, Part};
use crate::snapshot::SnapshotEvent;

/// One fragment of model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationChunk {
    #[serde(default = "default_role")]
    pub role: MessageRole,
    pub content: Vec<Part>,
}

fn default_role() -> MessageRole {
    MessageRole::Assistant
}

impl GenerationChunk {
    pub fn new(content: Vec<Part>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content,
        }
    }

    /// Text delta
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![Part::text(text)])
    }

    /// Concatenated text content
    pub fn text_content(&self) -> String {
        self.content.iter().filter_map(Part::as_text).collect()
    }
}

/// Item emitted on a session flow's outbound stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk<S> {
    /// Model output, forwarded verbatim
    Generation { chunk: GenerationChunk },

    /// User-defined status value
    Status { status: S },

    /// Artifact produced this turn
    Artifact { artifact: Artifact },

    /// A snapshot was persisted
    SnapshotCreated {
        snapshot_id: String,
        turn_index: u64,
        event: SnapshotEvent,
    },
}

impl<S> StreamChunk<S> {
    pub fn generation(&self) -> Option<&GenerationChunk> {
        match self {
            StreamChunk::Generation { chunk } => Some(chunk),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<&S> {
        match self {
            StreamChunk::Status { status } => Some(status),
            _ => None,
        }
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            StreamChunk::Artifact { artifact } => Some(artifact),
            _ => None,
        }
    }

    /// Snapshot id if this is a snapshot notification
    pub fn snapshot_id(&self) -> Option<&str> {
        match self {
            StreamChunk::SnapshotCreated { snapshot_id, .. } => Some(snapshot_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_tagging() {
        let chunk: StreamChunk<String> = StreamChunk::SnapshotCreated {
            snapshot_id: "abc".to_string(),
            turn_index: 2,
            event: SnapshotEvent::TurnEnd,
        };
        let json = serde_json::to_value(&chunk).unwrap();

        assert_eq!(json["type"], "snapshot_created");
        assert_eq!(json["event"], "turn_end");
        assert_eq!(chunk.snapshot_id(), Some("abc"));
        assert!(chunk.status().is_none());
    }

    #[test]
    fn test_generation_chunk_defaults_role() {
        let chunk: GenerationChunk = serde_json::from_value(serde_json::json!({
            "content": [{ "type": "text", "text": "hi" }]
        }))
        .unwrap();

        assert_eq!(chunk.role, MessageRole::Assistant);
        assert_eq!(chunk.text_content(), "hi");
    }
}
