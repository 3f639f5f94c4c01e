// Session state types
//
// SessionState is the portable conversational payload: message history,
// a user-defined custom value, and named artifacts. It is what snapshots
// capture, so every type here serializes deterministically (BTreeMap for
// metadata, no timestamps or random ids inside messages).

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Free-form metadata attached to messages and artifacts
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Bounds required of a user-defined custom state value
///
/// Blanket-implemented; any cloneable, comparable, serializable type with a
/// default value qualifies.
pub trait CustomState:
    Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> CustomState for T where
    T: Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Message role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// System message (instructions)
    System,
    /// User message
    User,
    /// Agent response (may contain tool calls in content)
    #[serde(rename = "agent")]
    Assistant,
    /// Tool execution result
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "agent"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

// ============================================
// Content parts
// ============================================

/// One piece of message or artifact content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    Media {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
    },
    Data {
        data: serde_json::Value,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn media(url: impl Into<String>, content_type: Option<String>) -> Self {
        Part::Media {
            url: url.into(),
            content_type,
        }
    }

    pub fn data(data: serde_json::Value) -> Self {
        Part::Data { data }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Part::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    pub fn tool_success(tool_call_id: impl Into<String>, result: serde_json::Value) -> Self {
        Part::ToolResult {
            tool_call_id: tool_call_id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn tool_error(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Part::ToolResult {
            tool_call_id: tool_call_id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    /// Text content if this is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Concatenate the text parts of a content list
fn join_text(parts: &[Part]) -> String {
    parts.iter().filter_map(Part::as_text).collect()
}

// ============================================
// Messages and artifacts
// ============================================

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Message {
    /// Create a message from content parts
    pub fn new(role: MessageRole, content: Vec<Part>) -> Self {
        Self {
            role,
            content,
            metadata: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, vec![Part::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, vec![Part::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, vec![Part::text(text)])
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value);
        self
    }

    /// Concatenated text content
    pub fn text(&self) -> String {
        join_text(&self.content)
    }

    /// Tool call parts of this message
    pub fn tool_calls(&self) -> impl Iterator<Item = &Part> {
        self.content
            .iter()
            .filter(|p| matches!(p, Part::ToolCall { .. }))
    }
}

/// A named output of the session
///
/// Names are unique within a session; adding an artifact with an existing
/// name replaces it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            name: name.into(),
            parts,
            metadata: None,
        }
    }

    /// Single text-part artifact
    pub fn text_artifact(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, vec![Part::text(text)])
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value);
        self
    }

    /// Concatenated text content
    pub fn text(&self) -> String {
        join_text(&self.parts)
    }
}

// ============================================
// Session state
// ============================================

/// Portable conversational state captured by snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState<C> {
    /// Conversation history in append order
    #[serde(default)]
    pub messages: Vec<Message>,

    /// User-defined state
    pub custom: C,

    /// Named artifacts, unique by name
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl<C> SessionState<C> {
    /// State with the given custom value and no history
    pub fn with_custom(custom: C) -> Self {
        Self {
            messages: Vec::new(),
            custom,
            artifacts: Vec::new(),
        }
    }

    /// Insert or replace an artifact by name, keeping its position on replace
    pub fn upsert_artifact(&mut self, artifact: Artifact) {
        match self.artifacts.iter_mut().find(|a| a.name == artifact.name) {
            Some(existing) => *existing = artifact,
            None => self.artifacts.push(artifact),
        }
    }

    /// Look up an artifact by name
    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(
            serde_json::to_value(MessageRole::Assistant).unwrap(),
            serde_json::json!("agent")
        );
        assert_eq!(MessageRole::Tool.to_string(), "tool");
    }

    #[test]
    fn test_part_tagging() {
        let json = serde_json::to_value(Part::tool_call("c1", "search", serde_json::json!({}))).unwrap();
        assert_eq!(json["type"], "tool_call");
        assert_eq!(json["name"], "search");

        let part: Part = serde_json::from_value(serde_json::json!({ "type": "text", "text": "hi" })).unwrap();
        assert_eq!(part.as_text(), Some("hi"));
    }

    #[test]
    fn test_message_text_joins_text_parts() {
        let msg = Message::new(
            MessageRole::Assistant,
            vec![
                Part::text("Hello, "),
                Part::tool_call("c1", "lookup", serde_json::json!({ "q": "x" })),
                Part::text("world"),
            ],
        );

        assert_eq!(msg.text(), "Hello, world");
        assert_eq!(msg.tool_calls().count(), 1);
    }

    #[test]
    fn test_metadata_omitted_when_absent() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(json.get("metadata").is_none());

        let json = serde_json::to_value(Message::user("hi").with_metadata("k", serde_json::json!(1))).unwrap();
        assert_eq!(json["metadata"]["k"], 1);
    }

    #[test]
    fn test_upsert_artifact_replaces_by_name() {
        let mut state = SessionState::<()>::default();
        state.upsert_artifact(Artifact::text_artifact("report", "v1"));
        state.upsert_artifact(Artifact::text_artifact("summary", "s"));
        state.upsert_artifact(Artifact::text_artifact("report", "v2"));

        assert_eq!(state.artifacts.len(), 2);
        assert_eq!(state.artifacts[0].name, "report");
        assert_eq!(state.artifact("report").unwrap().text(), "v2");
    }

    #[test]
    fn test_state_deserializes_with_missing_lists() {
        let state: SessionState<u32> = serde_json::from_value(serde_json::json!({ "custom": 3 })).unwrap();
        assert_eq!(state.custom, 3);
        assert!(state.messages.is_empty());
        assert!(state.artifacts.is_empty());
    }
}
