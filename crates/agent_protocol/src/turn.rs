use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered conversation history. Owned by the client; the server only ever
/// sees it as a per-request snapshot.
pub type History = Vec<Turn>;

/// Record of one tool invocation requested during an agent turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallRecord {
    #[must_use]
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Outcome of one tool invocation, correlated to its call by `call_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolResultRecord {
    pub call_id: String,
    pub output: String,
    pub failed: bool,
}

impl ToolResultRecord {
    #[must_use]
    pub fn success(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
            failed: false,
        }
    }

    #[must_use]
    pub fn failure(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
            failed: true,
        }
    }
}

/// One immutable entry of conversation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    UserMessage { text: String },
    AssistantMessage { text: String },
    ToolCall(ToolCallRecord),
    ToolResult(ToolResultRecord),
}

impl Turn {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::UserMessage { text: text.into() }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::AssistantMessage { text: text.into() }
    }

    /// Short label used in logs and diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserMessage { .. } => "user_message",
            Self::AssistantMessage { .. } => "assistant_message",
            Self::ToolCall(_) => "tool_call",
            Self::ToolResult(_) => "tool_result",
        }
    }
}
