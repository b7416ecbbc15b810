use agent_protocol::{ToolCallRecord, ToolResultRecord, Turn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const HISTORY_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct HistoryDocument {
    pub version: u32,
    pub turns: Vec<TurnRecord>,
}

/// Version is read on its own first so a future layout reports a version
/// mismatch instead of a field error.
#[derive(Debug, Deserialize)]
pub(crate) struct VersionProbe {
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub(crate) enum TurnRecord {
    UserMessage {
        text: String,
    },
    AssistantMessage {
        text: String,
    },
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: Map<String, Value>,
    },
    ToolResult {
        call_id: String,
        output: String,
        failed: bool,
    },
}

impl From<&Turn> for TurnRecord {
    fn from(turn: &Turn) -> Self {
        match turn {
            Turn::UserMessage { text } => Self::UserMessage { text: text.clone() },
            Turn::AssistantMessage { text } => Self::AssistantMessage { text: text.clone() },
            Turn::ToolCall(record) => Self::ToolCall {
                call_id: record.call_id.clone(),
                tool_name: record.tool_name.clone(),
                arguments: record.arguments.clone(),
            },
            Turn::ToolResult(record) => Self::ToolResult {
                call_id: record.call_id.clone(),
                output: record.output.clone(),
                failed: record.failed,
            },
        }
    }
}

impl From<TurnRecord> for Turn {
    fn from(record: TurnRecord) -> Self {
        match record {
            TurnRecord::UserMessage { text } => Turn::UserMessage { text },
            TurnRecord::AssistantMessage { text } => Turn::AssistantMessage { text },
            TurnRecord::ToolCall {
                call_id,
                tool_name,
                arguments,
            } => Turn::ToolCall(ToolCallRecord {
                call_id,
                tool_name,
                arguments,
            }),
            TurnRecord::ToolResult {
                call_id,
                output,
                failed,
            } => Turn::ToolResult(ToolResultRecord {
                call_id,
                output,
                failed,
            }),
        }
    }
}
