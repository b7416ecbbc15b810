use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::turn::{ToolCallRecord, ToolResultRecord};

/// Typed unit of the live event channel for one agent turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    ToolPhaseStart,
    ToolCall(ToolCallRecord),
    ToolResult(ToolResultRecord),
    ToolPhaseEnd,
    /// Answer-text fragment, appended verbatim to rebuild the full answer.
    Chunk { text: String },
    /// Carries the encoded history the client must adopt wholesale.
    Complete { history: String },
    Error { message: String },
}

impl StreamEvent {
    #[must_use]
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::Chunk { text: text.into() }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::ToolPhaseStart => FrameType::ToolPhaseStart,
            Self::ToolCall(_) => FrameType::ToolCall,
            Self::ToolResult(_) => FrameType::ToolResult,
            Self::ToolPhaseEnd => FrameType::ToolPhaseEnd,
            Self::Chunk { .. } => FrameType::Chunk,
            Self::Complete { .. } => FrameType::Complete,
            Self::Error { .. } => FrameType::Error,
        }
    }

    /// Returns true when this event ends the agent turn.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.frame_type().is_terminal()
    }

    pub fn to_frame(&self) -> Result<WireFrame, FrameError> {
        let content = match self {
            Self::ToolPhaseStart | Self::ToolPhaseEnd => String::new(),
            Self::ToolCall(record) => serde_json::to_string(record)
                .map_err(|source| FrameError::encode(FrameType::ToolCall, source))?,
            Self::ToolResult(record) => serde_json::to_string(record)
                .map_err(|source| FrameError::encode(FrameType::ToolResult, source))?,
            Self::Chunk { text } => text.clone(),
            Self::Complete { history } => history.clone(),
            Self::Error { message } => message.clone(),
        };

        Ok(WireFrame {
            frame_type: self.frame_type(),
            content,
        })
    }
}

/// Discriminant of a [`WireFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    ToolPhaseStart,
    ToolCall,
    ToolResult,
    ToolPhaseEnd,
    Chunk,
    Complete,
    Error,
}

impl FrameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolPhaseStart => "tool_phase_start",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::ToolPhaseEnd => "tool_phase_end",
            Self::Chunk => "chunk",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// JSON body of one SSE `data:` line: `{"type": ..., "content": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFrame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    #[serde(default)]
    pub content: String,
}

impl WireFrame {
    pub fn to_json(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(|source| FrameError::encode(self.frame_type, source))
    }

    pub fn from_json(payload: &str) -> Result<Self, FrameError> {
        serde_json::from_str(payload).map_err(FrameError::InvalidFrame)
    }

    pub fn into_event(self) -> Result<StreamEvent, FrameError> {
        Ok(match self.frame_type {
            FrameType::ToolPhaseStart => StreamEvent::ToolPhaseStart,
            FrameType::ToolPhaseEnd => StreamEvent::ToolPhaseEnd,
            FrameType::ToolCall => StreamEvent::ToolCall(
                serde_json::from_str(&self.content)
                    .map_err(|source| FrameError::content(FrameType::ToolCall, source))?,
            ),
            FrameType::ToolResult => StreamEvent::ToolResult(
                serde_json::from_str(&self.content)
                    .map_err(|source| FrameError::content(FrameType::ToolResult, source))?,
            ),
            FrameType::Chunk => StreamEvent::Chunk { text: self.content },
            FrameType::Complete => StreamEvent::Complete {
                history: self.content,
            },
            FrameType::Error => StreamEvent::Error {
                message: self.content,
            },
        })
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid stream frame: {0}")]
    InvalidFrame(#[source] serde_json::Error),

    #[error("malformed {} frame content: {source}", frame_type.as_str())]
    MalformedContent {
        frame_type: FrameType,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {} frame: {source}", frame_type.as_str())]
    Encode {
        frame_type: FrameType,
        #[source]
        source: serde_json::Error,
    },
}

impl FrameError {
    #[must_use]
    pub fn content(frame_type: FrameType, source: serde_json::Error) -> Self {
        Self::MalformedContent { frame_type, source }
    }

    #[must_use]
    pub fn encode(frame_type: FrameType, source: serde_json::Error) -> Self {
        Self::Encode { frame_type, source }
    }
}
