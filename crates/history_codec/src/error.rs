use thiserror::Error;

/// Every decode failure is a malformed-history condition: the request that
/// carried it fails and the caller's history is left as it was.
#[derive(Debug, Error)]
pub enum HistoryCodecError {
    #[error("malformed history: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize history: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed history: unsupported version {found}; expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("malformed history: turn {index} is a tool call with an empty call id")]
    EmptyCallId { index: usize },

    #[error("malformed history: turn {index} reuses call id '{call_id}' within one agent turn")]
    DuplicateCallId { index: usize, call_id: String },

    #[error("malformed history: turn {index} is a result for '{call_id}' with no pending tool call")]
    UnmatchedToolResult { index: usize, call_id: String },

    #[error("malformed history: tool call '{call_id}' at turn {index} never received a result")]
    UnresolvedToolCall { index: usize, call_id: String },
}

impl HistoryCodecError {
    #[must_use]
    pub fn json(source: serde_json::Error) -> Self {
        Self::Json { source }
    }

    #[must_use]
    pub fn serialize(source: serde_json::Error) -> Self {
        Self::Serialize { source }
    }

    #[must_use]
    pub fn unmatched(index: usize, call_id: impl Into<String>) -> Self {
        Self::UnmatchedToolResult {
            index,
            call_id: call_id.into(),
        }
    }

    #[must_use]
    pub fn unresolved(index: usize, call_id: impl Into<String>) -> Self {
        Self::UnresolvedToolCall {
            index,
            call_id: call_id.into(),
        }
    }
}
