//! Request and response bodies of the agent server's HTTP endpoints.

use serde::{Deserialize, Serialize};

pub const HEALTH_PATH: &str = "/health";
pub const RUN_PATH: &str = "/run";
pub const RUN_STREAM_PATH: &str = "/run-stream";
pub const ADD_ALLOWED_DIR_PATH: &str = "/add-allowed-dir";

/// Body of `/run` and `/run-stream`. `history` is the encoded history; the
/// empty string starts a fresh conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub prompt: String,
    #[serde(default)]
    pub history: String,
}

impl RunRequest {
    #[must_use]
    pub fn new(prompt: impl Into<String>, history: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            history: history.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

/// Non-streaming outcome of one agent turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResponse {
    pub status: RunStatus,
    pub output: String,
    pub history: String,
}

impl RunResponse {
    #[must_use]
    pub fn success(output: impl Into<String>, history: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Success,
            output: output.into(),
            history: history.into(),
        }
    }

    /// Failed turns echo the inbound history so the caller's state is unchanged.
    #[must_use]
    pub fn error(message: impl Into<String>, history: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            output: message.into(),
            history: history.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowDirRequest {
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowDirStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowDirResponse {
    pub status: AllowDirStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AllowDirResponse {
    #[must_use]
    pub fn ok(path: impl Into<String>) -> Self {
        Self {
            status: AllowDirStatus::Ok,
            path: Some(path.into()),
            message: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: AllowDirStatus::Error,
            path: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub provider: String,
    pub model: String,
}
