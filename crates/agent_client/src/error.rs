use std::fmt;

use agent_protocol::FrameError;
use reqwest::StatusCode;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum AgentClientError {
    InvalidBaseUrl(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    MalformedFrame(FrameError),
    Serde(JsonError),
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
}

impl AgentClientError {
    /// True when the server could not be reached at all, as opposed to
    /// answering with an error.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Request(error) => error.is_connect() || error.is_timeout(),
            Self::RetryExhausted { status, .. } => status.is_none(),
            _ => false,
        }
    }
}

impl fmt::Display for AgentClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::MalformedFrame(error) => write!(f, "malformed stream frame: {error}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                let last_error = last_error.as_deref().unwrap_or("none");
                write!(
                    f,
                    "retry exhausted after max attempts (status: {status}, last error: {last_error})"
                )
            }
        }
    }
}

impl std::error::Error for AgentClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(error) => Some(error),
            Self::MalformedFrame(error) => Some(error),
            Self::Serde(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AgentClientError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for AgentClientError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

impl From<FrameError> for AgentClientError {
    fn from(error: FrameError) -> Self {
        Self::MalformedFrame(error)
    }
}

/// Message for a non-success response: the body when present, else the
/// status reason.
pub fn status_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}
