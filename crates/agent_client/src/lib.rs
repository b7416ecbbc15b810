//! HTTP client for the agent server.
//!
//! [`AgentClient`] wraps the four endpoints. `/run-stream` responses are
//! decoded incrementally by [`SseFrameParser`] into typed
//! [`agent_protocol::StreamEvent`]s; the client keeps no conversation state.

pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::{decode_event_stream, AgentClient, EventStream};
pub use config::{AgentClientConfig, DEFAULT_REQUEST_TIMEOUT};
pub use error::AgentClientError;
pub use sse::SseFrameParser;
pub use url::{normalize_base_url, DEFAULT_SERVER_URL};
