//! Shared data model and wire contract between the agent server and its clients.
//!
//! - [`Turn`] is one entry of client-owned conversation history.
//! - [`StreamEvent`] is the typed unit of the live event channel; [`WireFrame`]
//!   is its `{type, content}` JSON form carried in each SSE `data:` line.
//! - [`api`] holds the request/response bodies of the HTTP endpoints.
//!
//! Exactly one terminal event ([`StreamEvent::Complete`] or
//! [`StreamEvent::Error`]) ends every agent turn.

pub mod api;
mod event;
mod turn;

pub use event::{FrameError, FrameType, StreamEvent, WireFrame};
pub use turn::{History, ToolCallRecord, ToolResultRecord, Turn};
