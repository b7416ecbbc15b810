//! Client side of the glod coding agent.
//!
//! [`SessionController`] is the only owner of conversation history. It sends
//! `{prompt, history}` to a stateless agent server, exposes the reply as a
//! lazy [`TurnStream`] of typed events, and replaces its history with the
//! server's copy when a turn completes.
//!
//! Environment:
//! - `GLOD_SERVER_URL`: agent server base URL (default `http://127.0.0.1:8000`).
//! - `GLOD_REQUEST_TIMEOUT_SEC`: per-request timeout in seconds (default 300).
//! - `GLOD_SERVER_BIN`: server binary to launch when none is reachable.

pub mod commands;
pub mod config;
pub mod launcher;
pub mod logging;
pub mod render;
pub mod session;

pub use commands::{parse_slash_command, SlashCommand};
pub use config::{ClientSettings, ConfigError};
pub use launcher::{ProcessLauncher, ServerLauncher};
pub use render::TurnRenderer;
pub use session::{
    SessionController, SessionError, ToolActivity, TurnOutcome, TurnStream, TurnTransport,
};
