//! Stateless agent server.
//!
//! Each request carries the prompt and the client's encoded history. The
//! server runs one agent turn against a [`agent_provider::RunProvider`],
//! executes the tool calls it asks for, and streams the turn back as
//! server-sent events. Nothing about a session outlives its request except
//! the shared [`AllowList`].
//!
//! Configuration comes from the environment:
//!
//! - `GLOD_SERVER_ADDR`: listen address, default `127.0.0.1:8000`;
//! - `GLOD_PROVIDER`: provider id, default `mock`;
//! - `GLOD_SYSTEM_INSTRUCTIONS`: overrides the built-in instructions;
//! - `GLOD_ALLOWED_DIRS`: directories to allow at startup, path-list separated;
//! - `GLOD_SERVER_CONFIG_PATH`: optional JSON file with `addr`,
//!   `allowed_dirs`, `max_tool_phases` and `soft_threshold`.

pub mod allowlist;
pub mod config;
pub mod dispatch;
pub mod executor;
pub mod http;
pub mod logging;
pub mod multiplexer;
pub mod providers;
pub mod subagent;
pub mod tools;

pub use allowlist::{AllowList, AllowListError};
pub use config::{ConfigError, ServerConfig};
pub use dispatch::{BuiltinDispatcher, ToolDispatchError, ToolDispatcher};
pub use executor::{BuiltinToolExecutor, ToolOutput};
pub use http::{router, serve, serve_listener, AppState, ServerError};
pub use multiplexer::{EventMultiplexer, TurnError, TurnOutcome, DEFAULT_MAX_TOOL_PHASES};
pub use subagent::SubagentSpawner;
pub use tools::{BuiltinTool, GrepFlags, ToolCall, ToolRegistry};
