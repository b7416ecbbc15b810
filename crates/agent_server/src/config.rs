use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chunk_codec::ChunkPolicy;
use serde::Deserialize;
use thiserror::Error;

use crate::multiplexer::DEFAULT_MAX_TOOL_PHASES;
use crate::providers::{DEFAULT_PROVIDER_ID, PROVIDER_ENV_VAR};

pub const SERVER_ADDR_ENV_VAR: &str = "GLOD_SERVER_ADDR";
pub const SYSTEM_INSTRUCTIONS_ENV_VAR: &str = "GLOD_SYSTEM_INSTRUCTIONS";
pub const ALLOWED_DIRS_ENV_VAR: &str = "GLOD_ALLOWED_DIRS";
pub const CONFIG_PATH_ENV_VAR: &str = "GLOD_SERVER_CONFIG_PATH";

pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str =
    "You are a careful coding agent working on the user's files. Use the available tools to inspect and edit files inside the allowed directories, keep edits small, and say plainly when a request cannot be satisfied.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address {value:?}: {source}")]
    InvalidAddr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Optional JSON config file. Environment variables win over its values.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerConfigFile {
    addr: Option<String>,
    allowed_dirs: Option<Vec<PathBuf>>,
    max_tool_phases: Option<usize>,
    soft_threshold: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub provider_id: String,
    pub instructions: String,
    pub allowed_dirs: Vec<PathBuf>,
    pub max_tool_phases: usize,
    pub policy: ChunkPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            provider_id: DEFAULT_PROVIDER_ID.to_string(),
            instructions: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
            allowed_dirs: Vec::new(),
            max_tool_phases: DEFAULT_MAX_TOOL_PHASES,
            policy: ChunkPolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from `lookup`, which stands in for the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let file = match lookup(CONFIG_PATH_ENV_VAR) {
            Some(path) => load_config_file(Path::new(&path))?,
            None => ServerConfigFile::default(),
        };

        let mut config = Self::default();

        if let Some(addr) = lookup(SERVER_ADDR_ENV_VAR).or(file.addr) {
            config.addr = parse_addr(&addr)?;
        }
        if let Some(provider_id) = lookup(PROVIDER_ENV_VAR) {
            config.provider_id = provider_id;
        }
        if let Some(instructions) = lookup(SYSTEM_INSTRUCTIONS_ENV_VAR) {
            config.instructions = instructions;
        }

        config.allowed_dirs = file.allowed_dirs.unwrap_or_default();
        if let Some(dirs) = lookup(ALLOWED_DIRS_ENV_VAR) {
            config.allowed_dirs.extend(
                std::env::split_paths(&dirs).filter(|dir| !dir.as_os_str().is_empty()),
            );
        }

        if let Some(max_tool_phases) = file.max_tool_phases {
            if max_tool_phases == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "max_tool_phases",
                    reason: "must be at least 1".to_string(),
                });
            }
            config.max_tool_phases = max_tool_phases;
        }
        if let Some(soft_threshold) = file.soft_threshold {
            if soft_threshold == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "soft_threshold",
                    reason: "must be at least 1".to_string(),
                });
            }
            config.policy = config.policy.with_soft_threshold(soft_threshold);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    #[must_use]
    pub fn with_allowed_dirs(mut self, allowed_dirs: Vec<PathBuf>) -> Self {
        self.allowed_dirs = allowed_dirs;
        self
    }

    #[must_use]
    pub fn with_max_tool_phases(mut self, max_tool_phases: usize) -> Self {
        self.max_tool_phases = max_tool_phases;
        self
    }
}

fn parse_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|source| ConfigError::InvalidAddr {
        value: value.to_string(),
        source,
    })
}

fn load_config_file(path: &Path) -> Result<ServerConfigFile, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::ParseFile {
        path: path.to_path_buf(),
        source,
    })
}
