//! Client settings from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use agent_client::{AgentClientConfig, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SERVER_URL};
use thiserror::Error;

pub const SERVER_URL_ENV_VAR: &str = "GLOD_SERVER_URL";
pub const REQUEST_TIMEOUT_ENV_VAR: &str = "GLOD_REQUEST_TIMEOUT_SEC";
pub const SERVER_BIN_ENV_VAR: &str = "GLOD_SERVER_BIN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub request_timeout: Duration,
    /// Agent server binary to start when nothing answers at `server_url`.
    pub server_bin: Option<PathBuf>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            server_bin: None,
        }
    }
}

impl ClientSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut settings = Self::default();

        if let Some(url) = value(SERVER_URL_ENV_VAR) {
            settings.server_url = url;
        }
        if let Some(raw) = value(REQUEST_TIMEOUT_ENV_VAR) {
            let seconds: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: REQUEST_TIMEOUT_ENV_VAR,
                reason: format!("expected whole seconds, got {raw:?}"),
            })?;
            if seconds == 0 {
                return Err(ConfigError::InvalidValue {
                    name: REQUEST_TIMEOUT_ENV_VAR,
                    reason: "must be greater than zero".to_string(),
                });
            }
            settings.request_timeout = Duration::from_secs(seconds);
        }
        settings.server_bin = value(SERVER_BIN_ENV_VAR).map(PathBuf::from);

        Ok(settings)
    }

    pub fn client_config(&self) -> AgentClientConfig {
        AgentClientConfig::new(self.server_url.clone()).with_timeout(self.request_timeout)
    }

    /// `host:port` the launched server should listen on, taken from the URL.
    pub fn listen_addr(&self) -> Option<String> {
        let without_scheme = self
            .server_url
            .split_once("://")
            .map_or(self.server_url.as_str(), |(_, rest)| rest);
        let authority = without_scheme.split('/').next().unwrap_or_default();
        (!authority.is_empty()).then(|| authority.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Result<ClientSettings, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ClientSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = settings(&[]).expect("settings");
        assert_eq!(settings, ClientSettings::default());
        assert_eq!(settings.request_timeout, Duration::from_secs(300));
        assert_eq!(settings.listen_addr().as_deref(), Some("127.0.0.1:8000"));
    }

    #[test]
    fn environment_overrides_are_trimmed() {
        let settings = settings(&[
            (SERVER_URL_ENV_VAR, " http://localhost:9100/ "),
            (REQUEST_TIMEOUT_ENV_VAR, "45"),
            (SERVER_BIN_ENV_VAR, "/usr/local/bin/agent_server"),
        ])
        .expect("settings");

        assert_eq!(settings.server_url, "http://localhost:9100/");
        assert_eq!(settings.request_timeout, Duration::from_secs(45));
        assert_eq!(
            settings.server_bin,
            Some(PathBuf::from("/usr/local/bin/agent_server"))
        );
        assert_eq!(settings.listen_addr().as_deref(), Some("localhost:9100"));
    }

    #[test]
    fn invalid_timeouts_are_rejected() {
        assert!(settings(&[(REQUEST_TIMEOUT_ENV_VAR, "soon")]).is_err());
        assert!(settings(&[(REQUEST_TIMEOUT_ENV_VAR, "0")]).is_err());
    }
}
