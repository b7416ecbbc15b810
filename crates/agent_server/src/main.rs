use std::process::ExitCode;

use agent_server::logging::init_logging;
use agent_server::providers::provider_for_id;
use agent_server::{serve, AllowList, AppState, ServerConfig};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid server configuration");
            return ExitCode::from(2);
        }
    };

    let provider = match provider_for_id(&config.provider_id) {
        Ok(provider) => provider,
        Err(error) => {
            error!(%error, "failed to initialize provider");
            return ExitCode::from(2);
        }
    };

    let allowlist = AllowList::new();
    for dir in &config.allowed_dirs {
        match allowlist.allow(dir) {
            Ok(path) => info!(path = %path.display(), "directory allowed"),
            Err(error) => warn!(%error, "skipping configured directory"),
        }
    }

    let profile = provider.profile();
    info!(
        provider = %profile.provider_id,
        model = %profile.model_id,
        max_tool_phases = config.max_tool_phases,
        "starting agent server"
    );

    let state = AppState::new(provider, allowlist, &config);
    match serve(config.addr, state).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "agent server stopped");
            ExitCode::FAILURE
        }
    }
}
