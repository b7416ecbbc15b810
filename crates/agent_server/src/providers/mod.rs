use std::sync::Arc;
use std::time::Duration;

use agent_provider::{ProviderInitError, RunProvider};
use agent_provider_mock::{MockProvider, MOCK_PROVIDER_ID};

pub const DEFAULT_PROVIDER_ID: &str = MOCK_PROVIDER_ID;
pub const PROVIDER_ENV_VAR: &str = "GLOD_PROVIDER";

const MOCK_TOKEN_DELAY: Duration = Duration::from_millis(15);

/// Builds the provider selected by `GLOD_PROVIDER` (see [`crate::config`]).
pub fn provider_for_id(provider_id: &str) -> Result<Arc<dyn RunProvider>, ProviderInitError> {
    match provider_id {
        MOCK_PROVIDER_ID => Ok(Arc::new(
            MockProvider::default().with_token_delay(MOCK_TOKEN_DELAY),
        )),
        unknown => Err(ProviderInitError::new(format!(
            "Unsupported provider '{unknown}'. Available providers: {MOCK_PROVIDER_ID}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_for_id_supports_mock() {
        let provider = provider_for_id("mock").expect("mock provider should resolve");
        assert_eq!(provider.profile().provider_id, "mock");
    }

    #[test]
    fn provider_for_id_rejects_unknown_provider() {
        let error = match provider_for_id("custom") {
            Ok(_) => panic!("unknown providers should fail"),
            Err(error) => error,
        };

        assert!(error.message().contains("Unsupported provider 'custom'"));
    }
}
