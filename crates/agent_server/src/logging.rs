use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global fmt subscriber once. `RUST_LOG` overrides the `info` default.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .try_init();
    });
}
