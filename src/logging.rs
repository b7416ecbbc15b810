use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global stderr subscriber once so diagnostics never interleave
/// with streamed answer text on stdout. `RUST_LOG` overrides the `warn` default.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_level(true)
            .try_init();
    });
}
