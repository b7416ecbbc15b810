use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

/// Maximum retry attempts after an initial request attempt.
pub const MAX_RETRIES: u32 = 3;
/// Base delay before the first retry.
pub const BASE_DELAY_MS: u64 = 250;

fn unopened_connection_regex() -> Option<&'static Regex> {
    static CACHED: OnceLock<Option<Regex>> = OnceLock::new();
    CACHED
        .get_or_init(|| {
            Regex::new(
                r"(?i)connection.?refused|dns error|failed to lookup address|no route to host|network is unreachable",
            )
            .ok()
        })
        .as_ref()
}

/// Statuses where the server, or a gateway in front of it, asked for a retry.
///
/// Any other status may come from a turn that already ran tools, whatever its
/// body says, so it is never resent.
pub fn is_retryable_http_error(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}

/// True when a transport failure's text shows no connection was ever opened,
/// so the request cannot have reached the server.
pub fn is_retryable_transport_error(error_text: &str) -> bool {
    unopened_connection_regex().is_some_and(|regex| regex.is_match(error_text))
}

/// Exponential backoff delay for a retry attempt, starting at `base`.
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.min(16);
    base.saturating_mul(2u32.saturating_pow(exponent))
}
