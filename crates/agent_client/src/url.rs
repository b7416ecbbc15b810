/// Default agent server address when nothing else is configured.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

/// Normalize a configured server address into a base URL.
///
/// Blank input falls back to [`DEFAULT_SERVER_URL`]. A bare `host:port`
/// gains an `http://` scheme and trailing slashes are dropped.
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_SERVER_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// Join a normalized base URL with an endpoint path such as `/run-stream`.
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
