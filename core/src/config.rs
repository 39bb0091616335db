//! Client configuration read from the environment.

use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:3001";
pub const DEFAULT_DEDUPE_INTERVAL: Duration = Duration::from_millis(2000);

/// Settings shared by the API client and the query cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Origin of the clinic API, without the `/api` prefix.
    pub api_url: String,
    /// Bearer token for authenticated calls.
    pub token: Option<String>,
    /// A cached value younger than this is served without refetching when a
    /// new subscriber arrives.
    pub dedupe_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            dedupe_interval: DEFAULT_DEDUPE_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Read `CLINIC_API_URL`, `CLINIC_API_TOKEN` and `CLINIC_DEDUPE_MS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, with the variables supplied by `lookup`. Empty and
    /// unparseable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let dedupe_interval = match non_empty("CLINIC_DEDUPE_MS").map(|v| v.trim().parse::<u64>()) {
            Some(Ok(ms)) => Duration::from_millis(ms),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "ignoring invalid CLINIC_DEDUPE_MS");
                defaults.dedupe_interval
            }
            None => defaults.dedupe_interval,
        };

        Self {
            api_url: non_empty("CLINIC_API_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_url),
            token: non_empty("CLINIC_API_TOKEN"),
            dedupe_interval,
        }
    }
}
