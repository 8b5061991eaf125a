//! Configuration loading and representation.

use std::time::Duration;

use tracing::warn;

/// Env var: refresh worker poll tick in milliseconds.
pub const POLL_MS_VAR: &str = "RECEIPTS_CACHE_POLL_MS";
/// Env var: upper bound in milliseconds a write waits for its refresh.
pub const ACK_TIMEOUT_MS_VAR: &str = "RECEIPTS_CACHE_ACK_TIMEOUT_MS";

/// Settings for `InvoiceCacheManager`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Thread name of the refresh worker.
    pub worker_name: String,
    /// How often the refresh worker checks for shutdown while idle.
    pub poll_interval: Duration,
    /// Bound on how long a write waits for live views to refresh.
    /// `None` waits as long as the worker is alive.
    pub ack_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            worker_name: "invoice-cache-refresh".to_string(),
            poll_interval: Duration::from_millis(250),
            ack_timeout: None,
        }
    }
}

impl CacheConfig {
    /// Defaults overridden by `RECEIPTS_CACHE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(poll) = parse_millis(POLL_MS_VAR, lookup(POLL_MS_VAR)) {
            if poll.is_zero() {
                warn!(var = POLL_MS_VAR, "poll interval must be positive; keeping default");
            } else {
                config.poll_interval = poll;
            }
        }

        if let Some(timeout) = parse_millis(ACK_TIMEOUT_MS_VAR, lookup(ACK_TIMEOUT_MS_VAR)) {
            config.ack_timeout = Some(timeout);
        }

        config
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = Some(timeout);
        self
    }
}

fn parse_millis(var: &str, raw: Option<String>) -> Option<Duration> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(err) => {
            warn!(var, value = %raw, error = %err, "ignoring malformed duration");
            None
        }
    }
}
