//! Configuration for exchange channels.

use std::time::Duration;

use switchyard_core::{Parameters, Url};

/// Url parameter: default request timeout in milliseconds.
pub const TIMEOUT_KEY: &str = "timeout";

/// Url parameter: graceful close timeout in milliseconds.
pub const CLOSE_TIMEOUT_KEY: &str = "close.timeout";

/// Url parameter: capacity of per-connection inbound queues.
pub const INBOUND_CAPACITY_KEY: &str = "inbound.capacity";

/// Configuration for channels created by an exchanger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Timeout used by [`crate::ExchangeChannel::request_default`].
    pub default_timeout: Duration,

    /// Upper bound on how long a graceful close waits for pending requests.
    pub close_timeout: Duration,

    /// Maximum number of undelivered messages buffered per direction.
    ///
    /// A response that finds the peer's queue full is dropped and reported
    /// to the replier's [`ExchangeHandler::caught`](crate::ExchangeHandler::caught);
    /// the requester sees [`Status::Timeout`](crate::Status::Timeout), not an error.
    pub inbound_capacity: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(1000),
            close_timeout: Duration::from_secs(10),
            inbound_capacity: 1024,
        }
    }
}

impl ExchangeConfig {
    /// Read overrides from url parameters, keeping defaults for absent or
    /// malformed values.
    pub fn from_url(url: &Url) -> Self {
        let defaults = Self::default();
        Self {
            default_timeout: millis_parameter(url, TIMEOUT_KEY).unwrap_or(defaults.default_timeout),
            close_timeout: millis_parameter(url, CLOSE_TIMEOUT_KEY)
                .unwrap_or(defaults.close_timeout),
            inbound_capacity: usize_parameter(url, INBOUND_CAPACITY_KEY)
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.inbound_capacity),
        }
    }

    /// Set the default request timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the graceful close timeout.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set the inbound queue capacity.
    pub fn with_inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity;
        self
    }
}

fn millis_parameter(url: &Url, key: &str) -> Option<Duration> {
    usize_parameter(url, key).map(|ms| Duration::from_millis(ms as u64))
}

fn usize_parameter(url: &Url, key: &str) -> Option<usize> {
    let raw = url.parameter(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = raw, "ignoring malformed url parameter");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExchangeConfig::default();
        assert_eq!(config.default_timeout, Duration::from_secs(1));
        assert_eq!(config.close_timeout, Duration::from_secs(10));
        assert_eq!(config.inbound_capacity, 1024);
    }

    #[test]
    fn test_from_url_overrides() {
        let url = Url::new("memory", "a", 1)
            .with_parameter(TIMEOUT_KEY, "250")
            .with_parameter(CLOSE_TIMEOUT_KEY, "3000")
            .with_parameter(INBOUND_CAPACITY_KEY, "16");
        let config = ExchangeConfig::from_url(&url);
        assert_eq!(config.default_timeout, Duration::from_millis(250));
        assert_eq!(config.close_timeout, Duration::from_secs(3));
        assert_eq!(config.inbound_capacity, 16);
    }

    #[test]
    fn test_from_url_malformed_falls_back() {
        let url = Url::new("memory", "a", 1)
            .with_parameter(TIMEOUT_KEY, "soon")
            .with_parameter(INBOUND_CAPACITY_KEY, "0");
        assert_eq!(ExchangeConfig::from_url(&url), ExchangeConfig::default());
    }
}
