//! Archive client settings
//!
//! Tile archives are plain public objects in the TNRIS bucket, so the client
//! needs no session state; these settings only shape connection reuse, timeouts
//! and how hard the bucket is hit.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::Quota;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::constants::{http, limits};
use crate::errors::{ConfigError, FetchResult};

/// Settings for the archive HTTP client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// TCP keep-alive interval; `None` leaves the OS default
    pub tcp_keepalive: Option<Duration>,
    /// Disable Nagle's algorithm
    pub tcp_nodelay: bool,
    /// How long an idle pooled connection is kept
    pub pool_idle_timeout: Option<Duration>,
    /// Idle connections kept per host
    pub pool_max_per_host: usize,
    /// Per-request timeout, covering the whole response body
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Requests per second across all workers
    pub rate_limit_rps: u32,
    /// Retries after a transient failure (429, 503, transport error)
    pub max_retries: u32,
    /// First backoff step; doubles on every retry
    pub retry_base_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tcp_keepalive: Some(Duration::from_secs(30)),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            max_retries: limits::MAX_RETRIES,
            retry_base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
        }
    }
}

impl ClientConfig {
    /// Build the reqwest client used for archive downloads
    pub fn build_http_client(&self) -> FetchResult<Client> {
        let builder = Client::builder()
            .user_agent(http::USER_AGENT)
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .tcp_nodelay(self.tcp_nodelay)
            .tcp_keepalive(self.tcp_keepalive)
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_per_host);

        Ok(builder.build()?)
    }

    /// Governor quota for the shared request limiter
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the rate limit is zero
    pub fn rate_quota(&self) -> Result<Quota, ConfigError> {
        let rate = NonZeroU32::new(self.rate_limit_rps).ok_or_else(|| ConfigError::InvalidValue {
            field: "client.rate_limit_rps".to_string(),
            value: self.rate_limit_rps.to_string(),
            reason: "Rate limit must be non-zero".to_string(),
        })?;
        Ok(Quota::per_second(rate))
    }

    /// Backoff delay before retry number `attempt` (1-based)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_constants() {
        let config = ClientConfig::default();
        assert!(config.tcp_nodelay);
        assert_eq!(config.rate_limit_rps, limits::DEFAULT_RATE_LIMIT_RPS);
        assert_eq!(config.max_retries, limits::MAX_RETRIES);
        assert_eq!(config.request_timeout, http::DEFAULT_TIMEOUT);
        assert!(config.build_http_client().is_ok());
    }

    #[test]
    fn test_client_without_keepalive_or_idle_timeout() {
        let config = ClientConfig {
            tcp_keepalive: None,
            pool_idle_timeout: None,
            request_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        assert!(config.build_http_client().is_ok());
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        let config = ClientConfig {
            rate_limit_rps: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.rate_quota(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "client.rate_limit_rps"
        ));
        assert!(ClientConfig::default().rate_quota().is_ok());
    }

    #[test]
    fn test_backoff_doubles() {
        let config = ClientConfig {
            retry_base_delay: Duration::from_millis(500),
            ..Default::default()
        };
        assert_eq!(config.retry_delay(1), Duration::from_millis(1000));
        assert_eq!(config.retry_delay(2), Duration::from_millis(2000));
        assert_eq!(config.retry_delay(3), Duration::from_millis(4000));
    }
}
