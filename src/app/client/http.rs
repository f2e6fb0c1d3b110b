//! Core HTTP operations with rate limiting and retry logic
//!
//! Every request waits on a shared rate limiter, then retries with exponential
//! backoff when the server answers 429 or 503 or the transport fails. Other
//! non-success statuses are returned immediately.

use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, Jitter, RateLimiter};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::config::ClientConfig;
use crate::errors::{ConfigError, FetchError, FetchResult};

type DirectRateLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// HTTP operations handler with resilience patterns
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: DirectRateLimiter,
    config: ClientConfig,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client and the limits in `config`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the rate limit is zero
    pub fn new(client: Client, config: &ClientConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(config.rate_quota()?),
            config: config.clone(),
        })
    }

    fn timeout_error(&self) -> FetchError {
        FetchError::Timeout {
            seconds: self.config.request_timeout.as_secs(),
        }
    }

    /// Fetches the HTTP response with rate limiting and retry logic
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if the request fails after retries or the server
    /// answers with a non-success status
    pub async fn get_response(&self, url: &Url) -> FetchResult<reqwest::Response> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;

        let mut retries = 0;
        loop {
            match self.client.get(url.as_str()).send().await {
                Ok(response) => {
                    let status = response.status();
                    let transient = status == StatusCode::TOO_MANY_REQUESTS
                        || status == StatusCode::SERVICE_UNAVAILABLE;

                    if transient && retries < self.config.max_retries {
                        retries += 1;
                        let delay = self.config.retry_delay(retries);
                        warn!(
                            "Server answered {} for {}. Backing off for {}ms",
                            status.as_u16(),
                            url,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return match status {
                        StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimitExceeded),
                        StatusCode::SERVICE_UNAVAILABLE => Err(FetchError::ServerOverloaded),
                        s if !s.is_success() => Err(FetchError::Status { status: s.as_u16() }),
                        _ => {
                            debug!("Fetched response: {}", url);
                            Ok(response)
                        }
                    };
                }
                Err(e) if retries < self.config.max_retries => {
                    retries += 1;
                    let delay = self.config.retry_delay(retries);
                    warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {}ms",
                        retries,
                        self.config.max_retries,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_timeout() => return Err(self.timeout_error()),
                Err(e) => {
                    warn!("Request failed after {} retries: {}", self.config.max_retries, e);
                    return Err(if self.config.max_retries == 0 {
                        FetchError::Http(e)
                    } else {
                        FetchError::MaxRetriesExceeded {
                            max_retries: self.config.max_retries,
                        }
                    });
                }
            }
        }
    }

    /// Downloads the full response body
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if the request or the body read fails
    pub async fn get_bytes(&self, url: &Url) -> FetchResult<Vec<u8>> {
        let response = self.get_response(url).await?;
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                self.timeout_error()
            } else {
                FetchError::Http(e)
            }
        })?;
        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    /// Get a reference to the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handler_takes_limits_from_config() {
        let config = ClientConfig {
            rate_limit_rps: 5,
            max_retries: 1,
            ..Default::default()
        };
        let client = config.build_http_client().unwrap();
        let handler = HttpHandler::new(client, &config).unwrap();
        assert_eq!(handler.config, config);
        handler.rate_limiter.until_ready().await;
    }

    #[test]
    fn test_zero_rate_limit_fails() {
        let config = ClientConfig {
            rate_limit_rps: 0,
            ..Default::default()
        };
        let client = config.build_http_client().unwrap();
        assert!(matches!(
            HttpHandler::new(client, &config),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
