//! Archive sources
//!
//! The fetcher pulls tile archives through the [`ArchiveSource`] trait. The
//! production source is [`TnrisClient`], an HTTP client with rate limiting and
//! retries; [`MemorySource`] serves canned responses for tests and offline runs.
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: Core HTTP operations with resilience patterns
//! - `memory`: In-memory source

use futures::future::BoxFuture;
use url::Url;

use crate::errors::{FetchResult, Result};

pub mod config;
pub mod http;
pub mod memory;

pub use config::ClientConfig;
pub use memory::MemorySource;

use http::HttpHandler;

/// Something that can return the bytes of a tile archive
pub trait ArchiveSource: Send + Sync {
    /// Retrieve the archive at `url`
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, FetchResult<Vec<u8>>>;
}

/// HTTP client for the TNRIS data bucket
///
/// Handles rate limiting and retry logic. The bucket is public, so no
/// authentication is involved.
#[derive(Debug)]
pub struct TnrisClient {
    http_handler: HttpHandler,
    config: ClientConfig,
}

impl TnrisClient {
    /// Creates a client with default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a client with custom configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the rate limit is zero
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let client = config.build_http_client()?;
        let http_handler = HttpHandler::new(client, &config)?;

        tracing::debug!(
            "Created archive client: {} req/s, {} retries, {}s timeout",
            config.rate_limit_rps,
            config.max_retries,
            config.request_timeout.as_secs()
        );

        Ok(Self {
            http_handler,
            config,
        })
    }

    /// Download an archive into memory
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if the request fails after retries
    pub async fn download_archive(&self, url: &Url) -> FetchResult<Vec<u8>> {
        self.http_handler.get_bytes(url).await
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl ArchiveSource for TnrisClient {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, FetchResult<Vec<u8>>> {
        Box::pin(self.download_archive(url))
    }
}
