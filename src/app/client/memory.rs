//! In-memory archive source

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use url::Url;

use super::ArchiveSource;
use crate::errors::{FetchError, FetchResult};

#[derive(Debug, Clone)]
enum Response {
    Body(Vec<u8>),
    Status(u16),
}

/// Archive source that serves registered bodies and records every request
///
/// Unregistered URLs answer 404. An optional delay is applied to every request,
/// which lets callers observe how many requests are in flight at once.
#[derive(Debug, Default)]
pub struct MemorySource {
    responses: HashMap<String, Response>,
    delay: Option<Duration>,
    attempts: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemorySource {
    /// Create a source with no registered archives
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`
    pub fn with_archive(mut self, url: &Url, body: Vec<u8>) -> Self {
        self.responses.insert(url.to_string(), Response::Body(body));
        self
    }

    /// Answer `url` with an HTTP error status
    pub fn with_status(mut self, url: &Url, status: u16) -> Self {
        self.responses.insert(url.to_string(), Response::Status(status));
        self
    }

    /// Delay every response
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of requests made for `url`
    pub fn attempts(&self, url: &Url) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(url.as_str())
            .copied()
            .unwrap_or(0)
    }

    /// Number of requests made for any URL
    pub fn total_attempts(&self) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .sum()
    }

    /// Largest number of requests that were in flight at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn respond(&self, url: &Url) -> FetchResult<Vec<u8>> {
        *self
            .attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(url.to_string())
            .or_insert(0) += 1;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = match self.responses.get(url.as_str()) {
            Some(Response::Body(body)) => Ok(body.clone()),
            Some(Response::Status(status)) => Err(FetchError::Status { status: *status }),
            None => Err(FetchError::Status { status: 404 }),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl ArchiveSource for MemorySource {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, FetchResult<Vec<u8>>> {
        Box::pin(self.respond(url))
    }
}
