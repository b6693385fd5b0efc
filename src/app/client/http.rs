//! Core HTTP operations with bounded concurrency, rate limiting and retries
//!
//! Every request passes through a process-wide counting permit and a rate
//! limiter before it is sent. The permit is held for the request and its
//! body, and released while backing off so sleeping callers never block
//! others.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Jitter, Quota, RateLimiter, clock::DefaultClock, state::InMemoryState};
use reqwest::header::{HeaderMap, RANGE, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};
use url::Url;

use crate::app::client::config::TransportConfig;
use crate::errors::{AppError, ConfigError, TransferError, TransferResult};

type DirectLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// Result of an existence probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// HEAD or ranged GET succeeded
    Available,
    /// The server confirmed the resource does not exist
    Absent,
    /// No reliable answer (errors, unexpected statuses)
    Unknown,
}

/// What went wrong with one attempt, and how the retry loop should react
#[derive(Debug)]
pub(crate) enum AttemptFailure {
    /// 429: wait this long before the next attempt
    RateLimited(Duration),
    /// Any other failure
    Failed(TransferError),
}

impl From<TransferError> for AttemptFailure {
    fn from(error: TransferError) -> Self {
        AttemptFailure::Failed(error)
    }
}

/// HTTP operations handler with resilience patterns
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: DirectLimiter,
    permits: Arc<Semaphore>,
    config: TransportConfig,
}

impl HttpHandler {
    /// Creates a new HttpHandler, validating the transport configuration first
    pub fn new(config: TransportConfig) -> Result<Self, AppError> {
        config.validate()?;
        let client = config.build_http_client()?;
        let rate_limiter = Self::build_rate_limiter(config.rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
            config,
        })
    }

    fn build_rate_limiter(rate_limit_rps: u32) -> Result<DirectLimiter, ConfigError> {
        let rps = NonZeroU32::new(rate_limit_rps).ok_or_else(|| {
            ConfigError::invalid("transport.rate_limit_rps", 0, "Rate limit must be non-zero")
        })?;
        Ok(RateLimiter::direct(Quota::per_second(rps)))
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Permits currently free, mostly useful to assert the bound in tests
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a permit and the rate limiter, then sends the request
    ///
    /// The returned permit must be held until the response body is consumed.
    pub async fn send(
        &self,
        url: &Url,
        request: RequestBuilder,
    ) -> TransferResult<(Response, OwnedSemaphorePermit)> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransferError::transient(url.as_str(), "transport closed"))?;

        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        let response = request
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(url, e))?;
        Ok((response, permit))
    }

    pub(crate) fn map_reqwest_error(&self, url: &Url, error: reqwest::Error) -> TransferError {
        if error.is_timeout() {
            TransferError::Timeout {
                url: url.to_string(),
                seconds: self.config.request_timeout.as_secs(),
            }
        } else {
            TransferError::transient(url.as_str(), error.to_string())
        }
    }

    /// Map a non-success status to an attempt failure
    pub(crate) fn status_failure(&self, url: &Url, response: &Response) -> AttemptFailure {
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                AttemptFailure::Failed(TransferError::PermanentMiss {
                    url: url.to_string(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                AttemptFailure::RateLimited(self.retry_after(response.headers()))
            }
            status => AttemptFailure::Failed(TransferError::transient(
                url.as_str(),
                format!("HTTP {}", status.as_u16()),
            )),
        }
    }

    /// Delay requested by a 429 response, bounded by configuration
    pub(crate) fn retry_after(&self, headers: &HeaderMap) -> Duration {
        headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(self.config.default_retry_after)
            .min(self.config.max_retry_after)
    }

    /// Decide how a failed attempt affects the retry loop
    ///
    /// A 429 sleeps for its Retry-After and other retryable failures back off,
    /// both only when another attempt remains. Non-retryable errors are
    /// returned as `Err` and end the loop. `Ok` carries the failure text.
    pub(crate) async fn pause_before_retry(
        &self,
        url: &Url,
        failure: AttemptFailure,
        attempt: u32,
        attempts: u32,
        backoff_cap: Duration,
    ) -> TransferResult<String> {
        let remaining = attempt + 1 < attempts;
        match failure {
            AttemptFailure::RateLimited(wait) => {
                if remaining {
                    warn!(
                        "Rate limited by server (429) on {}. Waiting {}ms",
                        url,
                        wait.as_millis()
                    );
                    tokio::time::sleep(wait).await;
                }
                Ok("HTTP 429".to_string())
            }
            AttemptFailure::Failed(error) if !error.is_retryable() => Err(error),
            AttemptFailure::Failed(error) => {
                if remaining {
                    let delay = self.config.backoff(attempt, backoff_cap);
                    debug!(
                        "Attempt {}/{} for {} failed: {}. Retrying in {}ms",
                        attempt + 1,
                        attempts,
                        url,
                        error,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(error.to_string())
            }
        }
    }

    /// Shared retry loop for operations whose attempts hold no state
    pub(crate) async fn with_retries<T, F, Fut>(
        &self,
        url: &Url,
        attempts: u32,
        backoff_cap: Duration,
        mut attempt_fn: F,
    ) -> TransferResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AttemptFailure>>,
    {
        let attempts = attempts.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 0..attempts {
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(failure) => {
                    last_error = self
                        .pause_before_retry(url, failure, attempt, attempts, backoff_cap)
                        .await?;
                }
            }
        }

        Err(TransferError::RetriesExhausted {
            url: url.to_string(),
            attempts,
            last_error,
        })
    }

    /// GET with JSON decoding
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        params: &[(&str, &str)],
        retries: u32,
    ) -> TransferResult<T> {
        let cap = self.config.backoff_cap;
        self.with_retries(url, retries, cap, move || async move {
            let request = self.client.get(url.clone()).query(params);
            let (response, _permit) = self.send(url, request).await?;
            if !response.status().is_success() {
                return Err(self.status_failure(url, &response));
            }
            let body = response
                .bytes()
                .await
                .map_err(|e| self.map_reqwest_error(url, e))?;
            serde_json::from_slice(&body).map_err(|e| {
                AttemptFailure::Failed(TransferError::Decode {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            })
        })
        .await
    }

    /// HEAD, then a 1-byte ranged GET, with a short retry budget
    pub async fn probe_status(&self, url: &Url) -> ProbeOutcome {
        let attempts = self.config.probe_retries.max(1);
        let mut absent = false;

        for attempt in 0..attempts {
            match self.send(url, self.client.head(url.clone())).await {
                Ok((response, _permit)) if response.status() == StatusCode::OK => {
                    return ProbeOutcome::Available;
                }
                Ok(_) | Err(_) => {}
            }

            let ranged = self.client.get(url.clone()).header(RANGE, "bytes=0-0");
            match self.send(url, ranged).await {
                Ok((response, _permit)) => match response.status() {
                    StatusCode::OK | StatusCode::PARTIAL_CONTENT => {
                        return ProbeOutcome::Available;
                    }
                    StatusCode::NOT_FOUND | StatusCode::GONE => absent = true,
                    status => {
                        debug!("Probe of {} answered HTTP {}", url, status.as_u16());
                    }
                },
                Err(e) => {
                    debug!("Probe of {} failed: {}", url, e);
                }
            }

            if absent {
                break;
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(self.config.backoff(attempt, self.config.probe_backoff_cap))
                    .await;
            }
        }

        if absent {
            ProbeOutcome::Absent
        } else {
            ProbeOutcome::Unknown
        }
    }

    /// Full GET into memory
    ///
    /// 404 short-circuits as a permanent miss; other failures retry.
    pub async fn download(&self, url: &Url, retries: u32) -> TransferResult<Vec<u8>> {
        let cap = self.config.backoff_cap;
        self.with_retries(url, retries, cap, move || async move {
            let (response, _permit) = self.send(url, self.client.get(url.clone())).await?;
            if !response.status().is_success() {
                return Err(self.status_failure(url, &response));
            }
            let expected = response.content_length();
            let body = response
                .bytes()
                .await
                .map_err(|e| self.map_reqwest_error(url, e))?;
            if let Some(expected) = expected {
                if (body.len() as u64) < expected {
                    return Err(AttemptFailure::Failed(TransferError::integrity(
                        url.as_str(),
                        format!("received {} of {} bytes", body.len(), expected),
                    )));
                }
            }
            debug!("Downloaded {} bytes from {}", body.len(), url);
            Ok(body.to_vec())
        })
        .await
    }

    /// Content-Length from a HEAD request, if the server provides one
    pub async fn head_content_length(&self, url: &Url) -> Option<u64> {
        let (response, _permit) = self.send(url, self.client.head(url.clone())).await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|len| *len > 0)
    }
}
