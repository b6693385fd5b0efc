//! Transport configuration and HTTP client construction
//!
//! One [`TransportConfig`] describes the whole network policy: timeouts, the
//! process-wide in-flight permit count, rate limiting and the retry/backoff
//! budgets of every transport operation.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::constants::{http, limits};
use crate::errors::{ConfigError, ConfigResult, TransferResult};

/// Network policy shared by every transport caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Overall timeout for one request, body included
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Maximum idle connections per host
    pub pool_max_per_host: usize,
    /// Maximum concurrent in-flight requests across the process
    pub max_in_flight: usize,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
    /// Attempts for `fetch_json`
    pub json_retries: u32,
    /// Attempts for `probe`
    pub probe_retries: u32,
    /// Attempts for `download`
    pub download_retries: u32,
    /// Attempts for `download_resumable`
    pub resumable_max_tries: u32,
    /// Backoff grows by this step per attempt
    #[serde(with = "humantime_serde")]
    pub backoff_step: Duration,
    /// Backoff ceiling for JSON fetches and downloads
    #[serde(with = "humantime_serde")]
    pub backoff_cap: Duration,
    /// Backoff ceiling for probes
    #[serde(with = "humantime_serde")]
    pub probe_backoff_cap: Duration,
    /// Sleep on 429 when the server sends no Retry-After
    #[serde(with = "humantime_serde")]
    pub default_retry_after: Duration,
    /// Upper bound applied to server-provided Retry-After values
    #[serde(with = "humantime_serde")]
    pub max_retry_after: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            max_in_flight: limits::DEFAULT_MAX_IN_FLIGHT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            json_retries: limits::JSON_RETRIES,
            probe_retries: limits::PROBE_RETRIES,
            download_retries: limits::DOWNLOAD_RETRIES,
            resumable_max_tries: limits::RESUMABLE_MAX_TRIES,
            backoff_step: limits::BACKOFF_STEP,
            backoff_cap: limits::BACKOFF_CAP,
            probe_backoff_cap: limits::PROBE_BACKOFF_CAP,
            default_retry_after: limits::DEFAULT_RETRY_AFTER,
            max_retry_after: limits::MAX_RETRY_AFTER,
        }
    }
}

impl TransportConfig {
    /// Configuration with near-zero delays, for tests against local servers
    pub fn fast() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            rate_limit_rps: 1000,
            backoff_step: Duration::from_millis(5),
            backoff_cap: Duration::from_millis(20),
            probe_backoff_cap: Duration::from_millis(20),
            default_retry_after: Duration::from_millis(10),
            max_retry_after: Duration::from_millis(50),
            ..Default::default()
        }
    }

    pub fn with_max_in_flight(mut self, permits: usize) -> Self {
        self.max_in_flight = permits;
        self
    }

    /// Backoff before attempt `attempt + 1`: `min(step * (attempt + 1), cap)`
    pub fn backoff(&self, attempt: u32, cap: Duration) -> Duration {
        self.backoff_step.saturating_mul(attempt + 1).min(cap)
    }

    /// Builds the HTTP client with the specified configuration
    pub fn build_http_client(&self) -> TransferResult<Client> {
        let client = Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(http::USER_AGENT)
            .tcp_nodelay(true)
            .pool_idle_timeout(http::POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(self.pool_max_per_host)
            .redirect(reqwest::redirect::Policy::limited(http::MAX_REDIRECTS))
            .build()?;
        Ok(client)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_in_flight == 0 {
            return Err(ConfigError::invalid(
                "transport.max_in_flight",
                self.max_in_flight,
                "At least one in-flight request must be allowed",
            ));
        }
        if self.rate_limit_rps == 0 {
            return Err(ConfigError::invalid(
                "transport.rate_limit_rps",
                self.rate_limit_rps,
                "Rate limit must be non-zero",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "transport.request_timeout",
                "0s",
                "Request timeout cannot be zero",
            ));
        }
        for (field, value) in [
            ("transport.json_retries", self.json_retries),
            ("transport.probe_retries", self.probe_retries),
            ("transport.download_retries", self.download_retries),
            ("transport.resumable_max_tries", self.resumable_max_tries),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, value, "At least one attempt is required"));
            }
        }
        Ok(())
    }
}
