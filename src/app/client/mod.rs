//! Bounded-concurrency HTTP transport
//!
//! One [`Transport`] instance carries the whole network policy and is shared
//! by every caller (sources and acquisition workers) behind an `Arc`.
//!
//! The module is organized into specialized components:
//! - `config`: timeouts, permits, retry budgets and client building
//! - `http`: permit/rate-limit gate, retry loop, JSON fetch, probe, full download
//! - `download`: resumable ranged downloads with integrity verification

use std::path::Path;

use serde::de::DeserializeOwned;
use url::Url;

use crate::app::models::CacheValidators;
use crate::errors::{AppError, TransferResult};

pub mod config;
pub mod download;
pub mod http;


pub use config::TransportConfig;
pub use download::{ResumableOutcome, partial_path};
pub use http::ProbeOutcome;

use download::DownloadHandler;
use http::HttpHandler;

/// Network client shared by all callers
#[derive(Debug)]
pub struct Transport {
    http_handler: HttpHandler,
}

impl Transport {
    /// Creates a transport with the default policy
    pub fn new() -> Result<Self, AppError> {
        Self::with_config(TransportConfig::default())
    }

    /// Creates a transport with a custom policy
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid policies and a transfer
    /// error if the underlying HTTP client cannot be built.
    pub fn with_config(config: TransportConfig) -> Result<Self, AppError> {
        let http_handler = HttpHandler::new(config)?;
        tracing::debug!(
            "Created transport with {} in-flight permits",
            http_handler.config().max_in_flight
        );
        Ok(Self { http_handler })
    }

    pub fn config(&self) -> &TransportConfig {
        self.http_handler.config()
    }

    /// Free in-flight permits right now
    pub fn available_permits(&self) -> usize {
        self.http_handler.available_permits()
    }

    /// GET `url` with query `params` and decode the JSON body
    ///
    /// 429 honours Retry-After; other failures back off up to the cap.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        params: &[(&str, &str)],
        retries: u32,
    ) -> TransferResult<T> {
        self.http_handler.fetch_json(url, params, retries).await
    }

    /// Three-way probe result distinguishing confirmed absence from no answer
    pub async fn probe_status(&self, url: &Url) -> ProbeOutcome {
        self.http_handler.probe_status(url).await
    }

    /// Full GET into memory; 404 is a permanent miss and is never retried
    pub async fn download(&self, url: &Url, retries: u32) -> TransferResult<Vec<u8>> {
        self.http_handler.download(url, retries).await
    }

    /// Ranged, resumable download of `url` to `dest`
    pub async fn download_resumable(
        &self,
        url: &Url,
        validators: &CacheValidators,
        dest: &Path,
        max_tries: u32,
    ) -> TransferResult<ResumableOutcome> {
        DownloadHandler::new(&self.http_handler)
            .download_resumable(url, validators, dest, max_tries)
            .await
    }
}
