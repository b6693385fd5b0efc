//! Resumable, integrity-verified downloads to disk
//!
//! Bytes are streamed into `<dest>.part`. A later attempt (in this call or a
//! later run) continues from the partial file's size with a `Range` request.
//! The partial file is renamed onto `dest` only after its size matches the
//! advertised length and it decodes as a complete image.

use std::path::{Path, PathBuf};

use reqwest::StatusCode;
use reqwest::header::{
    CONTENT_RANGE, ETAG, HeaderMap, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
    RANGE,
};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::app::client::http::{AttemptFailure, HttpHandler};
use crate::app::hash::ContentHash;
use crate::app::models::{CacheValidators, TransferState};
use crate::app::normalizer::verify_complete_image;
use crate::constants::files;
use crate::errors::{TransferError, TransferResult};

/// Outcome of a resumable download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumableOutcome {
    /// The file was written to its destination
    Downloaded {
        content_hash: ContentHash,
        size: u64,
        width: u32,
        height: u32,
        etag: Option<String>,
        last_modified: Option<String>,
    },
    /// The server answered 304 to the replayed validators
    NotModified,
}

/// Path of the partial file for a destination
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(files::PARTIAL_FILE_SUFFIX);
    PathBuf::from(name)
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Parse the total length out of `Content-Range: bytes a-b/total`
fn content_range_total(value: &str) -> Option<u64> {
    value
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse::<u64>().ok())
}

/// Resumable download operations handler
pub struct DownloadHandler<'a> {
    http_handler: &'a HttpHandler,
}

impl<'a> DownloadHandler<'a> {
    /// Creates a new DownloadHandler with the given HTTP handler
    pub fn new(http_handler: &'a HttpHandler) -> Self {
        Self { http_handler }
    }

    /// Download `url` to `dest`, resuming from `<dest>.part` if present
    ///
    /// # Errors
    ///
    /// Returns `TransferError::PermanentMiss` for 404/410 and
    /// `TransferError::RetriesExhausted` once `max_tries` attempts fail. The
    /// partial file is removed in both cases.
    pub async fn download_resumable(
        &self,
        url: &Url,
        validators: &CacheValidators,
        dest: &Path,
        max_tries: u32,
    ) -> TransferResult<ResumableOutcome> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = partial_path(dest);
        let mut state = TransferState {
            expected_total: self.http_handler.head_content_length(url).await,
            ..Default::default()
        };

        let cap = self.http_handler.config().backoff_cap;
        let attempts = max_tries.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 0..attempts {
            state.attempt = attempt + 1;
            match self.attempt(url, validators, dest, &part, &mut state).await {
                Ok(outcome) => return Ok(outcome),
                Err(failure) => {
                    match self
                        .http_handler
                        .pause_before_retry(url, failure, attempt, attempts, cap)
                        .await
                    {
                        Ok(reason) => last_error = reason,
                        Err(fatal) => {
                            let _ = tokio::fs::remove_file(&part).await;
                            return Err(fatal);
                        }
                    }
                }
            }
        }

        let _ = tokio::fs::remove_file(&part).await;
        Err(TransferError::RetriesExhausted {
            url: url.to_string(),
            attempts,
            last_error,
        })
    }

    async fn attempt(
        &self,
        url: &Url,
        validators: &CacheValidators,
        dest: &Path,
        part: &Path,
        state: &mut TransferState,
    ) -> Result<ResumableOutcome, AttemptFailure> {
        state.offset = match tokio::fs::metadata(part).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let client = self.http_handler.client();
        let mut request = client.get(url.clone());
        if let Some(etag) = &validators.etag {
            request = request.header(IF_NONE_MATCH, etag);
        } else if let Some(last_modified) = &validators.last_modified {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }
        if let Some(range) = state.range_header() {
            request = request.header(RANGE, range);
        }

        debug!(
            "Resumable attempt {} for {} from offset {}",
            state.attempt, url, state.offset
        );
        let (mut response, _permit) = self.http_handler.send(url, request).await?;

        let append = match response.status() {
            StatusCode::NOT_MODIFIED => return Ok(ResumableOutcome::NotModified),
            StatusCode::PARTIAL_CONTENT if state.offset > 0 => true,
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => false,
            StatusCode::RANGE_NOT_SATISFIABLE => {
                // Stale or over-long partial file, start over on the next attempt
                let _ = tokio::fs::remove_file(part).await;
                return Err(AttemptFailure::Failed(TransferError::integrity(
                    url.as_str(),
                    "range not satisfiable",
                )));
            }
            _ => {
                let failure = self.http_handler.status_failure(url, &response);
                if let AttemptFailure::Failed(TransferError::PermanentMiss { .. }) = failure {
                    let _ = tokio::fs::remove_file(part).await;
                }
                return Err(failure);
            }
        };

        let headers = response.headers();
        let etag = header_string(headers, ETAG);
        let last_modified = header_string(headers, LAST_MODIFIED);
        if state.expected_total.is_none() {
            state.expected_total = if append {
                header_string(headers, CONTENT_RANGE)
                    .as_deref()
                    .and_then(content_range_total)
            } else {
                response.content_length().filter(|len| *len > 0)
            };
        }

        let mut file = if append {
            OpenOptions::new()
                .append(true)
                .open(part)
                .await
                .map_err(TransferError::from)?
        } else {
            File::create(part).await.map_err(TransferError::from)?
        };

        // Whatever arrived before a mid-stream failure stays on disk for the next attempt
        let mut stream_error = None;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => file.write_all(&chunk).await.map_err(TransferError::from)?,
                Ok(None) => break,
                Err(e) => {
                    stream_error = Some(self.http_handler.map_reqwest_error(url, e));
                    break;
                }
            }
        }
        file.flush().await.map_err(TransferError::from)?;
        drop(file);
        if let Some(error) = stream_error {
            return Err(error.into());
        }

        let size = tokio::fs::metadata(part)
            .await
            .map_err(TransferError::from)?
            .len();
        if !state.size_satisfied(size) {
            return Err(TransferError::integrity(
                url.as_str(),
                format!(
                    "received {} of {} bytes",
                    size,
                    state.expected_total.unwrap_or_default()
                ),
            )
            .into());
        }

        let bytes = tokio::fs::read(part).await.map_err(TransferError::from)?;
        let (bytes, verified) = tokio::task::spawn_blocking(move || {
            let verified = verify_complete_image(&bytes);
            (bytes, verified)
        })
        .await
        .map_err(|e| TransferError::transient(url.as_str(), e.to_string()))?;

        let (width, height) = match verified {
            Ok(dimensions) => dimensions,
            Err(reason) => {
                warn!("Downloaded payload from {} is not a complete image: {}", url, reason);
                let _ = tokio::fs::remove_file(part).await;
                return Err(TransferError::integrity(url.as_str(), reason).into());
            }
        };

        tokio::fs::rename(part, dest)
            .await
            .map_err(TransferError::from)?;

        Ok(ResumableOutcome::Downloaded {
            content_hash: ContentHash::of(&bytes),
            size,
            width,
            height,
            etag,
            last_modified,
        })
    }
}
