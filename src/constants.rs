//! Application constants for Wallpaper Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!(
        "Mozilla/5.0 (compatible; Wallpaper-Fetcher/",
        env!("CARGO_PKG_VERSION"),
        ")"
    );

    /// Overall timeout for a single request
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 16;

    /// Maximum number of redirects to follow
    pub const MAX_REDIRECTS: usize = 10;
}

/// Retry, backoff and rate limiting
pub mod limits {
    use super::Duration;

    /// Maximum concurrent in-flight requests across the process
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

    /// Requests per second allowed by the rate limiter
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 20;

    /// Attempts for JSON fetches
    pub const JSON_RETRIES: u32 = 3;

    /// Attempts for existence probes
    pub const PROBE_RETRIES: u32 = 2;

    /// Attempts for full downloads
    pub const DOWNLOAD_RETRIES: u32 = 3;

    /// Attempts for resumable downloads
    pub const RESUMABLE_MAX_TRIES: u32 = 3;

    /// Backoff step, multiplied by the attempt number
    pub const BACKOFF_STEP: Duration = Duration::from_millis(1500);

    /// Backoff ceiling for JSON fetches and downloads
    pub const BACKOFF_CAP: Duration = Duration::from_secs(6);

    /// Backoff ceiling for probes
    pub const PROBE_BACKOFF_CAP: Duration = Duration::from_secs(4);

    /// Sleep applied on 429 when the server omits Retry-After
    pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);

    /// Upper bound on a server-provided Retry-After
    pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(120);
}

/// File operation constants
pub mod files {
    /// Suffix of in-progress resumable downloads
    pub const PARTIAL_FILE_SUFFIX: &str = ".part";

    /// Temporary file suffix for atomic writes
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Directory (under the output root) holding in-flight downloads
    pub const STAGING_DIR_NAME: &str = ".staging";

    /// Ledger database file name (under the output root)
    pub const LEDGER_FILE_NAME: &str = "ledger.sqlite3";

    /// Maximum characters kept from a sanitized filename
    pub const MAX_FILENAME_CHARS: usize = 120;

    /// Extension used when the URL does not provide a recognised one
    pub const DEFAULT_EXTENSION: &str = ".jpg";

    /// Extensions accepted from URL paths
    pub const KNOWN_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];
}

/// Image processing constants
pub mod image {
    /// JPEG quality used for every re-encode
    pub const JPEG_QUALITY: u8 = 92;

    /// Default maximum Hamming distance for perceptual duplicates
    pub const DEFAULT_PHASH_DISTANCE: u32 = 5;
}

/// Worker and concurrency configuration
pub mod workers {
    /// Default number of acquisition workers
    pub const DEFAULT_WORKER_COUNT: usize = 12;

    /// Maximum recommended concurrent workers
    pub const MAX_WORKER_COUNT: usize = 64;

    /// Channel buffer size for worker results
    pub const CHANNEL_BUFFER_SIZE: usize = 256;

    /// Default number of candidates requested per source and tier
    pub const DEFAULT_LIMIT_PER_SOURCE: usize = 40;
}

/// Configuration file locations
pub mod config {
    /// Configuration file looked up in the working directory
    pub const LOCAL_CONFIG_FILE: &str = "wallpaper-fetcher.toml";

    /// Application directory under the platform config dir
    pub const APP_DIR_NAME: &str = "wallpaper-fetcher";

    /// Configuration file name inside the application directory
    pub const CONFIG_FILE_NAME: &str = "config.toml";

    /// Default output root
    pub const DEFAULT_OUTPUT_ROOT: &str = "wallpapers";
}

/// Label used when no classification keyword matches
pub const FALLBACK_LABEL: &str = "other";

// Re-export commonly used constants for convenience
pub use files::{LEDGER_FILE_NAME, PARTIAL_FILE_SUFFIX};
pub use http::{DEFAULT_TIMEOUT as HTTP_TIMEOUT, USER_AGENT};
pub use limits::DEFAULT_MAX_IN_FLIGHT;
pub use workers::DEFAULT_WORKER_COUNT;
