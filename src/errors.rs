//! Error types for Wallpaper Fetcher
//!
//! Each component owns a closed error enumeration. Callers match on the kind
//! rather than on implementation details of the underlying libraries. Control
//! outcomes such as "duplicate, skipped" or "not modified" are not errors and
//! live in [`crate::app::acquirer::TierOutcome`] instead.

use std::path::PathBuf;
use thiserror::Error;

/// Network transfer errors raised by the transport layer
#[derive(Error, Debug)]
pub enum TransferError {
    /// Timeouts, connection resets, 5xx and exhausted 429 retries
    #[error("Transient network failure for {url}: {reason}")]
    Transient { url: String, reason: String },

    /// The resource is known to be absent (404 or probe-confirmed)
    #[error("Resource permanently absent: {url}")]
    PermanentMiss { url: String },

    /// Size mismatch or structurally incomplete image payload
    #[error("Integrity check failed for {url}: {reason}")]
    Integrity { url: String, reason: String },

    /// The request exceeded its overall timeout
    #[error("Request to {url} timed out after {seconds} seconds")]
    Timeout { url: String, seconds: u64 },

    /// Retry budget exhausted
    #[error("Maximum retry attempts ({attempts}) exceeded for {url}: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// Response body could not be decoded
    #[error("Failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// Invalid URL provided
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// The robots gate refused the URL
    #[error("Robots policy denies {url}")]
    RobotsDenied { url: String },

    /// HTTP client construction or request building failed
    #[error("HTTP client error")]
    Http(#[from] reqwest::Error),

    /// I/O error on the partial or final download file
    #[error("File I/O error during transfer")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Whether another attempt against the same URL may succeed.
    ///
    /// Integrity failures count as retryable since they usually come from a
    /// truncated transfer.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Transient { .. }
            | TransferError::Timeout { .. }
            | TransferError::Integrity { .. }
            | TransferError::Http(_)
            | TransferError::Io(_) => true,
            TransferError::PermanentMiss { .. }
            | TransferError::RetriesExhausted { .. }
            | TransferError::Decode { .. }
            | TransferError::InvalidUrl { .. }
            | TransferError::RobotsDenied { .. } => false,
        }
    }

    /// Whether the URL should not be tried again in this run
    pub fn is_permanent_miss(&self) -> bool {
        matches!(
            self,
            TransferError::PermanentMiss { .. } | TransferError::RobotsDenied { .. }
        )
    }

    pub(crate) fn transient(url: &str, reason: impl Into<String>) -> Self {
        Self::Transient {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn integrity(url: &str, reason: impl Into<String>) -> Self {
        Self::Integrity {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

/// Ledger storage errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// SQLite failure
    #[error("Ledger database error")]
    Database(#[from] rusqlite::Error),

    /// Metadata blob could not be (de)serialized
    #[error("Ledger metadata serialization failed")]
    Metadata(#[from] serde_json::Error),

    /// A migration step failed to apply
    #[error("Ledger migration to version {version} failed: {reason}")]
    Migration { version: i64, reason: String },

    /// The ledger file or its directory is unusable
    #[error("Ledger path not accessible: {path}")]
    PathNotAccessible { path: PathBuf },

    /// A stored row could not be interpreted
    #[error("Corrupt ledger row for key {key}: {reason}")]
    CorruptRow { key: String, reason: String },

    /// The connection mutex was poisoned by a panicking writer
    #[error("Ledger lock poisoned")]
    LockPoisoned,

    /// Blocking task running a ledger operation failed
    #[error("Ledger task failed: {0}")]
    Task(String),

    /// I/O error creating the ledger directory
    #[error("Ledger I/O error")]
    Io(#[from] std::io::Error),
}

/// Persistence and mirror writer errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Parent directory could not be created
    #[error("Failed to create directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the primary artifact failed
    #[error("Failed to write primary file {path}")]
    WritePrimary {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Neither hard link nor copy could materialize a mirror
    #[error("Failed to create mirror {mirror} of {primary}")]
    Mirror {
        primary: PathBuf,
        mirror: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Atomic rename from temporary to final path failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },

    /// Generic I/O error
    #[error("Store I/O error")]
    Io(#[from] std::io::Error),
}

/// Candidate source errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// The feed document could not be read
    #[error("Failed to read feed {location}")]
    Read {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// The feed document is not valid JSON for the expected shape
    #[error("Invalid feed format in {location}: {reason}")]
    InvalidFormat { location: String, reason: String },

    /// Remote feed fetch failed
    #[error("Failed to fetch remote feed")]
    Transfer(#[from] TransferError),

    /// A source-specific failure
    #[error("Source {source_name} failed: {reason}")]
    Failed { source_name: String, reason: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Failed to serialize configuration")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Unknown resolution tier name
    #[error("Unsupported resolution tier '{name}'. Expected one of 4k, 2k, 1k (or high, medium, low)")]
    UnknownTier { name: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<String> },

    /// I/O error reading or writing a configuration file
    #[error("Configuration file I/O error")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Transfer error
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Ledger error
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Source error
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Transfer(e) => e.is_retryable(),
            AppError::Source(SourceError::Transfer(e)) => e.is_retryable(),
            AppError::Ledger(LedgerError::LockPoisoned) => false,
            AppError::Config(_) => false,
            _ => false,
        }
    }

    /// Get error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Transfer(_) => "transfer",
            AppError::Ledger(_) => "ledger",
            AppError::Store(_) => "store",
            AppError::Source(_) => "source",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Transfer result type alias
pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Ledger result type alias
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Source result type alias
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Config result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
