//! Error types for every stage of the pipeline.
//!
//! Errors are scoped to one concern each so callers can tell a fetch failure
//! from a corrupt history file from a statistic that simply has too little
//! data behind it. None of them is fatal to the scheduler: every failure is
//! local to one tracked item.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// A persisted record could not be turned back into a [`crate::Sample`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SampleError {
    #[error("malformed timestamp '{raw}' (expected YYYY-MM-DD HH:MM:SS [ZONE])")]
    MalformedTimestamp { raw: String },

    #[error("timestamp '{raw}' does not exist in time zone {zone}")]
    NonexistentLocalTime { raw: String, zone: String },

    #[error("malformed value '{raw}' (expected a non-negative decimal integer)")]
    MalformedValue { raw: String },
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Failure reading or writing a series through a [`crate::SeriesStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("record {index} in {path} is invalid: {source}")]
    Record {
        path: PathBuf,
        index: usize,
        #[source]
        source: SampleError,
    },

    #[error("failed to read CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// True for failures that happened while reading existing history.
    pub fn is_read_failure(&self) -> bool {
        !matches!(self, Self::Write { .. })
    }
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Failure retrieving the raw metric from the external source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("no play count found in page {url}")]
    PlayCountNotFound { url: String },

    #[error("giving up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Worth retrying within the same poll: network trouble, server errors,
    /// rate limiting. A page without a play count is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Client(_) | Self::PlayCountNotFound { .. } | Self::Exhausted { .. } => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// A derived statistic could not be computed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AggregateError {
    #[error("need at least 2 samples, have {have}")]
    InsufficientSamples { have: usize },
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration could not be loaded or failed validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown time zone '{0}'")]
    UnknownTimeZone(String),

    #[error("catalog has no tracked items")]
    EmptyCatalog,

    #[error("duplicate item id '{0}' in catalog")]
    DuplicateItem(String),

    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Failure while polling one tracked item.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
