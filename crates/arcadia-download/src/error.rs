//! Error types for downloads.
//!
//! [`DownloadError`] is returned by the manager to its callers. [`WorkerError`]
//! describes why a single worker run stopped; the manager records its message on
//! the task instead of propagating it.

use arcadia_core::GameId;
use thiserror::Error;

/// A result type using `DownloadError`.
pub type Result<T> = std::result::Result<T, DownloadError>;

/// Errors returned by download manager operations.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// No download exists for the game.
    #[error("no download for game {0}")]
    NotFound(GameId),

    /// The request is malformed.
    #[error("invalid download request: {0}")]
    InvalidRequest(String),

    /// A file name is empty or only made of path components.
    #[error("invalid file name: {0:?}")]
    InvalidFilename(String),

    /// The cache directory could not be prepared.
    #[error("cache directory error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Client(String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] arcadia_store::StoreError),
}

impl DownloadError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidRequest(_) | Self::InvalidFilename(_) => 400,
            Self::Io(_) | Self::Client(_) | Self::Store(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Store(_))
    }
}

/// Reasons a worker run ends without completing.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The source redirected more often than allowed.
    #[error("too many redirects fetching {url}")]
    TooManyRedirects {
        /// The URL that was requested.
        url: String,
    },

    /// The source answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    HttpStatus {
        /// The URL that was requested.
        url: String,
        /// The response status code.
        status: u16,
    },

    /// The connection failed or the body stream broke.
    #[error("transfer of {url} failed: {message}")]
    Transfer {
        /// The URL that was requested.
        url: String,
        /// Underlying failure.
        message: String,
    },

    /// The finished file does not have the advertised size.
    #[error("{filename} is {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// File inside the cache directory.
        filename: String,
        /// Advertised size.
        expected: u64,
        /// Size on disk.
        actual: u64,
    },

    /// Writing to the cache directory failed.
    #[error("write to {filename} failed: {source}")]
    Io {
        /// File inside the cache directory.
        filename: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The cancellation token fired.
    #[error("download cancelled")]
    Cancelled,
}

impl WorkerError {
    /// Classify a `reqwest` error raised while fetching `url`.
    #[must_use]
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            Self::Transfer {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub(crate) fn io(filename: &str, source: std::io::Error) -> Self {
        Self::Io {
            filename: filename.to_string(),
            source,
        }
    }
}
