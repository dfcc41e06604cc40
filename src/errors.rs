use std::time::Duration;

use thiserror::Error;

/// All errors that can occur when using the ClipIndex SDK.
#[derive(Error, Debug)]
pub enum ClipIndexError {
    /// The API key is missing or invalid (HTTP 401).
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// The authenticated user does not have access to the requested resource (HTTP 403).
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    /// The requested resource was not found (HTTP 404).
    #[error("not found: {message}")]
    NotFound { message: String },

    /// The request was rate-limited (HTTP 429).
    #[error("rate limited (retry after {retry_after:?}s): {message}")]
    RateLimit {
        message: String,
        retry_after: Option<f64>,
    },

    /// A non-specific API error with the HTTP status code and response body.
    ///
    /// Covers session creation, presigned-URL fetch, batch report, and
    /// status-listing failures that the transport retry did not absorb.
    #[error("API error {status_code}: {message}")]
    Api {
        status_code: u16,
        message: String,
        body: Option<serde_json::Value>,
    },

    /// A transport-level HTTP error from reqwest.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// An I/O error, typically from reading a local file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller supplied an unusable option or the remote session response
    /// was missing required fields.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Local I/O failed while splitting the source into staged chunks.
    /// Raised before any chunk leaves the machine; staged files are removed.
    #[error("failed to split source into chunks: {0}")]
    Split(#[source] std::io::Error),

    /// A single upload attempt for one chunk failed. Absorbed by the retry
    /// loop; only surfaces as the `source` of [`ClipIndexError::ChunkFailed`].
    #[error("chunk {chunk_index} upload attempt failed: {message}")]
    ChunkUpload { chunk_index: u32, message: String },

    /// One chunk exhausted every retry attempt, failing the whole upload.
    #[error("chunk {chunk_index} failed after {attempts} attempts: {source}")]
    ChunkFailed {
        chunk_index: u32,
        attempts: u32,
        #[source]
        source: Box<ClipIndexError>,
    },

    /// The presigned-URL window has no entry for a chunk that must be
    /// uploaded, even after fetching the covering range.
    #[error("no presigned URL available for chunk {chunk_index}")]
    MissingUploadUrl { chunk_index: u32 },

    /// The remote status listing reported one or more chunks as failed.
    #[error("chunks {chunk_indices:?} failed to upload")]
    ChunkFailedRemotely { chunk_indices: Vec<u32> },

    /// Waiting for upload completion exceeded the configured timeout.
    #[error("upload wait timed out after {0:?}")]
    Timeout(Duration),

    /// The caller's cancellation token was triggered between batches.
    #[error("upload cancelled")]
    Cancelled,
}

impl ClipIndexError {
    /// The chunk index this error refers to, if it names one.
    pub fn chunk_index(&self) -> Option<u32> {
        match self {
            ClipIndexError::ChunkUpload { chunk_index, .. }
            | ClipIndexError::ChunkFailed { chunk_index, .. }
            | ClipIndexError::MissingUploadUrl { chunk_index } => Some(*chunk_index),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, ClipIndexError>`.
pub type Result<T> = std::result::Result<T, ClipIndexError>;
