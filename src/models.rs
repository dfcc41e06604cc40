use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// A presigned destination for exactly one chunk.
///
/// URLs expire server-side; a missing mapping for a needed index means
/// "fetch more", never "reuse a stale one".
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkUrl {
    /// 1-based chunk index.
    #[serde(rename = "chunkIndex")]
    pub chunk_index: u32,
    pub url: String,
}

/// An upload session as issued by `POST /uploads`.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub upload_id: String,
    /// Server-chosen chunk size in bytes.
    pub chunk_size: u64,
    pub total_size: u64,
    pub asset_id: String,
    /// Presigned URLs issued with the session. Usually covers only the first
    /// chunks; the rest are fetched lazily as the upload advances.
    pub initial_upload_urls: Vec<ChunkUrl>,
}

/// One staged chunk on disk. Lives only for the duration of a single
/// upload call.
#[derive(Debug, Clone)]
pub struct ChunkFile {
    pub path: PathBuf,
    /// 1-based.
    pub index: u32,
    pub size_bytes: u64,
}

/// Proof that one chunk reached object storage, reported back in batches.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedChunk {
    #[serde(rename = "chunkIndex")]
    pub chunk_index: u32,
    /// Integrity token returned by object storage (unquoted ETag).
    pub proof: String,
    #[serde(rename = "proofType")]
    pub proof_type: String,
    #[serde(rename = "chunkSize")]
    pub chunk_size: u64,
}

/// Progress snapshot passed to the `progress_callback` after each
/// reported batch.
#[derive(Debug, Clone)]
pub struct UploadProgress {
    pub total_chunks: u32,
    /// Monotonically non-decreasing within one upload call.
    pub completed_chunks: u32,
    /// 0.0 to 100.0.
    pub percentage: f64,
    /// Currently always `"uploading"`.
    pub status: String,
}

/// Result of a successful [`Client::upload_file`](crate::Client::upload_file).
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub asset_id: String,
    /// URL of the uploaded asset. Empty until the remote has assigned one
    /// (it may only become available after server-side processing).
    pub asset_url: String,
}

/// Outcome of a status poll over a remote upload.
#[derive(Debug, Clone)]
pub struct UploadStatus {
    /// `"completed"` or `"in_progress"`.
    pub status: String,
    pub completed_chunks: u32,
    pub total_chunks: u32,
}

/// Per-chunk state from `GET /uploads/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkInfo {
    /// 1-based.
    pub index: u32,
    /// `"pending"`, `"completed"`, or `"failed"`.
    pub status: String,
}

/// Configuration for [`Client::upload_file`](crate::Client::upload_file).
pub struct UploadFileOptions {
    /// Name to register the asset under. Defaults to the source's file name.
    pub filename: Option<String>,
    /// Asset type. Default: `"video"`.
    pub file_type: String,
    /// Chunks reported per batch. Default: 10.
    pub batch_size: usize,
    /// Maximum concurrent chunk uploads. Default: 5.
    pub max_workers: usize,
    /// Retry attempts per chunk beyond the first. Default: 3.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries. Default: 1s.
    pub retry_delay: Duration,
    /// Called from the batch-driving task after each reported batch.
    #[allow(clippy::type_complexity)]
    pub progress_callback: Option<Box<dyn Fn(&UploadProgress) + Send>>,
    /// Checked between batches; triggering it aborts the upload with
    /// [`ClipIndexError::Cancelled`](crate::ClipIndexError::Cancelled) after
    /// staged chunks are cleaned up.
    pub cancel: Option<CancellationToken>,
}

impl Default for UploadFileOptions {
    fn default() -> Self {
        Self {
            filename: None,
            file_type: "video".to_string(),
            batch_size: 10,
            max_workers: 5,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            progress_callback: None,
            cancel: None,
        }
    }
}

/// Configuration for
/// [`Client::wait_for_upload_completion`](crate::Client::wait_for_upload_completion).
pub struct WaitForCompletionOptions {
    /// Time between status checks. Must be non-zero. Default: 5s.
    pub sleep_interval: Duration,
    /// Overall deadline. Default: none.
    pub max_wait_time: Option<Duration>,
    /// Called with each non-terminal status observation.
    #[allow(clippy::type_complexity)]
    pub callback: Option<Box<dyn Fn(&UploadStatus) + Send>>,
}

impl Default for WaitForCompletionOptions {
    fn default() -> Self {
        Self {
            sleep_interval: Duration::from_secs(5),
            max_wait_time: None,
            callback: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal deserialization helpers (not part of the public API surface)
// ---------------------------------------------------------------------------

/// POST /uploads response.
#[derive(Deserialize)]
pub(crate) struct CreateUploadResponse {
    pub data: CreateUploadData,
}

#[derive(Deserialize)]
pub(crate) struct CreateUploadData {
    #[serde(rename = "uploadId")]
    pub upload_id: String,
    #[serde(rename = "chunkSize")]
    pub chunk_size: u64,
    #[serde(default, rename = "assetId")]
    pub asset_id: Option<String>,
    #[serde(default, rename = "uploadUrls")]
    pub upload_urls: Vec<ChunkUrl>,
}

/// GET /uploads/{id}/urls response.
#[derive(Deserialize)]
pub(crate) struct AdditionalUrlsResponse {
    pub data: AdditionalUrlsData,
}

#[derive(Deserialize)]
pub(crate) struct AdditionalUrlsData {
    #[serde(default, rename = "uploadUrls")]
    pub upload_urls: Vec<ChunkUrl>,
}

/// POST /uploads/{id}/chunks response.
#[derive(Deserialize)]
pub(crate) struct ReportBatchResponse {
    pub data: ReportBatchData,
}

#[derive(Deserialize)]
pub(crate) struct ReportBatchData {
    /// Final asset URL. Non-empty means the remote considers the upload
    /// complete, whatever the local bookkeeping says.
    #[serde(default)]
    pub url: Option<String>,
}

/// GET /uploads/{id}/status response (one page).
#[derive(Deserialize)]
pub(crate) struct ChunkStatusResponse {
    pub data: Vec<ChunkInfo>,
    #[serde(rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// One page of chunk states plus the cursor for the next page.
#[derive(Debug, Clone)]
pub struct ChunkStatusPage {
    pub chunks: Vec<ChunkInfo>,
    /// Pass back to `get_chunk_status` for the next page. `None` means no
    /// more results.
    pub next_cursor: Option<String>,
}
