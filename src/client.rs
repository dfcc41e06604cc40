use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::errors::{ClipIndexError, Result};
use crate::models::{
    AdditionalUrlsResponse, ChunkStatusPage, ChunkStatusResponse, ChunkUrl, CompletedChunk,
    CreateUploadResponse, ReportBatchResponse, UploadFileOptions, UploadResult, UploadSession,
    UploadStatus, WaitForCompletionOptions,
};
use crate::source::{ByteSource, PathSource};

const DEFAULT_BASE_URL: &str = "https://api.clipindex.io/v1";
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Builder for constructing a [`Client`] with custom configuration.
///
/// # Example
///
/// ```no_run
/// use clipindex::ClientBuilder;
/// use std::time::Duration;
///
/// # fn example() -> clipindex::Result<()> {
/// let client = ClientBuilder::new()
///     .api_key("ci_live_abc123")
///     .base_url("https://custom.example.com/v1")
///     .max_retries(5)
///     .timeout(Duration::from_secs(120))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    api_key: Option<String>,
    base_url: String,
    max_retries: u32,
    timeout: Duration,
}

impl ClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the API key for authentication.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Override the base URL (defaults to `https://api.clipindex.io/v1`).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the maximum number of retries for transient API errors (defaults to 3).
    ///
    /// This covers the coordination calls only; per-chunk upload retries are
    /// configured through
    /// [`UploadFileOptions::max_retries`](crate::UploadFileOptions::max_retries).
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the HTTP request timeout (defaults to 60 seconds).
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = d;
        self
    }

    /// Build the [`Client`].
    ///
    /// If no API key was set via [`api_key`](Self::api_key), the builder will
    /// attempt to read the `CLIPINDEX_API_KEY` environment variable.
    ///
    /// Returns [`ClipIndexError::Authentication`] if no key is available.
    pub fn build(self) -> Result<Client> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("CLIPINDEX_API_KEY").ok())
            .ok_or_else(|| ClipIndexError::Authentication {
                message: "API key is required. Pass it to ClientBuilder::api_key() \
                          or set the CLIPINDEX_API_KEY environment variable."
                    .into(),
            })?;

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(ClipIndexError::Http)?;

        Ok(Client {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            api_key,
            http,
            max_retries: self.max_retries,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The ClipIndex API client.
///
/// Use [`Client::new`] for quick construction or [`ClientBuilder`] for full control.
///
/// # Example
///
/// ```no_run
/// use clipindex::Client;
///
/// # async fn example() -> clipindex::Result<()> {
/// let client = Client::new("ci_live_abc123");
///
/// // Chunk, upload, and report a large local video
/// let result = client.upload_file("video.mp4", None).await?;
/// println!("asset {} at {}", result.asset_id, result.asset_url);
/// # Ok(())
/// # }
/// ```
pub struct Client {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
    max_retries: u32,
}

impl Client {
    /// Create a new client with the given API key and default settings.
    ///
    /// For customization, use [`ClientBuilder`] instead.
    pub fn new(api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            http,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Upload a local file through the multipart upload pipeline.
    ///
    /// Creates an upload session, splits the file into server-sized chunks in
    /// a temporary staging directory, uploads them batch by batch with
    /// bounded concurrency and per-chunk retry, and reports each completed
    /// batch back to the session. Staged chunks are always deleted, whether
    /// the upload succeeds or fails.
    ///
    /// # Errors
    ///
    /// - [`ClipIndexError::Split`] if the file cannot be read or staged.
    /// - [`ClipIndexError::ChunkFailed`] if one chunk exhausts its retries;
    ///   [`chunk_index`](ClipIndexError::chunk_index) names the chunk.
    /// - [`ClipIndexError::Api`] (and friends) if a coordination call fails.
    /// - [`ClipIndexError::Cancelled`] if the cancellation token fires.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        opts: Option<UploadFileOptions>,
    ) -> Result<UploadResult> {
        let source = PathSource::new(path);
        crate::upload::upload_source(self, &source, opts.unwrap_or_default()).await
    }

    /// Upload any [`ByteSource`] (an in-memory buffer, for instance) through
    /// the same pipeline as [`upload_file`](Self::upload_file).
    pub async fn upload_source<S: ByteSource>(
        &self,
        source: &S,
        opts: Option<UploadFileOptions>,
    ) -> Result<UploadResult> {
        crate::upload::upload_source(self, source, opts.unwrap_or_default()).await
    }

    /// Poll the chunk status of an upload until it completes or fails.
    ///
    /// Designed for monitoring uploads started elsewhere: only an `upload_id`
    /// is needed, no local state.
    ///
    /// # Errors
    ///
    /// - [`ClipIndexError::ChunkFailedRemotely`] if the listing reports any
    ///   failed chunk.
    /// - [`ClipIndexError::Timeout`] if `max_wait_time` elapses first.
    pub async fn wait_for_upload_completion(
        &self,
        upload_id: &str,
        opts: Option<WaitForCompletionOptions>,
    ) -> Result<UploadStatus> {
        crate::waiter::wait_for_completion(self, upload_id, &opts.unwrap_or_default()).await
    }

    // -----------------------------------------------------------------------
    // Low-level upload session API
    // -----------------------------------------------------------------------

    /// Create a multipart upload session via `POST /uploads`.
    ///
    /// The server picks the chunk size and issues presigned URLs for the
    /// first chunks.
    pub async fn create_upload_session(
        &self,
        filename: &str,
        file_type: &str,
        total_size: u64,
    ) -> Result<UploadSession> {
        let body = json!({
            "filename": filename,
            "type": file_type,
            "totalSize": total_size,
        });

        let resp: CreateUploadResponse = self.request("POST", "/uploads", &[], Some(body)).await?;
        let data = resp.data;

        if data.upload_id.is_empty() || data.chunk_size == 0 {
            return Err(ClipIndexError::InvalidInput {
                message: "invalid upload session response: missing uploadId or chunkSize".into(),
            });
        }

        Ok(UploadSession {
            upload_id: data.upload_id,
            chunk_size: data.chunk_size,
            total_size,
            asset_id: data.asset_id.unwrap_or_default(),
            initial_upload_urls: data.upload_urls,
        })
    }

    /// Fetch presigned URLs for the contiguous chunk range
    /// `[start, start + count)`.
    pub async fn get_additional_upload_urls(
        &self,
        upload_id: &str,
        start: u32,
        count: u32,
    ) -> Result<Vec<ChunkUrl>> {
        let query = [("start", start.to_string()), ("count", count.to_string())];
        let resp: AdditionalUrlsResponse = self
            .request("GET", &format!("/uploads/{upload_id}/urls"), &query, None)
            .await?;
        Ok(resp.data.upload_urls)
    }

    /// Report one batch of completed chunks.
    ///
    /// Returns the final asset URL once the remote considers the upload
    /// complete, `None` otherwise.
    pub async fn report_chunk_batch(
        &self,
        upload_id: &str,
        completed: &[CompletedChunk],
    ) -> Result<Option<String>> {
        let body = json!({ "completedChunks": completed });
        let resp: ReportBatchResponse = self
            .request(
                "POST",
                &format!("/uploads/{upload_id}/chunks"),
                &[],
                Some(body),
            )
            .await?;
        Ok(resp.data.url.filter(|u| !u.is_empty()))
    }

    /// Fetch one page of per-chunk states for an upload.
    ///
    /// Pass the returned [`next_cursor`](ChunkStatusPage::next_cursor) back in
    /// to walk the full listing.
    pub async fn get_chunk_status(
        &self,
        upload_id: &str,
        cursor: Option<&str>,
    ) -> Result<ChunkStatusPage> {
        // Cursors are opaque server tokens; let reqwest encode them.
        let query: Vec<(&str, String)> = cursor
            .into_iter()
            .map(|c| ("cursor", c.to_string()))
            .collect();

        let resp: ChunkStatusResponse = self
            .request("GET", &format!("/uploads/{upload_id}/status"), &query, None)
            .await?;
        Ok(ChunkStatusPage {
            chunks: resp.data,
            next_cursor: resp.next_cursor,
        })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Execute an HTTP request with automatic retry for transient failures.
    ///
    /// Retries are performed for:
    /// - HTTP 5xx server errors
    /// - HTTP 429 rate-limit responses
    /// - Network-level errors (connection refused, timeout, etc.)
    ///
    /// Exponential backoff is applied: 1s, 2s, 4s, ...
    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|_| {
                ClipIndexError::Authentication {
                    message: "API key contains invalid header characters".into(),
                }
            })?,
        );

        let mut last_err: Option<ClipIndexError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(backoff).await;
            }

            let mut req = match method {
                "GET" => self.http.get(&url),
                "POST" => self.http.post(&url),
                "PUT" => self.http.put(&url),
                "DELETE" => self.http.delete(&url),
                "PATCH" => self.http.patch(&url),
                _ => self.http.get(&url),
            };

            req = req.headers(headers.clone());

            if !query.is_empty() {
                req = req.query(query);
            }

            if let Some(ref b) = body {
                req = req.header(CONTENT_TYPE, "application/json").json(b);
            }

            let response = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    // Network-level error: retry if we have attempts left.
                    last_err = Some(ClipIndexError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            // Successful response: deserialize and return.
            if status.is_success() {
                let value: T = response.json().await.map_err(ClipIndexError::Http)?;
                return Ok(value);
            }

            // Map well-known error codes to typed errors.
            let status_code = status.as_u16();
            let response_text = response.text().await.unwrap_or_default();

            let parsed_body: Option<serde_json::Value> =
                serde_json::from_str(&response_text).ok();

            let message = parsed_body
                .as_ref()
                .and_then(|b| b.get("error"))
                .and_then(|e| e.as_str())
                .unwrap_or(&response_text)
                .to_string();

            let err = match status_code {
                401 => ClipIndexError::Authentication { message },
                403 => ClipIndexError::PermissionDenied { message },
                404 => ClipIndexError::NotFound { message },
                429 => {
                    // Extract Retry-After header if present.
                    let retry_after = parsed_body
                        .as_ref()
                        .and_then(|b| b.get("retryAfter"))
                        .and_then(|v| v.as_f64());

                    ClipIndexError::RateLimit {
                        message,
                        retry_after,
                    }
                }
                _ => ClipIndexError::Api {
                    status_code,
                    message,
                    body: parsed_body,
                },
            };

            // Retry on 5xx or 429; return immediately for other errors.
            if status_code >= 500 || status_code == 429 {
                last_err = Some(err);
                continue;
            }

            return Err(err);
        }

        // All retries exhausted.
        Err(last_err.unwrap_or_else(|| ClipIndexError::Api {
            status_code: 0,
            message: "request failed after all retries".into(),
            body: None,
        }))
    }
}
