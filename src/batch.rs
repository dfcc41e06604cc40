use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, ETAG};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::errors::{ClipIndexError, Result};
use crate::models::{ChunkFile, CompletedChunk};

/// Delivers one chunk's bytes to a presigned destination.
///
/// The upload loop only sees this seam, so tests can swap the HTTP PUT for
/// an instrumented fake.
pub(crate) trait ChunkTransport: Send + Sync + 'static {
    /// PUT the chunk and return its integrity token.
    fn put_chunk(
        &self,
        chunk: &ChunkFile,
        url: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Production transport: a single `PUT` of the staged bytes to object
/// storage. Success requires a 2xx status and a present `ETag` header.
pub(crate) struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub(crate) fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl ChunkTransport for HttpTransport {
    fn put_chunk(
        &self,
        chunk: &ChunkFile,
        url: &str,
    ) -> impl Future<Output = Result<String>> + Send {
        async move {
            let attempt_err = |message: String| ClipIndexError::ChunkUpload {
                chunk_index: chunk.index,
                message,
            };

            let bytes = tokio::fs::read(&chunk.path)
                .await
                .map_err(|e| attempt_err(format!("failed to read staged chunk: {e}")))?;

            let response = self
                .http
                .put(url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(bytes)
                .send()
                .await
                .map_err(|e| attempt_err(format!("PUT to presigned URL failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(attempt_err(format!("HTTP {}: {text}", status.as_u16())));
            }

            // A 2xx without an integrity token is still a failed attempt.
            response
                .headers()
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim_matches('"').to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| attempt_err("no ETag header in storage response".into()))
        }
    }
}

/// Uploads one batch of chunks with bounded concurrency and per-chunk
/// retry with exponential backoff.
pub(crate) struct BatchUploader<T> {
    transport: Arc<T>,
    max_concurrency: usize,
    max_retries: u32,
    base_delay: Duration,
}

impl<T: ChunkTransport> BatchUploader<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        max_concurrency: usize,
        max_retries: u32,
        base_delay: Duration,
    ) -> Self {
        Self {
            transport,
            max_concurrency: max_concurrency.max(1),
            max_retries,
            base_delay,
        }
    }

    /// Upload every `(chunk, presigned_url)` pair, at most `max_concurrency`
    /// in flight at once.
    ///
    /// The whole batch succeeds only if every chunk does. On any permanent
    /// chunk failure the remaining in-flight chunks are allowed to finish,
    /// then the first failure is returned; no partial result escapes.
    pub(crate) async fn upload_batch(
        &self,
        work: Vec<(ChunkFile, String)>,
    ) -> Result<Vec<CompletedChunk>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set = JoinSet::new();

        for (chunk, url) in work {
            let transport = Arc::clone(&self.transport);
            let semaphore = Arc::clone(&semaphore);
            let max_retries = self.max_retries;
            let base_delay = self.base_delay;

            join_set.spawn(async move {
                // Permit held across retries: a backing-off chunk still
                // counts against the concurrency bound.
                let _permit = semaphore.acquire_owned().await.map_err(|_| {
                    ClipIndexError::Io(std::io::Error::other("upload semaphore closed"))
                })?;
                upload_with_retry(transport.as_ref(), &chunk, &url, max_retries, base_delay).await
            });
        }

        let mut completed = Vec::new();
        let mut first_err: Option<ClipIndexError> = None;

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(Ok(chunk)) => completed.push(chunk),
                Ok(Err(e)) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(join_err) => {
                    if first_err.is_none() {
                        first_err = Some(ClipIndexError::Io(std::io::Error::other(format!(
                            "chunk upload task panicked: {join_err}"
                        ))));
                    }
                }
            }
        }

        if let Some(e) = first_err {
            return Err(e);
        }

        completed.sort_by_key(|c| c.chunk_index);
        Ok(completed)
    }
}

/// One chunk's retry loop: `max_retries + 1` attempts total, sleeping
/// `base_delay * 2^attempt` between them.
async fn upload_with_retry<T: ChunkTransport>(
    transport: &T,
    chunk: &ChunkFile,
    url: &str,
    max_retries: u32,
    base_delay: Duration,
) -> Result<CompletedChunk> {
    let mut attempt: u32 = 0;

    loop {
        match transport.put_chunk(chunk, url).await {
            Ok(proof) => {
                return Ok(CompletedChunk {
                    chunk_index: chunk.index,
                    proof,
                    proof_type: "etag".to_string(),
                    chunk_size: chunk.size_bytes,
                });
            }
            Err(err) => {
                if attempt >= max_retries {
                    warn!(
                        chunk = chunk.index,
                        attempts = max_retries + 1,
                        error = %err,
                        "chunk upload failed permanently"
                    );
                    return Err(ClipIndexError::ChunkFailed {
                        chunk_index: chunk.index,
                        attempts: max_retries + 1,
                        source: Box::new(err),
                    });
                }

                warn!(
                    chunk = chunk.index,
                    attempt = attempt + 1,
                    total = max_retries + 1,
                    error = %err,
                    "chunk upload failed, retrying"
                );
                tokio::time::sleep(base_delay.saturating_mul(1u32 << attempt.min(16))).await;
                attempt += 1;
            }
        }
    }
}
