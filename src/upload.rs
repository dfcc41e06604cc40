use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::batch::{BatchUploader, HttpTransport};
use crate::chunks::ChunkStore;
use crate::client::Client;
use crate::errors::{ClipIndexError, Result};
use crate::models::{
    ChunkFile, CompletedChunk, UploadFileOptions, UploadProgress, UploadResult, UploadSession,
};
use crate::source::ByteSource;

/// Holds the sliding window of presigned URLs for one upload session and
/// forwards batch reports to the remote side.
///
/// Single-writer by construction: batches run sequentially, so the window is
/// never touched concurrently.
pub(crate) struct SessionController<'a> {
    client: &'a Client,
    upload_id: String,
    urls: HashMap<u32, String>,
}

impl<'a> SessionController<'a> {
    pub(crate) fn new(client: &'a Client, session: &UploadSession) -> Self {
        let urls = session
            .initial_upload_urls
            .iter()
            .map(|u| (u.chunk_index, u.url.clone()))
            .collect();
        Self {
            client,
            upload_id: session.upload_id.clone(),
            urls,
        }
    }

    /// Grow the URL window to cover `needed`.
    ///
    /// Requests exactly one contiguous range spanning the missing indices;
    /// an index already held is never re-requested.
    pub(crate) async fn ensure_urls(&mut self, needed: &[u32]) -> Result<()> {
        let missing: Vec<u32> = needed
            .iter()
            .copied()
            .filter(|i| !self.urls.contains_key(i))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let start = *missing.iter().min().expect("missing is non-empty");
        let end = *missing.iter().max().expect("missing is non-empty");
        let count = end - start + 1;
        debug!(start, count, "fetching additional presigned URLs");

        let fetched = self
            .client
            .get_additional_upload_urls(&self.upload_id, start, count)
            .await?;
        for url in fetched {
            self.urls.entry(url.chunk_index).or_insert(url.url);
        }
        Ok(())
    }

    pub(crate) fn url_for(&self, index: u32) -> Result<String> {
        self.urls
            .get(&index)
            .cloned()
            .ok_or(ClipIndexError::MissingUploadUrl { chunk_index: index })
    }

    /// Submit one batch of completion proofs. A returned URL is the remote's
    /// authoritative signal that the whole upload is complete.
    pub(crate) async fn report_batch(
        &self,
        completed: &[CompletedChunk],
    ) -> Result<Option<String>> {
        self.client
            .report_chunk_batch(&self.upload_id, completed)
            .await
    }
}

/// Full upload pipeline: create session, stage chunks, drive batches,
/// always clean the staging directory up afterwards.
pub(crate) async fn upload_source<S: ByteSource>(
    client: &Client,
    source: &S,
    opts: UploadFileOptions,
) -> Result<UploadResult> {
    let filename = opts
        .filename
        .clone()
        .or_else(|| source.file_name())
        .unwrap_or_else(|| "upload.bin".to_string());
    let total_size = source.size().await?;

    let session = client
        .create_upload_session(&filename, &opts.file_type, total_size)
        .await?;
    debug!(
        upload_id = %session.upload_id,
        chunk_size = session.chunk_size,
        total_size,
        "upload session created"
    );

    // A failed split cleans up after itself, so only the staged store needs
    // the guaranteed-cleanup treatment.
    let store = ChunkStore::split(source, session.chunk_size).await?;
    let result = drive_batches(client, &session, &store, &opts).await;
    store.cleanup().await;
    result
}

async fn drive_batches(
    client: &Client,
    session: &UploadSession,
    store: &ChunkStore,
    opts: &UploadFileOptions,
) -> Result<UploadResult> {
    let chunks = store.chunks();
    let total_chunks = chunks.len() as u32;
    if total_chunks == 0 {
        return Err(ClipIndexError::InvalidInput {
            message: "source produced no chunks".into(),
        });
    }

    let mut controller = SessionController::new(client, session);
    let uploader = BatchUploader::new(
        Arc::new(HttpTransport::new(client.http().clone())),
        opts.max_workers,
        opts.max_retries,
        opts.retry_delay,
    );

    let mut completed_count: u32 = 0;

    // Batches are strictly sequential and in ascending index order; only the
    // chunks inside one batch run concurrently.
    for batch in chunks.chunks(opts.batch_size.max(1)) {
        if let Some(cancel) = &opts.cancel {
            if cancel.is_cancelled() {
                return Err(ClipIndexError::Cancelled);
            }
        }

        let indices: Vec<u32> = batch.iter().map(|c| c.index).collect();
        controller.ensure_urls(&indices).await?;

        let work: Vec<(ChunkFile, String)> = batch
            .iter()
            .map(|c| Ok((c.clone(), controller.url_for(c.index)?)))
            .collect::<Result<_>>()?;

        let completed = uploader.upload_batch(work).await?;
        let final_url = controller.report_batch(&completed).await?;

        completed_count += completed.len() as u32;
        if let Some(cb) = &opts.progress_callback {
            cb(&UploadProgress {
                total_chunks,
                completed_chunks: completed_count,
                percentage: f64::from(completed_count) / f64::from(total_chunks) * 100.0,
                status: "uploading".to_string(),
            });
        }

        // Remote is the source of truth: a final URL ends the upload even if
        // local bookkeeping still has batches left.
        if let Some(url) = final_url {
            return Ok(UploadResult {
                asset_id: session.asset_id.clone(),
                asset_url: url,
            });
        }
    }

    // Asset URL becomes available once server-side processing finishes.
    Ok(UploadResult {
        asset_id: session.asset_id.clone(),
        asset_url: String::new(),
    })
}
