use tokio::time::Instant;
use tracing::warn;

use crate::client::Client;
use crate::errors::{ClipIndexError, Result};
use crate::models::{UploadStatus, WaitForCompletionOptions};

/// Poll the remote chunk listing until every chunk completes, one fails, or
/// the deadline passes.
///
/// Runs independently of any in-process upload: retries already happened at
/// upload time, so a remotely failed chunk is immediately fatal here.
/// Transient errors fetching the listing are logged and retried on the next
/// interval.
pub(crate) async fn wait_for_completion(
    client: &Client,
    upload_id: &str,
    opts: &WaitForCompletionOptions,
) -> Result<UploadStatus> {
    if opts.sleep_interval.is_zero() {
        return Err(ClipIndexError::InvalidInput {
            message: "sleep_interval must be greater than 0".into(),
        });
    }

    let start = Instant::now();

    loop {
        match poll_once(client, upload_id).await {
            Ok(counts) => {
                if !counts.failed.is_empty() {
                    return Err(ClipIndexError::ChunkFailedRemotely {
                        chunk_indices: counts.failed,
                    });
                }

                if counts.completed == counts.total {
                    return Ok(UploadStatus {
                        status: "completed".to_string(),
                        completed_chunks: counts.completed,
                        total_chunks: counts.total,
                    });
                }

                if let Some(cb) = &opts.callback {
                    cb(&UploadStatus {
                        status: "in_progress".to_string(),
                        completed_chunks: counts.completed,
                        total_chunks: counts.total,
                    });
                }
            }
            Err(e) => {
                warn!(upload_id, error = %e, "error checking upload status");
            }
        }

        if let Some(max_wait) = opts.max_wait_time {
            if start.elapsed() >= max_wait {
                return Err(ClipIndexError::Timeout(max_wait));
            }
        }

        tokio::time::sleep(opts.sleep_interval).await;
    }
}

struct PollCounts {
    completed: u32,
    total: u32,
    failed: Vec<u32>,
}

/// One full status observation: drains every page so the counts are exact.
async fn poll_once(client: &Client, upload_id: &str) -> Result<PollCounts> {
    let mut counts = PollCounts {
        completed: 0,
        total: 0,
        failed: Vec::new(),
    };

    let mut cursor: Option<String> = None;
    loop {
        let page = client.get_chunk_status(upload_id, cursor.as_deref()).await?;
        for chunk in page.chunks {
            counts.total += 1;
            match chunk.status.as_str() {
                "completed" => counts.completed += 1,
                "failed" => counts.failed.push(chunk.index),
                _ => {}
            }
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    counts.failed.sort_unstable();
    Ok(counts)
}
