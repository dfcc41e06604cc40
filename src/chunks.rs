use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::errors::{ClipIndexError, Result};
use crate::models::ChunkFile;
use crate::source::ByteSource;

/// Staged chunk files for one upload call.
///
/// Owns a unique directory under the OS temp dir; no two concurrent uploads
/// share one. The store must be [`cleanup`](ChunkStore::cleanup)ed on every
/// exit path; a failed split cleans up after itself before returning.
#[derive(Debug)]
pub(crate) struct ChunkStore {
    dir: PathBuf,
    chunks: Vec<ChunkFile>,
}

impl ChunkStore {
    /// Split `source` into `chunk_size`-byte files (final chunk may be
    /// shorter), staged in a fresh directory. Chunk indices are 1-based and
    /// match creation order.
    pub(crate) async fn split<S: ByteSource>(source: &S, chunk_size: u64) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ClipIndexError::InvalidInput {
                message: "chunk size must be greater than 0".into(),
            });
        }

        let dir = staging_dir(source.file_name().as_deref());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(ClipIndexError::Split)?;

        let mut store = Self {
            dir,
            chunks: Vec::new(),
        };

        if let Err(e) = store.fill(source, chunk_size as usize).await {
            // No partial artifacts survive a failed split.
            store.purge().await;
            return Err(ClipIndexError::Split(e));
        }

        debug!(chunks = store.chunks.len(), dir = %store.dir.display(), "source split into chunks");
        Ok(store)
    }

    async fn fill<S: ByteSource>(&mut self, source: &S, chunk_size: usize) -> std::io::Result<()> {
        let mut reader = source.open_for_read().await?;
        let mut index: u32 = 1;

        loop {
            let mut buf = vec![0u8; chunk_size];
            let mut filled = 0;
            while filled < chunk_size {
                let n = reader.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            buf.truncate(filled);

            let path = self.dir.join(format!("chunk_{index:04}"));
            tokio::fs::write(&path, &buf).await?;
            self.chunks.push(ChunkFile {
                path,
                index,
                size_bytes: filled as u64,
            });
            index += 1;
        }

        Ok(())
    }

    pub(crate) fn chunks(&self) -> &[ChunkFile] {
        &self.chunks
    }

    /// Delete every staged chunk, then the staging directory if it is empty.
    ///
    /// Best-effort and idempotent: individual delete failures are logged,
    /// never raised, and calling this on an already-cleaned store is a no-op.
    pub(crate) async fn cleanup(&self) {
        for chunk in &self.chunks {
            match tokio::fs::remove_file(&chunk.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %chunk.path.display(), error = %e, "failed to delete chunk file");
                }
            }
        }

        // Only removable when empty; anything else left inside is not ours.
        if let Err(e) = tokio::fs::remove_dir(&self.dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(dir = %self.dir.display(), error = %e, "staging directory not removed");
            }
        }
    }

    /// Cleanup for a failed split. Also sweeps files `cleanup` does not know
    /// about, such as a chunk the failing write left half-finished.
    async fn purge(&self) {
        self.cleanup().await;
        if let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let _ = tokio::fs::remove_file(entry.path()).await;
            }
            let _ = tokio::fs::remove_dir(&self.dir).await;
        }
    }
}

/// `<stem>_chunks_<millis>_<pid>` under the OS temp dir, unique per call.
fn staging_dir(file_name: Option<&str>) -> PathBuf {
    let stem = file_name
        .map(|n| {
            Path::new(n)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| n.to_string())
        })
        .unwrap_or_else(|| "upload".to_string());

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);

    std::env::temp_dir().join(format!("{stem}_chunks_{millis}_{}", std::process::id()))
}
