use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncRead;

/// A local supply of bytes that can be uploaded.
///
/// Abstracts over "path on disk" and "buffer in memory" so the chunking
/// engine reads every source the same way.
pub trait ByteSource {
    /// Sequential reader positioned at the first byte.
    type Reader: AsyncRead + Send + Unpin;

    /// Open the source for a fresh read from offset 0.
    fn open_for_read(&self) -> impl Future<Output = io::Result<Self::Reader>> + Send;

    /// Total size in bytes.
    fn size(&self) -> impl Future<Output = io::Result<u64>> + Send;

    /// Best-effort name, used for the asset filename and to label the
    /// staging directory.
    fn file_name(&self) -> Option<String>;
}

/// A [`ByteSource`] backed by a file on disk.
#[derive(Debug, Clone)]
pub struct PathSource {
    path: PathBuf,
}

impl PathSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for PathSource {
    type Reader = tokio::fs::File;

    fn open_for_read(&self) -> impl Future<Output = io::Result<Self::Reader>> + Send {
        tokio::fs::File::open(self.path.clone())
    }

    async fn size(&self) -> io::Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }

    fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }
}

/// A [`ByteSource`] backed by an in-memory buffer.
#[derive(Debug, Clone)]
pub struct BufferSource {
    name: Option<String>,
    bytes: Vec<u8>,
}

impl BufferSource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { name: None, bytes }
    }

    /// Attach a file name to report to the remote session.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl ByteSource for BufferSource {
    type Reader = io::Cursor<Vec<u8>>;

    async fn open_for_read(&self) -> io::Result<Self::Reader> {
        Ok(io::Cursor::new(self.bytes.clone()))
    }

    async fn size(&self) -> io::Result<u64> {
        Ok(self.bytes.len() as u64)
    }

    fn file_name(&self) -> Option<String> {
        self.name.clone()
    }
}
