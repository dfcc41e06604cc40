//! # ClipIndex SDK for Rust
//!
//! Official Rust client for the [ClipIndex](https://clipindex.io) video
//! understanding API, centered on its resumable multipart upload pipeline:
//! chunking, bounded-concurrency uploads with retry, batch completion
//! reporting, and out-of-band status polling.
//!
//! ## Quick start
//!
//! ```no_run
//! use clipindex::Client;
//!
//! #[tokio::main]
//! async fn main() -> clipindex::Result<()> {
//!     let client = Client::new("ci_live_your_api_key");
//!
//!     // Chunk, upload, and report a large local video
//!     let result = client.upload_file("meeting.mp4", None).await?;
//!     println!("asset {} at {}", result.asset_id, result.asset_url);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Progress tracking and tuning
//!
//! ```no_run
//! use clipindex::{Client, UploadFileOptions};
//!
//! # async fn example() -> clipindex::Result<()> {
//! let client = Client::new("ci_live_your_api_key");
//!
//! let opts = UploadFileOptions {
//!     batch_size: 5,
//!     max_workers: 3,
//!     progress_callback: Some(Box::new(|p| {
//!         println!("{:.1}% ({}/{} chunks)", p.percentage, p.completed_chunks, p.total_chunks);
//!     })),
//!     ..Default::default()
//! };
//! let result = client.upload_file("large_video.mp4", Some(opts)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Monitoring an upload started elsewhere
//!
//! ```no_run
//! use clipindex::{Client, WaitForCompletionOptions};
//! use std::time::Duration;
//!
//! # async fn example() -> clipindex::Result<()> {
//! let client = Client::new("ci_live_your_api_key");
//!
//! let opts = WaitForCompletionOptions {
//!     sleep_interval: Duration::from_secs(10),
//!     max_wait_time: Some(Duration::from_secs(3600)),
//!     ..Default::default()
//! };
//! let status = client
//!     .wait_for_upload_completion("507f1f77bcf86cd799439011", Some(opts))
//!     .await?;
//! println!("{}: {}/{}", status.status, status.completed_chunks, status.total_chunks);
//! # Ok(())
//! # }
//! ```

mod batch;
mod chunks;
mod client;
mod errors;
mod models;
mod source;
mod upload;
mod waiter;

pub use client::{Client, ClientBuilder};
pub use errors::{ClipIndexError, Result};
pub use models::{
    ChunkFile, ChunkInfo, ChunkStatusPage, ChunkUrl, CompletedChunk, UploadFileOptions,
    UploadProgress, UploadResult, UploadSession, UploadStatus, WaitForCompletionOptions,
};
pub use source::{BufferSource, ByteSource, PathSource};
