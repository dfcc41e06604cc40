//! Quick-start examples for the ClipIndex Rust SDK.
//!
//! Run with:
//!   CLIPINDEX_API_KEY=ci_live_... cargo run --example quickstart

use std::time::Duration;

use clipindex::{ClientBuilder, UploadFileOptions, WaitForCompletionOptions};

#[tokio::main]
async fn main() -> clipindex::Result<()> {
    // --- 1. Build a client (reads CLIPINDEX_API_KEY from the environment) ---
    let client = ClientBuilder::new().build()?;

    // --- 2. Upload a video with the defaults ---
    let result = client.upload_file("video.mp4", None).await?;
    println!("Uploaded asset: {}", result.asset_id);
    if !result.asset_url.is_empty() {
        println!("Asset URL: {}", result.asset_url);
    }

    // --- 3. Upload a large file with tuned batching and a progress bar ---
    let opts = UploadFileOptions {
        batch_size: 20,
        max_workers: 8,
        progress_callback: Some(Box::new(|p| {
            println!(
                "  {}/{} chunks ({:.1}%)",
                p.completed_chunks, p.total_chunks, p.percentage
            );
        })),
        ..Default::default()
    };
    let result = client.upload_file("feature_film.mp4", Some(opts)).await?;
    println!("Uploaded asset: {}", result.asset_id);

    // --- 4. Monitor an upload started elsewhere ---
    let opts = WaitForCompletionOptions {
        sleep_interval: Duration::from_secs(10),
        max_wait_time: Some(Duration::from_secs(3600)),
        callback: Some(Box::new(|s| {
            println!("  {}: {}/{}", s.status, s.completed_chunks, s.total_chunks);
        })),
    };
    let status = client
        .wait_for_upload_completion("507f1f77bcf86cd799439011", Some(opts))
        .await?;
    println!("Upload finished: {}", status.status);

    // --- 5. Walk the raw per-chunk status pages ---
    let mut cursor: Option<String> = None;
    loop {
        let page = client
            .get_chunk_status("507f1f77bcf86cd799439011", cursor.as_deref())
            .await?;
        for chunk in &page.chunks {
            println!("  chunk {}: {}", chunk.index, chunk.status);
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(())
}
