//! End-to-end multipart upload scenarios against a mock API and mock
//! object storage, both served by wiremock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clipindex::{
    BufferSource, Client, ClientBuilder, ClipIndexError, UploadFileOptions, UploadStatus,
    WaitForCompletionOptions,
};

/// Client pointed at the mock server, with transport-level retries disabled
/// so tests control every retry through the upload options.
fn client_for(server: &MockServer) -> Client {
    ClientBuilder::new()
        .api_key("test-key")
        .base_url(server.uri())
        .max_retries(0)
        .build()
        .unwrap()
}

fn fast_opts() -> UploadFileOptions {
    UploadFileOptions {
        retry_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

async fn mount_session(server: &MockServer, chunk_size: u64, url_indices: &[u32]) {
    let urls: Vec<serde_json::Value> = url_indices
        .iter()
        .map(|i| {
            json!({
                "chunkIndex": i,
                "url": format!("{}/chunk/{}", server.uri(), i),
            })
        })
        .collect();

    Mock::given(method("POST"))
        .and(path("/uploads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "uploadId": "u1",
                "chunkSize": chunk_size,
                "assetId": "asset-1",
                "uploadUrls": urls,
            }
        })))
        .mount(server)
        .await;
}

async fn mount_put_ok(server: &MockServer, index: u32) {
    Mock::given(method("PUT"))
        .and(path(format!("/chunk/{index}")))
        .respond_with(
            ResponseTemplate::new(200).insert_header("ETag", format!("\"etag-{index}\"").as_str()),
        )
        .mount(server)
        .await;
}

fn status_body(chunks: &[(u32, &str)], next_cursor: Option<&str>) -> serde_json::Value {
    let data: Vec<serde_json::Value> = chunks
        .iter()
        .map(|(i, s)| json!({ "index": i, "status": s }))
        .collect();
    match next_cursor {
        Some(c) => json!({ "data": data, "nextCursor": c }),
        None => json!({ "data": data }),
    }
}

fn temp_file_named(name: &str, data: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    (dir, path)
}

fn temp_file(data: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
    temp_file_named("video.mp4", data)
}

/// Staging directories under the OS temp dir whose name starts with `stem`.
fn staging_dirs_for(stem: &str) -> usize {
    let prefix = format!("{stem}_chunks_");
    std::fs::read_dir(std::env::temp_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .count()
}

async fn requests_to(server: &MockServer, method_name: &str, url_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.to_string() == method_name && r.url.path() == url_path)
        .count()
}

// ---------------------------------------------------------------------------
// upload_file
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_three_chunks_first_try_returns_final_asset_url() {
    let server = MockServer::start().await;
    mount_session(&server, 10, &[1, 2, 3]).await;
    for i in 1..=3 {
        mount_put_ok(&server, i).await;
    }
    Mock::given(method("POST"))
        .and(path("/uploads/u1/chunks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "url": "https://assets.clipindex.io/asset-1" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let data: Vec<u8> = (0..25u8).collect();
    let (_dir, file) = temp_file(&data);

    let result = client_for(&server)
        .upload_file(&file, Some(fast_opts()))
        .await
        .unwrap();
    assert_eq!(result.asset_id, "asset-1");
    assert_eq!(result.asset_url, "https://assets.clipindex.io/asset-1");

    // The uploaded bytes reached storage intact.
    let requests = server.received_requests().await.unwrap();
    let put_1 = requests
        .iter()
        .find(|r| r.method.to_string() == "PUT" && r.url.path() == "/chunk/1")
        .unwrap();
    assert_eq!(put_1.body, data[..10]);

    // The batch report carried every chunk's proof, camelCase on the wire,
    // with the ETag unquoted.
    let report = requests
        .iter()
        .find(|r| r.url.path() == "/uploads/u1/chunks")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&report.body).unwrap();
    let completed = body["completedChunks"].as_array().unwrap();
    assert_eq!(completed.len(), 3);
    assert_eq!(completed[0]["chunkIndex"], 1);
    assert_eq!(completed[0]["proof"], "etag-1");
    assert_eq!(completed[0]["proofType"], "etag");
    assert_eq!(completed[0]["chunkSize"], 10);
    assert_eq!(completed[2]["chunkSize"], 5);
}

#[tokio::test]
async fn chunk_failing_twice_is_retried_and_upload_succeeds() {
    let server = MockServer::start().await;
    mount_session(&server, 10, &[1, 2, 3]).await;
    mount_put_ok(&server, 1).await;
    mount_put_ok(&server, 3).await;

    // Chunk 2: two transient failures, then success. Mount order matters:
    // the failing mock is consumed first.
    Mock::given(method("PUT"))
        .and(path("/chunk/2"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_put_ok(&server, 2).await;

    Mock::given(method("POST"))
        .and(path("/uploads/u1/chunks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "url": "https://assets.clipindex.io/asset-1" }
        })))
        .mount(&server)
        .await;

    let (_dir, file) = temp_file(&[9u8; 25]);
    let result = client_for(&server)
        .upload_file(&file, Some(fast_opts()))
        .await
        .unwrap();
    assert_eq!(result.asset_id, "asset-1");

    assert_eq!(requests_to(&server, "PUT", "/chunk/2").await, 3);
}

#[tokio::test]
async fn chunk_exhausting_retries_fails_the_upload_with_its_index() {
    let server = MockServer::start().await;
    mount_session(&server, 10, &[1, 2, 3]).await;
    Mock::given(method("PUT"))
        .and(path("/chunk/1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_put_ok(&server, 2).await;
    mount_put_ok(&server, 3).await;

    // No batch may be reported when one of its chunks failed permanently.
    Mock::given(method("POST"))
        .and(path("/uploads/u1/chunks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
        .expect(0)
        .mount(&server)
        .await;

    let (_dir, file) = temp_file_named("retryfail.mp4", &[9u8; 25]);
    let opts = UploadFileOptions {
        max_retries: 1,
        ..fast_opts()
    };
    let err = client_for(&server)
        .upload_file(&file, Some(opts))
        .await
        .unwrap_err();

    match err {
        ClipIndexError::ChunkFailed {
            chunk_index,
            attempts,
            ..
        } => {
            assert_eq!(chunk_index, 1);
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(requests_to(&server, "PUT", "/chunk/1").await, 2);

    // Staged chunks are cleaned up even though the upload failed.
    assert_eq!(staging_dirs_for("retryfail"), 0);
}

#[tokio::test]
async fn url_window_grows_lazily_without_refetching_held_indices() {
    let server = MockServer::start().await;
    // 5 chunks, but the session only carries URLs for the first two.
    mount_session(&server, 10, &[1, 2]).await;
    for i in 1..=5 {
        mount_put_ok(&server, i).await;
    }

    Mock::given(method("GET"))
        .and(path("/uploads/u1/urls"))
        .and(query_param("start", "3"))
        .and(query_param("count", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "uploadUrls": [
                { "chunkIndex": 3, "url": format!("{}/chunk/3", server.uri()) },
                { "chunkIndex": 4, "url": format!("{}/chunk/4", server.uri()) },
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/uploads/u1/urls"))
        .and(query_param("start", "5"))
        .and(query_param("count", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "uploadUrls": [
                { "chunkIndex": 5, "url": format!("{}/chunk/5", server.uri()) },
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/uploads/u1/chunks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
        .expect(3)
        .mount(&server)
        .await;

    let (_dir, file) = temp_file(&[3u8; 50]);

    let progress = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&progress);
    let opts = UploadFileOptions {
        batch_size: 2,
        progress_callback: Some(Box::new(move |p| {
            seen.lock().unwrap().push((p.completed_chunks, p.percentage));
        })),
        ..fast_opts()
    };

    let result = client_for(&server)
        .upload_file(&file, Some(opts))
        .await
        .unwrap();
    // No batch report ever returned a final URL.
    assert_eq!(result.asset_id, "asset-1");
    assert_eq!(result.asset_url, "");

    let progress = progress.lock().unwrap();
    let counts: Vec<u32> = progress.iter().map(|(c, _)| *c).collect();
    assert_eq!(counts, vec![2, 4, 5]);
    assert!((progress[2].1 - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn final_asset_url_stops_the_upload_early() {
    let server = MockServer::start().await;
    mount_session(&server, 10, &[1, 2, 3]).await;
    mount_put_ok(&server, 1).await;

    // Remote asserts completion on the very first report.
    Mock::given(method("POST"))
        .and(path("/uploads/u1/chunks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "url": "https://assets.clipindex.io/early" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, file) = temp_file(&[1u8; 25]);
    let opts = UploadFileOptions {
        batch_size: 1,
        ..fast_opts()
    };
    let result = client_for(&server)
        .upload_file(&file, Some(opts))
        .await
        .unwrap();
    assert_eq!(result.asset_url, "https://assets.clipindex.io/early");

    // Chunks 2 and 3 were never uploaded.
    let puts = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.to_string() == "PUT")
        .count();
    assert_eq!(puts, 1);
}

#[tokio::test]
async fn buffer_source_uploads_with_its_registered_name() {
    let server = MockServer::start().await;
    mount_session(&server, 10, &[1, 2]).await;
    mount_put_ok(&server, 1).await;
    mount_put_ok(&server, 2).await;
    Mock::given(method("POST"))
        .and(path("/uploads/u1/chunks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "url": "https://assets.clipindex.io/asset-1" }
        })))
        .mount(&server)
        .await;

    let source = BufferSource::new(vec![5u8; 15]).with_name("clip.mp4");
    let result = client_for(&server)
        .upload_source(&source, Some(fast_opts()))
        .await
        .unwrap();
    assert_eq!(result.asset_id, "asset-1");

    let requests = server.received_requests().await.unwrap();
    let create = requests
        .iter()
        .find(|r| r.method.to_string() == "POST" && r.url.path() == "/uploads")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&create.body).unwrap();
    assert_eq!(body["filename"], "clip.mp4");
    assert_eq!(body["type"], "video");
    assert_eq!(body["totalSize"], 15);
}

#[tokio::test]
async fn cancelled_token_aborts_before_any_chunk_is_uploaded() {
    let server = MockServer::start().await;
    mount_session(&server, 10, &[1, 2, 3]).await;

    let token = CancellationToken::new();
    token.cancel();
    let opts = UploadFileOptions {
        cancel: Some(token),
        ..fast_opts()
    };

    let (_dir, file) = temp_file(&[1u8; 25]);
    let err = client_for(&server)
        .upload_file(&file, Some(opts))
        .await
        .unwrap_err();
    assert!(matches!(err, ClipIndexError::Cancelled));

    let puts = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.to_string() == "PUT")
        .count();
    assert_eq!(puts, 0);
}

#[tokio::test]
async fn empty_file_is_rejected_before_any_upload() {
    let server = MockServer::start().await;
    mount_session(&server, 10, &[]).await;

    let (_dir, file) = temp_file(&[]);
    let err = client_for(&server)
        .upload_file(&file, Some(fast_opts()))
        .await
        .unwrap_err();
    assert!(matches!(err, ClipIndexError::InvalidInput { .. }));
}

#[tokio::test]
async fn session_missing_chunk_size_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/uploads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "uploadId": "u1", "chunkSize": 0 }
        })))
        .mount(&server)
        .await;

    let (_dir, file) = temp_file(&[1u8; 25]);
    let err = client_for(&server)
        .upload_file(&file, Some(fast_opts()))
        .await
        .unwrap_err();
    assert!(matches!(err, ClipIndexError::InvalidInput { .. }));
}

// ---------------------------------------------------------------------------
// wait_for_upload_completion
// ---------------------------------------------------------------------------

fn fast_wait(max_wait: Option<Duration>) -> WaitForCompletionOptions {
    WaitForCompletionOptions {
        sleep_interval: Duration::from_millis(5),
        max_wait_time: max_wait,
        callback: None,
    }
}

#[tokio::test]
async fn wait_completes_after_second_poll_with_one_intermediate_callback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/uploads/u9/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(
            &[(1, "completed"), (2, "completed"), (3, "pending")],
            None,
        )))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/uploads/u9/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(
            &[(1, "completed"), (2, "completed"), (3, "completed")],
            None,
        )))
        .mount(&server)
        .await;

    let observed: Arc<Mutex<Vec<UploadStatus>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    let opts = WaitForCompletionOptions {
        callback: Some(Box::new(move |s| sink.lock().unwrap().push(s.clone()))),
        ..fast_wait(None)
    };

    let status = client_for(&server)
        .wait_for_upload_completion("u9", Some(opts))
        .await
        .unwrap();
    assert_eq!(status.status, "completed");
    assert_eq!(status.completed_chunks, 3);
    assert_eq!(status.total_chunks, 3);

    let observed = observed.lock().unwrap();
    assert_eq!(observed.len(), 1);
    assert_eq!(observed[0].status, "in_progress");
    assert_eq!(observed[0].completed_chunks, 2);

    assert_eq!(requests_to(&server, "GET", "/uploads/u9/status").await, 2);
}

#[tokio::test]
async fn wait_drains_every_status_page_per_poll() {
    let server = MockServer::start().await;
    // More specific mock first: the page fetched with a cursor.
    Mock::given(method("GET"))
        .and(path("/uploads/u9/status"))
        .and(query_param("cursor", "p2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(status_body(&[(3, "completed")], None)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/uploads/u9/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(
            &[(1, "completed"), (2, "completed")],
            Some("p2"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let status = client_for(&server)
        .wait_for_upload_completion("u9", Some(fast_wait(None)))
        .await
        .unwrap();
    assert_eq!(status.completed_chunks, 3);
    assert_eq!(status.total_chunks, 3);
}

#[tokio::test]
async fn cursor_with_reserved_characters_reaches_the_next_page() {
    let server = MockServer::start().await;
    // The cursor is an opaque token; reserved characters in it must survive
    // the round trip to the query string.
    Mock::given(method("GET"))
        .and(path("/uploads/u9/status"))
        .and(query_param("cursor", "p&2=x"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(status_body(&[(2, "completed")], None)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/uploads/u9/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(
            &[(1, "completed")],
            Some("p&2=x"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let status = client_for(&server)
        .wait_for_upload_completion("u9", Some(fast_wait(None)))
        .await
        .unwrap();
    assert_eq!(status.completed_chunks, 2);
    assert_eq!(status.total_chunks, 2);
}

#[tokio::test]
async fn remotely_failed_chunk_fails_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/uploads/u9/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(
            &[(1, "completed"), (2, "failed"), (3, "pending")],
            None,
        )))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .wait_for_upload_completion("u9", Some(fast_wait(Some(Duration::from_secs(60)))))
        .await
        .unwrap_err();
    match err {
        ClipIndexError::ChunkFailedRemotely { chunk_indices } => {
            assert_eq!(chunk_indices, vec![2]);
        }
        other => panic!("unexpected error: {other}"),
    }
    // No second poll: the failure is terminal.
    assert_eq!(requests_to(&server, "GET", "/uploads/u9/status").await, 1);
}

#[tokio::test]
async fn wait_times_out_when_chunks_stay_pending() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/uploads/u9/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(status_body(&[(1, "pending")], None)),
        )
        .mount(&server)
        .await;

    let max_wait = Duration::from_millis(25);
    let err = client_for(&server)
        .wait_for_upload_completion("u9", Some(fast_wait(Some(max_wait))))
        .await
        .unwrap_err();
    assert!(matches!(err, ClipIndexError::Timeout(d) if d == max_wait));
}

#[tokio::test]
async fn transient_status_error_is_retried_on_the_next_interval() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/uploads/u9/status"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/uploads/u9/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(status_body(&[(1, "completed")], None)),
        )
        .mount(&server)
        .await;

    let status = client_for(&server)
        .wait_for_upload_completion("u9", Some(fast_wait(None)))
        .await
        .unwrap();
    assert_eq!(status.status, "completed");
    assert_eq!(requests_to(&server, "GET", "/uploads/u9/status").await, 2);
}

#[tokio::test]
async fn zero_sleep_interval_is_rejected() {
    let server = MockServer::start().await;
    let opts = WaitForCompletionOptions {
        sleep_interval: Duration::ZERO,
        ..Default::default()
    };
    let err = client_for(&server)
        .wait_for_upload_completion("u9", Some(opts))
        .await
        .unwrap_err();
    assert!(matches!(err, ClipIndexError::InvalidInput { .. }));
}
