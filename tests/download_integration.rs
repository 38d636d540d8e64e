//! Integration tests for the download flow.
//!
//! Each test spins up an Axum server on a random port that plays the role of
//! the public bucket, then downloads from it into a temp directory.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::time::timeout;

use sonar_zarr::config::DownloadConfig;
use sonar_zarr::error::{Error, FlowError};
use sonar_zarr::flow::download_raw_data;
use sonar_zarr::runner::RetryPolicy;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const PREFIX: &str = "data/raw/Henry_B._Bigelow/HB1907/EK60";

#[derive(Default)]
struct Bucket {
    files: HashMap<String, Vec<u8>>,
    /// Requests for `flaky.raw` answered with 503 before it succeeds.
    flaky_failures: usize,
    flaky_requests: AtomicUsize,
    missing_requests: AtomicUsize,
}

async fn serve_file(
    State(bucket): State<Arc<Bucket>>,
    Path(file): Path<String>,
) -> Response {
    if file == "flaky.raw" {
        let n = bucket.flaky_requests.fetch_add(1, Ordering::SeqCst);
        if n < bucket.flaky_failures {
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }
    if file == "truncated.raw" {
        // Some bytes, then the connection breaks.
        let parts: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"partial echo data")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        return Body::from_stream(futures::stream::iter(parts)).into_response();
    }
    match bucket.files.get(&file) {
        Some(bytes) => (StatusCode::OK, bytes.clone()).into_response(),
        None => {
            bucket.missing_requests.fetch_add(1, Ordering::SeqCst);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Start an Axum server on a random port, return its base URL.
async fn start_server(bucket: Arc<Bucket>) -> String {
    let app = Router::new()
        .route(&format!("/{PREFIX}/{{file}}"), get(serve_file))
        .with_state(bucket);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://127.0.0.1:{port}")
}

fn config(base_url: String, dest: &std::path::Path, files: &[&str]) -> DownloadConfig {
    DownloadConfig {
        dest_dir: dest.to_path_buf(),
        bucket_url: base_url,
        prefix: PREFIX.to_string(),
        filenames: files.iter().map(|s| s.to_string()).collect(),
        workers: 2,
        retry: RetryPolicy::new(3, Duration::from_millis(10)),
    }
}

#[tokio::test]
async fn downloads_all_files() {
    timeout(TEST_TIMEOUT, async {
        let mut bucket = Bucket::default();
        for i in 0..5 {
            bucket
                .files
                .insert(format!("D{i}.raw"), vec![i as u8; 4096 * (i + 1)]);
        }
        let base = start_server(Arc::new(bucket)).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("raw_data");
        let names = ["D0.raw", "D1.raw", "D2.raw", "D3.raw", "D4.raw"];

        let paths = download_raw_data(&config(base, &dest, &names)).await.unwrap();

        assert_eq!(paths.len(), 5);
        for (i, name) in names.iter().enumerate() {
            assert_eq!(paths[i], dest.join(name));
            let bytes = std::fs::read(dest.join(name)).unwrap();
            assert_eq!(bytes, vec![i as u8; 4096 * (i + 1)]);
        }
        // No partial files left behind.
        let leftovers = std::fs::read_dir(&dest)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".part")
            })
            .count();
        assert_eq!(leftovers, 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn server_errors_are_retried() {
    timeout(TEST_TIMEOUT, async {
        let mut bucket = Bucket {
            flaky_failures: 2,
            ..Bucket::default()
        };
        bucket.files.insert("flaky.raw".to_string(), b"echo".to_vec());
        let bucket = Arc::new(bucket);
        let base = start_server(Arc::clone(&bucket)).await;
        let dir = tempfile::tempdir().unwrap();

        let paths = download_raw_data(&config(base, dir.path(), &["flaky.raw"]))
            .await
            .unwrap();

        assert_eq!(std::fs::read(&paths[0]).unwrap(), b"echo");
        assert_eq!(bucket.flaky_requests.load(Ordering::SeqCst), 3);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn missing_file_fails_without_retry_and_spares_siblings() {
    timeout(TEST_TIMEOUT, async {
        let mut bucket = Bucket::default();
        bucket.files.insert("a.raw".to_string(), b"a".to_vec());
        bucket.files.insert("c.raw".to_string(), b"c".to_vec());
        let bucket = Arc::new(bucket);
        let base = start_server(Arc::clone(&bucket)).await;
        let dir = tempfile::tempdir().unwrap();

        let err = download_raw_data(&config(base, dir.path(), &["a.raw", "b.raw", "c.raw"]))
            .await
            .unwrap_err();

        match err {
            Error::Flow(FlowError::TasksFailed {
                failed,
                total,
                summary,
            }) => {
                assert_eq!(failed, 1);
                assert_eq!(total, 3);
                assert!(summary.contains("download-file-b.raw"), "{summary}");
                assert!(summary.contains("404"), "{summary}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(bucket.missing_requests.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("a.raw").is_file());
        assert!(dir.path().join("c.raw").is_file());
        assert!(!dir.path().join("b.raw").exists());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn broken_transfer_leaves_no_partial_file() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server(Arc::new(Bucket::default())).await;
        let dir = tempfile::tempdir().unwrap();

        let err = download_raw_data(&config(base, dir.path(), &["truncated.raw"]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Flow(FlowError::TasksFailed { failed: 1, .. })));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    })
    .await
    .expect("test timed out");
}
