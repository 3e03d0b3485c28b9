// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end tests for acquisition and framework install against a local
//! HTTP server and file:// sources.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        Response, StatusCode,
    },
    routing::{get, MethodRouter},
    serve, Router,
};
use futures_util::StreamExt;
use tempfile::TempDir;
use tokio::net::TcpListener;
use url::Url;
use zip::write::SimpleFileOptions;

use pipcook::fetch::{
    progress_channel, FetchEngine, FetchError, Source, TransferEvent, TransferId, TransferUpdate,
};
use pipcook::framework::{FrameworkError, FrameworkInstaller};
use pipcook::locator::FrameworkLocator;
use pipcook::runtime::RuntimeInfo;

const CSV: &[u8] = b"label,pixels\n1,0 0 0 1\n";

fn runtime() -> RuntimeInfo {
    RuntimeInfo::new("3.9.7", "16.14.0", 8, "linux", "x64")
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn framework_zip(descriptor: &str) -> Vec<u8> {
    zip_bytes(&[
        ("framework.json", descriptor.as_bytes()),
        ("site-packages/tensorflow/__init__.py", b"# tf"),
        ("node_modules/@tensorflow/tfjs/index.js", b"module.exports = {}"),
    ])
}

fn dataset_zip() -> Vec<u8> {
    zip_bytes(&[("train/a.csv", CSV), ("test/b.csv", CSV)])
}

fn file_url(path: &Path) -> String {
    Url::from_file_path(path).unwrap().to_string()
}

fn scratch_entries(scratch: &Path) -> usize {
    std::fs::read_dir(scratch).map(|d| d.count()).unwrap_or(0)
}

// =============================================================================
// Test HTTP server
// =============================================================================

fn serve_bytes(body: Vec<u8>) -> MethodRouter {
    get(move || {
        let body = body.clone();
        async move {
            Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "application/octet-stream")
                .header(CONTENT_LENGTH, body.len())
                .body(Body::from(body))
                .unwrap()
        }
    })
}

/// Sends a first chunk, then fails the body stream.
fn serve_broken() -> MethodRouter {
    get(|| async {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"partial data")),
            Err(std::io::Error::other("stream aborted")),
        ];
        Body::from_stream(futures_util::stream::iter(chunks))
    })
}

struct TestHttpServer {
    base: Url,
}

impl TestHttpServer {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = Url::parse(&format!("http://{addr}/")).unwrap();

        let router = Router::new()
            .route("/datasets/mnist.zip", serve_bytes(dataset_zip()))
            .route("/datasets/train.csv", serve_bytes(CSV.to_vec()))
            .route("/datasets/broken.csv", serve_broken())
            .route("/datasets/broken.zip", serve_broken())
            .route("/datasets/garbage.zip", serve_bytes(b"this is not a zip".to_vec()))
            .route(
                "/fw/node16-py39/tfjs-linux-x64-v8.zip",
                serve_bytes(framework_zip(
                    r#"{ "name": "tfjs", "version": "3.8.0", "platform": "linux", "arch": "x64", "napiVersion": 8 }"#,
                )),
            )
            .route(
                "/fw/node16-py39/onnx-linux-x64-v8.zip",
                serve_bytes(framework_zip(
                    r#"{ "name": "onnx", "version": "1.0.0", "nodeVersion": "^18" }"#,
                )),
            );

        let server = serve(listener, router);
        tokio::spawn(async move {
            let _ = server.await;
        });

        Self { base }
    }

    fn url(&self, path: &str) -> String {
        self.base.join(path).unwrap().to_string()
    }
}

// =============================================================================
// HTTP sources
// =============================================================================

#[tokio::test]
async fn test_http_zip_is_extracted_and_scratch_cleaned() {
    let server = TestHttpServer::spawn().await;
    let dir = TempDir::new().unwrap();
    let scratch = dir.path().join("scratch");
    let target = dir.path().join("data").join("mnist");

    let engine = FetchEngine::new(&scratch);
    let source = engine
        .acquire(&server.url("datasets/mnist.zip"), &target)
        .await
        .unwrap();

    assert!(matches!(source, Source::RemoteArchive(_)));
    assert_eq!(std::fs::read(target.join("train/a.csv")).unwrap(), CSV);
    assert_eq!(std::fs::read(target.join("test/b.csv")).unwrap(), CSV);
    assert_eq!(scratch_entries(&scratch), 0);
}

#[tokio::test]
async fn test_http_file_is_written_to_target_path() {
    let server = TestHttpServer::spawn().await;
    let dir = TempDir::new().unwrap();
    let scratch = dir.path().join("scratch");
    let target = dir.path().join("raw").join("train.csv");

    let engine = FetchEngine::new(&scratch);
    let source = engine
        .acquire(&server.url("datasets/train.csv"), &target)
        .await
        .unwrap();

    assert!(matches!(source, Source::RemoteFile(_)));
    assert_eq!(std::fs::read(&target).unwrap(), CSV);
    assert_eq!(scratch_entries(&scratch), 0);
}

#[tokio::test]
async fn test_http_broken_stream_removes_partial_file() {
    let server = TestHttpServer::spawn().await;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("broken.csv");

    let err = FetchEngine::new(dir.path().join("scratch"))
        .acquire(&server.url("datasets/broken.csv"), &target)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Transfer { .. }), "got {err:?}");
    assert!(!target.exists());
}

#[tokio::test]
async fn test_http_broken_zip_leaves_no_scratch_file() {
    let server = TestHttpServer::spawn().await;
    let dir = TempDir::new().unwrap();
    let scratch = dir.path().join("scratch");
    let target = dir.path().join("out");

    let err = FetchEngine::new(&scratch)
        .acquire(&server.url("datasets/broken.zip"), &target)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Transfer { .. }), "got {err:?}");
    assert_eq!(scratch_entries(&scratch), 0);
    assert!(!target.exists());
}

#[tokio::test]
async fn test_http_invalid_zip_is_extract_error() {
    let server = TestHttpServer::spawn().await;
    let dir = TempDir::new().unwrap();
    let scratch = dir.path().join("scratch");

    let err = FetchEngine::new(&scratch)
        .acquire(&server.url("datasets/garbage.zip"), &dir.path().join("out"))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Extract(_)), "got {err:?}");
    assert_eq!(scratch_entries(&scratch), 0);
}

#[tokio::test]
async fn test_http_not_found_is_status_error() {
    let server = TestHttpServer::spawn().await;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("missing.csv");

    let err = FetchEngine::new(dir.path().join("scratch"))
        .acquire(&server.url("datasets/missing.csv"), &target)
        .await
        .unwrap_err();

    match err {
        FetchError::HttpStatus { status, .. } => assert_eq!(status.as_u16(), 404),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!target.exists());
}

#[tokio::test]
async fn test_concurrent_acquires_share_scratch_dir() {
    let server = TestHttpServer::spawn().await;
    let dir = TempDir::new().unwrap();
    let scratch = dir.path().join("scratch");
    let engine = FetchEngine::new(&scratch);
    let url = server.url("datasets/mnist.zip");

    let targets: Vec<_> = (0..4).map(|i| dir.path().join(format!("copy-{i}"))).collect();
    let results = futures_util::future::join_all(
        targets.iter().map(|target| engine.acquire(&url, target)),
    )
    .await;

    for (result, target) in results.into_iter().zip(&targets) {
        result.unwrap();
        assert_eq!(std::fs::read(target.join("train/a.csv")).unwrap(), CSV);
    }
    assert_eq!(scratch_entries(&scratch), 0);
}

#[tokio::test]
async fn test_progress_events_are_ordered() {
    let server = TestHttpServer::spawn().await;
    let dir = TempDir::new().unwrap();
    let (reporter, events) = progress_channel();

    let engine = FetchEngine::new(dir.path().join("scratch")).with_progress(Arc::new(reporter));
    engine
        .acquire(&server.url("datasets/train.csv"), &dir.path().join("train.csv"))
        .await
        .unwrap();
    drop(engine);

    let events: Vec<TransferEvent> = events.map(|u| u.event).collect().await;
    let total = CSV.len() as u64;
    assert_eq!(events.first(), Some(&TransferEvent::Started { total: Some(total) }));
    assert_eq!(events.last(), Some(&TransferEvent::Finished { received: total }));
    assert!(events[1..events.len() - 1]
        .iter()
        .all(|e| matches!(e, TransferEvent::Progress { .. })));
}

#[tokio::test]
async fn test_progress_reports_failure() {
    let server = TestHttpServer::spawn().await;
    let dir = TempDir::new().unwrap();
    let (reporter, events) = progress_channel();

    let engine = FetchEngine::new(dir.path().join("scratch")).with_progress(Arc::new(reporter));
    engine
        .acquire(&server.url("datasets/broken.csv"), &dir.path().join("broken.csv"))
        .await
        .unwrap_err();
    drop(engine);

    let events: Vec<TransferEvent> = events.map(|u| u.event).collect().await;
    assert!(matches!(events.last(), Some(TransferEvent::Failed { .. })));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_concurrent_progress_is_attributed_per_download() {
    let server = TestHttpServer::spawn().await;
    let dir = TempDir::new().unwrap();
    let (reporter, updates) = progress_channel();

    let engine = FetchEngine::new(dir.path().join("scratch")).with_progress(Arc::new(reporter));
    let url = server.url("datasets/train.csv");
    let dest_a = dir.path().join("a.csv");
    let dest_b = dir.path().join("b.csv");
    let (first, second) = tokio::join!(
        engine.acquire(&url, &dest_a),
        engine.acquire(&url, &dest_b),
    );
    first.unwrap();
    second.unwrap();
    drop(engine);

    let updates: Vec<TransferUpdate> = updates.collect().await;
    let mut per_download: BTreeMap<TransferId, Vec<TransferEvent>> = BTreeMap::new();
    for update in updates {
        per_download.entry(update.id).or_default().push(update.event);
    }

    let total = CSV.len() as u64;
    assert_eq!(per_download.len(), 2);
    for events in per_download.values() {
        assert_eq!(events.first(), Some(&TransferEvent::Started { total: Some(total) }));
        assert_eq!(events.last(), Some(&TransferEvent::Finished { received: total }));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }
}

// =============================================================================
// file:// and rejected sources
// =============================================================================

#[tokio::test]
async fn test_file_zip_is_extracted() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("mnist.zip");
    std::fs::write(&archive, dataset_zip()).unwrap();
    let target = dir.path().join("out");

    let source = FetchEngine::new(dir.path().join("scratch"))
        .acquire(&file_url(&archive), &target)
        .await
        .unwrap();

    assert!(matches!(source, Source::LocalArchive(_)));
    assert_eq!(std::fs::read(target.join("test/b.csv")).unwrap(), CSV);
    assert!(archive.is_file());
}

#[tokio::test]
async fn test_file_directory_is_copied() {
    let dir = TempDir::new().unwrap();
    let source_dir = dir.path().join("dataset");
    std::fs::create_dir_all(source_dir.join("train")).unwrap();
    std::fs::write(source_dir.join("train/a.csv"), CSV).unwrap();
    let target = dir.path().join("copy");

    let source = FetchEngine::new(dir.path().join("scratch"))
        .acquire(&file_url(&source_dir), &target)
        .await
        .unwrap();

    assert!(matches!(source, Source::LocalPath(_)));
    assert_eq!(std::fs::read(target.join("train/a.csv")).unwrap(), CSV);
}

#[tokio::test]
async fn test_unsupported_scheme_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let scratch = dir.path().join("scratch");
    let target = dir.path().join("out");

    let err = FetchEngine::new(&scratch)
        .acquire("ftp://example.com/mnist.zip", &target)
        .await
        .unwrap_err();

    assert!(err.is_invalid_source());
    assert!(!target.exists());
    assert!(!scratch.exists());
}

// =============================================================================
// Framework install through the mirror
// =============================================================================

#[tokio::test]
async fn test_install_from_mirror() {
    let server = TestHttpServer::spawn().await;
    let dir = TempDir::new().unwrap();
    let scratch = dir.path().join("scratch");
    let target = dir.path().join("frameworks").join("tfjs");

    let installer = FrameworkInstaller::new(
        FrameworkLocator::parse(&server.url("fw/")).unwrap(),
        FetchEngine::new(&scratch),
        runtime(),
    );
    let framework = installer.install("tfjs", &target).await.unwrap();

    assert_eq!(framework.name, "tfjs");
    assert_eq!(framework.version, "3.8.0");
    assert_eq!(framework.path, target);
    assert!(framework.python_package_dir().join("tensorflow/__init__.py").is_file());
    assert!(framework.js_package_dir().join("@tensorflow/tfjs/index.js").is_file());
    assert_eq!(scratch_entries(&scratch), 0);
}

#[tokio::test]
async fn test_install_incompatible_from_mirror() {
    let server = TestHttpServer::spawn().await;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("onnx");

    let installer = FrameworkInstaller::new(
        FrameworkLocator::parse(&server.url("fw/")).unwrap(),
        FetchEngine::new(dir.path().join("scratch")),
        runtime(),
    );
    let err = installer.install("onnx", &target).await.unwrap_err();

    assert!(matches!(err, FrameworkError::Incompatible { .. }), "got {err:?}");
    assert!(target.join("framework.json").is_file());
}

#[tokio::test]
async fn test_install_unknown_framework() {
    let server = TestHttpServer::spawn().await;
    let dir = TempDir::new().unwrap();

    let installer = FrameworkInstaller::new(
        FrameworkLocator::parse(&server.url("fw/")).unwrap(),
        FetchEngine::new(dir.path().join("scratch")),
        runtime(),
    );
    let err = installer
        .install("does-not-exist", &dir.path().join("fw"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FrameworkError::Fetch(FetchError::HttpStatus { .. })
    ));
}
