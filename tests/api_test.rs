use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde_json::Value;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

use multimat::api::{AppState, router};
use multimat::config::{Config, HumanDuration};
use multimat::convert::{Converter, EncodeError, FormatEncoder, FormatTag, ImageEncoder};
use multimat::observability::Metrics;
use multimat::retention::{ExpiryLedger, RetentionScheduler};
use multimat::storage::UploadStore;

const BOUNDARY: &str = "multimat-test-boundary";

/// Returns fixed bytes for every format except those listed in `fail`
struct StubEncoder {
    fail: Vec<FormatTag>,
}

#[async_trait]
impl FormatEncoder for StubEncoder {
    async fn encode(&self, _source: &Path, format: FormatTag) -> Result<Bytes, EncodeError> {
        if self.fail.contains(&format) {
            return Err(EncodeError::Encoder {
                format,
                reason: "stub failure".into(),
            });
        }
        Ok(Bytes::from(format!("{format} bytes")))
    }
}

struct TestApp {
    router: Router,
    temp_dir: TempDir,
}

impl TestApp {
    fn upload_dir(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("uploads")
    }

    /// File names currently in the upload directory
    fn stored_files(&self) -> Vec<String> {
        match std::fs::read_dir(self.upload_dir()) {
            Ok(entries) => entries
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Bytes) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }
}

fn create_test_config(temp_dir: &TempDir, retention: HumanDuration) -> Config {
    let mut config = Config::default();
    config.storage.upload_dir = temp_dir.path().join("uploads");
    config.storage.ledger_path = temp_dir.path().join("retention");
    config.retention.delay = retention;
    // Fastest AVIF preset keeps debug builds quick
    config.conversion.avif_speed = 10;
    config
}

/// Builds a test app with isolated storage, optionally swapping the encoder
fn build_test_app(retention: HumanDuration, encoder: Option<Arc<dyn FormatEncoder>>) -> TestApp {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&temp_dir, retention);

    let store = UploadStore::new(
        config.storage.upload_dir.clone(),
        config.server.public_base_url.clone(),
    );
    let encoder =
        encoder.unwrap_or_else(|| Arc::new(ImageEncoder::from_config(&config.conversion)));
    let converter = Converter::new(
        encoder,
        store.clone(),
        config.conversion.encode_timeout.as_duration(),
    );

    let metrics = Arc::new(Metrics::new());
    let ledger = ExpiryLedger::open(&config.storage.ledger_path).expect("Failed to open ledger");
    let retention = RetentionScheduler::new(ledger, Arc::clone(&metrics));

    let state = AppState::new(config, store, converter, retention, metrics);

    TestApp {
        router: router(state),
        temp_dir,
    }
}

fn stub_app(fail: Vec<FormatTag>) -> TestApp {
    build_test_app(HumanDuration::from_secs(3600), Some(Arc::new(StubEncoder { fail })))
}

fn sample_png() -> Vec<u8> {
    let img = RgbaImage::from_fn(32, 24, |x, y| {
        Rgba([(x * 8) as u8, (y * 10) as u8, 200, if x < 16 { 255 } else { 128 }])
    });
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

fn multipart_request(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn upload_request(filename: &str, data: &[u8]) -> Request<Body> {
    multipart_request("image", filename, "image/png", data)
}

fn json(body: &Bytes) -> Value {
    serde_json::from_slice(body).expect("Response body is not JSON")
}

/// Every public path named in an upload response
fn response_paths(body: &Value) -> Vec<String> {
    let mut paths = vec![body["original"].as_str().unwrap().to_string()];
    for entry in body["formats"].as_object().unwrap().values() {
        paths.push(entry["path"].as_str().unwrap().to_string());
    }
    paths
}

#[tokio::test]
async fn test_upload_converts_to_every_format() {
    let app = build_test_app(HumanDuration::from_secs(3600), None);

    let (status, body) = app.send(upload_request("cat.png", &sample_png())).await;
    assert_eq!(status, StatusCode::OK, "body: {}", String::from_utf8_lossy(&body));

    let body = json(&body);
    let original = body["original"].as_str().unwrap();
    assert!(original.starts_with("/uploads/cat-"), "{original}");
    assert!(original.ends_with(".png"), "{original}");
    assert!(body.get("failed").is_none());

    let formats = body["formats"].as_object().unwrap();
    assert_eq!(formats.len(), 4);
    for ext in ["jpeg", "png", "webp", "avif"] {
        let entry = &formats[ext];
        let path = entry["path"].as_str().unwrap();
        assert!(path.starts_with("/uploads/cat-"), "{path}");
        assert!(path.ends_with(&format!("-converted.{ext}")), "{path}");
        assert!(entry["sizeInBytes"].as_u64().unwrap() > 0);
    }

    // Original and artifacts share one stem
    let stem = original.trim_end_matches(".png");
    for entry in formats.values() {
        assert!(entry["path"].as_str().unwrap().starts_with(stem));
    }
}

#[tokio::test]
async fn test_artifacts_are_served_at_their_paths() {
    let app = build_test_app(HumanDuration::from_secs(3600), None);

    let (status, body) = app.send(upload_request("dog.png", &sample_png())).await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);

    for (ext, entry) in body["formats"].as_object().unwrap() {
        let path = entry["path"].as_str().unwrap();
        let (status, bytes) = app.get(path).await;
        assert_eq!(status, StatusCode::OK, "{path}");
        assert_eq!(bytes.len() as u64, entry["sizeInBytes"].as_u64().unwrap(), "{ext}");
    }

    let (status, bytes) = app.get(body["original"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes.as_ref(), sample_png().as_slice());
}

#[tokio::test]
async fn test_download_sends_attachment() {
    let app = stub_app(vec![]);

    let (status, body) = app.send(upload_request("cat.png", &sample_png())).await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);

    let jpeg_path = body["formats"]["jpeg"]["path"].as_str().unwrap();
    let file_name = jpeg_path.trim_start_matches("/uploads/");

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/download/{file_name}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{file_name}\"").as_str()
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), b"jpeg bytes");
}

#[tokio::test]
async fn test_partial_failure_reports_failed_formats() {
    let app = stub_app(vec![FormatTag::Avif]);

    let (status, body) = app.send(upload_request("cat.png", &sample_png())).await;
    assert_eq!(status, StatusCode::OK);

    let body = json(&body);
    let formats = body["formats"].as_object().unwrap();
    assert_eq!(formats.len(), 3);
    assert!(formats.get("avif").is_none());
    assert!(body["failed"]["avif"].as_str().unwrap().contains("stub failure"));

    // Only files that exist are listed, and no avif artifact is left behind
    for path in response_paths(&body) {
        let (status, _) = app.get(&path).await;
        assert_eq!(status, StatusCode::OK, "{path}");
    }
    assert!(!app.stored_files().iter().any(|name| name.ends_with(".avif")));
}

#[tokio::test]
async fn test_total_failure_removes_original() {
    let app = build_test_app(HumanDuration::from_secs(3600), None);

    let (status, body) = app.send(upload_request("broken.png", b"not really a png")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(&body)["code"], "CONVERSION_FAILED");

    assert!(app.stored_files().is_empty(), "left behind: {:?}", app.stored_files());
}

#[tokio::test]
async fn test_missing_image_returns_400() {
    let app = stub_app(vec![]);

    let (status, body) = app
        .send(multipart_request("document", "cat.png", "image/png", &sample_png()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json(&body);
    assert_eq!(body["code"], "INVALID_PAYLOAD");
    assert_eq!(body["message"], "No image uploaded.");
    assert!(app.stored_files().is_empty());
}

#[tokio::test]
async fn test_empty_image_returns_400() {
    let app = stub_app(vec![]);

    let (status, _) = app.send(upload_request("cat.png", b"")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.stored_files().is_empty());
}

#[tokio::test]
async fn test_non_multipart_body_returns_400() {
    let app = stub_app(vec![]);

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_upload_returns_413() {
    let app = stub_app(vec![]);

    let data = vec![0u8; 11 * 1024 * 1024];
    let (status, body) = app.send(upload_request("huge.png", &data)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json(&body)["code"], "PAYLOAD_TOO_LARGE");

    assert!(app.stored_files().is_empty());
}

#[tokio::test]
async fn test_download_rejects_traversal() {
    let app = stub_app(vec![]);

    for uri in [
        "/download/..%2F..%2Fetc%2Fpasswd",
        "/download/%2E%2E",
        "/uploads/..%2Fretention",
        "/download/a%5Cb.png",
    ] {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json(&body)["code"], "INVALID_FILENAME");
    }
}

#[tokio::test]
async fn test_download_missing_file_returns_404() {
    let app = stub_app(vec![]);

    let (status, body) = app.get("/download/nothing-here.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["code"], "NOT_FOUND");

    let (status, _) = app.get("/uploads/nothing-here.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_uploads_get_distinct_names() {
    let app = stub_app(vec![]);
    let png = sample_png();

    let (first, second) = tokio::join!(
        app.send(upload_request("same.png", &png)),
        app.send(upload_request("same.png", &png)),
    );
    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);

    let first = json(&first.1);
    let second = json(&second.1);
    assert_ne!(first["original"], second["original"]);

    // 2 originals + 4 artifacts each
    assert_eq!(app.stored_files().len(), 10);
}

#[tokio::test]
async fn test_files_expire_after_retention_delay() {
    let app = build_test_app(
        HumanDuration::from_millis(200),
        Some(Arc::new(StubEncoder { fail: vec![] })),
    );

    let (status, body) = app.send(upload_request("cat.png", &sample_png())).await;
    assert_eq!(status, StatusCode::OK);
    let paths = response_paths(&json(&body));
    assert_eq!(paths.len(), 5);

    // Still present before the delay elapses
    let (status, _) = app.get(&paths[0]).await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(1000)).await;

    for path in &paths {
        let (status, _) = app.get(path).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
    }
    assert!(app.stored_files().is_empty());

    let (_, health) = app.get("/health").await;
    assert_eq!(json(&health)["pending_expiries"], 0);
}

#[tokio::test]
async fn test_index_message() {
    let app = stub_app(vec![]);

    let (status, body) = app.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["message"], "Welcome to the Image Multimat API");
}

#[tokio::test]
async fn test_health_reports_components() {
    let app = stub_app(vec![]);
    std::fs::create_dir_all(app.upload_dir()).unwrap();

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);

    let body = json(&body);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["storage"], "healthy");
    assert_eq!(body["components"]["retention"], "healthy");
    assert_eq!(body["pending_expiries"], 0);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_health_counts_pending_expiries() {
    let app = stub_app(vec![]);

    let (status, _) = app.send(upload_request("cat.png", &sample_png())).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get("/health").await;
    let body = json(&body);
    assert_eq!(body["pending_expiries"], 1);
    assert_eq!(body["metrics"]["uploads_accepted"], 1);
    assert_eq!(body["metrics"]["artifacts_produced"], 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_request_leaves_no_untracked_files() {
    let app = stub_app(vec![]);
    let png = sample_png();

    // Abandon uploads at different points of their lifetime
    for micros in [0u64, 50, 200, 500, 1_000, 2_000, 5_000, 20_000] {
        let request = upload_request("cat.png", &png);
        let _ = tokio::time::timeout(
            Duration::from_micros(micros),
            app.router.clone().oneshot(request),
        )
        .await;
    }

    // Detached work finishes on its own
    tokio::time::sleep(Duration::from_millis(500)).await;

    let files = app.stored_files();
    assert!(!files.iter().any(|name| name.ends_with(".part")), "{files:?}");

    // Whatever reached the disk belongs to a batch awaiting deletion
    let (_, health) = app.get("/health").await;
    let pending = json(&health)["pending_expiries"].as_u64().unwrap() as usize;
    assert_eq!(files.len(), pending * 5, "{files:?}");
}

#[tokio::test]
async fn test_download_rejects_control_characters() {
    let app = stub_app(vec![]);

    for uri in ["/download/cat%0A.png", "/download/cat%0D%0AX-Injected:%201.png", "/uploads/cat%09.png"] {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json(&body)["code"], "INVALID_FILENAME");
    }
}
