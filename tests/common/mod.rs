#![allow(dead_code)]

use axum::{body::Body, http::Response, Router};
use serde_json::Value;
use std::net::SocketAddr;
use tempfile::TempDir;
use violation_reporter::{config::Settings, create_router, AppState};

pub const BOUNDARY: &str = "----reporter-test-boundary";

/// Router plus the temp directory backing its upload storage.
pub struct TestApp {
    pub router: Router,
    pub settings: Settings,
    _storage: TempDir,
}

/// Settings pointing at a fresh storage directory with no external dependencies.
pub fn test_settings(storage: &TempDir) -> Settings {
    let mut settings =
        Settings::new_with_env_file(false).expect("Failed to create test config");
    settings.upload_storage_path = storage.path().join("uploads").to_string_lossy().to_string();
    settings.public_base_url = "http://reporter.test".to_string();
    settings.cors_allow_origins = vec!["*".to_string()];
    settings.api_keys = Vec::new();
    settings.rate_limit_enabled = false;
    // Nothing listens on the discard port, so geocoding falls back quickly
    settings.geocoding_url = "http://127.0.0.1:9/reverse".to_string();
    settings.http_timeout_seconds = 2.0;
    settings
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(|_| {})
}

pub fn create_test_app_with(configure: impl FnOnce(&mut Settings)) -> TestApp {
    let storage = TempDir::new().expect("temp dir");
    let mut settings = test_settings(&storage);
    configure(&mut settings);

    let app_state = AppState::new(settings.clone()).expect("Failed to create test app state");
    TestApp {
        router: create_router(app_state),
        settings,
        _storage: storage,
    }
}

/// Serve the router on an ephemeral port; returns the base URL.
pub async fn spawn_server(configure: impl FnOnce(&mut Settings)) -> (String, TempDir) {
    let storage = TempDir::new().expect("temp dir");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr: SocketAddr = listener.local_addr().expect("local addr");
    let base_url = format!("http://{}", addr);

    let mut settings = test_settings(&storage);
    settings.public_base_url = base_url.clone();
    settings.api_base_url = base_url.clone();
    configure(&mut settings);

    let app = create_router(AppState::new(settings).expect("app state"));
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .expect("server");
    });

    (base_url, storage)
}

pub async fn extract_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Multipart body with a single `file` field.
pub fn multipart_file(content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"file\"; filename=\"evidence\"\r\n");
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

pub fn jpeg_bytes() -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.extend_from_slice(&[0u8; 64]);
    data
}

pub fn webm_bytes() -> Vec<u8> {
    let mut data = vec![0x1A, 0x45, 0xDF, 0xA3];
    data.extend_from_slice(b"webm-cluster-data");
    data
}
