//! Shared helpers for integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use todo_api::config::Config;
use todo_api::http::{handlers, AppState};
use todo_api::storage::TaskStore;

pub fn init_test_logging() {
    todo_api::logging::init_test_logging();
}

/// A router wired to a fresh temp database, plus the dir guard keeping it
/// alive for the test's duration.
pub struct TestApp {
    pub router: Router,
    _dir: TempDir,
}

pub fn test_app() -> TestApp {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("tasks.db");
    // Startup path: migrations and index build happen before traffic.
    TaskStore::open(&db).unwrap();

    let config = Config::for_db(&db);
    let router = handlers::build_routes().into_router(AppState::new(config));
    TestApp {
        router,
        _dir: dir,
    }
}

/// Fire one request and return status plus parsed JSON body (or `Null` for
/// non-JSON bodies).
pub async fn request_json(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let request = match body {
        Some(json) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Fire one request with an explicit content type and return status,
/// response content type, and raw body text.
pub async fn request_raw(
    router: &Router,
    method: &str,
    uri: &str,
    content_type: Option<&str>,
    body: &str,
) -> (StatusCode, String, String) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(ct) = content_type {
        builder = builder.header("content-type", ct);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let response_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, response_type, String::from_utf8_lossy(&bytes).into_owned())
}

/// Create a task through the API and return its id.
pub async fn create_task(router: &Router, body: serde_json::Value) -> i64 {
    let (status, json) = request_json(router, "POST", "/tasks", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {json}");
    json["id"].as_i64().unwrap()
}
