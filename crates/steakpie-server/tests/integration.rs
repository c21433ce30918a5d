use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use http_body_util::BodyExt;
use steakpie_core::config::Config;
use steakpie_core::runner::{CommandRunner, RunResult};
use steakpie_core::store::EventStore;
use steakpie_server::signature::sign;
use steakpie_server::{build_router, AppState, Dispatcher, WEBHOOK_PATH};
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SECRET: &str = "test-secret";

const PUBLISHED: &str = include_str!("../../../testdata/registry_package_published.json");

const CONFIG: &str = r#"
hello-world:
  - docker compose pull
  - docker compose up -d
"#;

#[derive(Default)]
struct RecordingRunner {
    calls: Mutex<Vec<String>>,
}

impl RecordingRunner {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &str, _dir: &str) -> RunResult {
        self.calls.lock().unwrap().push(command.to_string());
        RunResult::success("")
    }
}

struct Harness {
    state: AppState,
    runner: Arc<RecordingRunner>,
    store: EventStore,
}

impl Harness {
    fn new() -> Self {
        Self::with_store(EventStore::open_in_memory().unwrap())
    }

    fn with_store(store: EventStore) -> Self {
        let runner = Arc::new(RecordingRunner::default());
        let config = Arc::new(Config::parse(CONFIG).unwrap());
        let dispatcher = Dispatcher::new(config, store.clone(), runner.clone());
        Self {
            state: AppState::new(SECRET, dispatcher),
            runner,
            store,
        }
    }

    fn app(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Runs happen in the background; poll until `n` commands were seen.
    async fn wait_for_calls(&self, n: usize) -> Vec<String> {
        for _ in 0..200 {
            let calls = self.runner.calls();
            if calls.len() >= n {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.runner.calls()
    }

    /// Give any stray background run a chance to show up.
    async fn settle(&self) -> Vec<String> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.runner.calls()
    }
}

/// A delivery as GitHub sends it: signed JSON with a delivery ID.
fn delivery(body: &str, delivery_id: Option<&str>) -> axum::http::Request<axum::body::Body> {
    let mut req = axum::http::Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header("content-type", "application/json")
        .header("x-github-event", "registry_package")
        .header("x-hub-signature-256", sign(body.as_bytes(), SECRET.as_bytes()));
    if let Some(id) = delivery_id {
        req = req.header("x-github-delivery", id);
    }
    req.body(axum::body::Body::from(body.to_string())).unwrap()
}

async fn send(
    app: axum::Router,
    req: axum::http::Request<axum::body::Body>,
) -> (StatusCode, String) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&body).into_owned())
}

fn published_with_digest(digest: &str) -> String {
    let mut value: serde_json::Value = serde_json::from_str(PUBLISHED).unwrap();
    value["registry_package"]["package_version"]["container_metadata"]["tag"]["digest"] =
        serde_json::Value::String(digest.to_string());
    value.to_string()
}

// ---------------------------------------------------------------------------
// Accepted deliveries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valid_delivery_runs_commands() {
    let h = Harness::new();
    let (status, _) = send(h.app(), delivery(PUBLISHED, Some("del-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        h.wait_for_calls(2).await,
        vec!["docker compose pull", "docker compose up -d"]
    );
    assert_eq!(h.store.count().unwrap(), 1);
}

#[tokio::test]
async fn ping_is_acknowledged_without_running() {
    let h = Harness::new();
    let body = r#"{"zen": "Keep it logically awesome.", "hook_id": 42}"#;
    let (status, _) = send(h.app(), delivery(body, Some("ping-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(h.settle().await.is_empty());
    assert_eq!(h.store.count().unwrap(), 0);
}

#[tokio::test]
async fn repeated_pings_are_not_deduplicated() {
    let h = Harness::new();
    let body = r#"{"zen": "Half measures are as bad as nothing at all."}"#;
    for _ in 0..3 {
        let (status, _) = send(h.app(), delivery(body, Some("ping-1"))).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(h.store.count().unwrap(), 0);
}

#[tokio::test]
async fn unconfigured_package_is_ok() {
    let h = Harness::new();
    let mut value: serde_json::Value = serde_json::from_str(PUBLISHED).unwrap();
    value["registry_package"]["name"] = "not-configured".into();
    let body = value.to_string();

    let (status, _) = send(h.app(), delivery(&body, Some("del-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.settle().await.is_empty());
}

#[tokio::test]
async fn missing_fields_are_accepted() {
    let h = Harness::new();
    let (status, _) = send(h.app(), delivery(r#"{"action": "published"}"#, Some("del-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(h.settle().await.is_empty());
}

// ---------------------------------------------------------------------------
// Idempotency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn redelivery_runs_once() {
    let h = Harness::new();

    let (first, _) = send(h.app(), delivery(PUBLISHED, Some("del-1"))).await;
    h.wait_for_calls(2).await;
    let (second, _) = send(h.app(), delivery(PUBLISHED, Some("del-2"))).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(h.settle().await.len(), 2);
    assert_eq!(h.store.count().unwrap(), 1);
}

#[tokio::test]
async fn different_events_both_run() {
    let h = Harness::new();

    send(h.app(), delivery(&published_with_digest("sha256:aaaa"), Some("del-1"))).await;
    send(h.app(), delivery(&published_with_digest("sha256:bbbb"), Some("del-2"))).await;

    assert_eq!(h.wait_for_calls(4).await.len(), 4);
    assert_eq!(h.store.count().unwrap(), 2);
}

#[tokio::test]
async fn missing_delivery_id_processes_every_time() {
    let h = Harness::new();

    let (a, _) = send(h.app(), delivery(PUBLISHED, None)).await;
    let (b, _) = send(h.app(), delivery(PUBLISHED, None)).await;

    assert_eq!(a, StatusCode::OK);
    assert_eq!(b, StatusCode::OK);
    assert_eq!(h.wait_for_calls(4).await.len(), 4);
    assert_eq!(h.store.count().unwrap(), 0);
}

#[tokio::test]
async fn dedup_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.sqlite");

    let first = Harness::with_store(EventStore::open(&path).unwrap());
    send(first.app(), delivery(PUBLISHED, Some("del-1"))).await;
    first.wait_for_calls(2).await;
    drop(first);

    let second = Harness::with_store(EventStore::open(&path).unwrap());
    let (status, _) = send(second.app(), delivery(PUBLISHED, Some("del-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(second.settle().await.is_empty());
}

#[tokio::test]
async fn minimal_events_for_different_packages_are_not_duplicates() {
    let h = Harness::new();
    let (a, _) = send(h.app(), delivery(r#"{"registry_package": {"name": "hello-world"}}"#, Some("del-a"))).await;
    let (b, _) = send(h.app(), delivery(r#"{"registry_package": {"name": "other"}}"#, Some("del-b"))).await;

    assert_eq!(a, StatusCode::OK);
    assert_eq!(b, StatusCode::OK);
    assert_eq!(h.store.count().unwrap(), 2);
    assert_eq!(h.wait_for_calls(2).await.len(), 2);
}

// ---------------------------------------------------------------------------
// Storage failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_failure_is_internal_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.sqlite");
    let h = Harness::with_store(EventStore::open(&path).unwrap());

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch("DROP TABLE events").unwrap();
    drop(conn);

    let (status, body) = send(h.app(), delivery(PUBLISHED, Some("del-1"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "internal server error");
    assert!(h.settle().await.is_empty());
}

// ---------------------------------------------------------------------------
// Rejected deliveries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_signature_is_forbidden() {
    let h = Harness::new();
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(PUBLISHED))
        .unwrap();

    let (status, _) = send(h.app(), req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(h.settle().await.is_empty());
}

#[tokio::test]
async fn wrong_signature_is_forbidden() {
    let h = Harness::new();
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header("content-type", "application/json")
        .header("x-hub-signature-256", sign(PUBLISHED.as_bytes(), b"wrong-secret"))
        .header("x-github-delivery", "del-1")
        .body(axum::body::Body::from(PUBLISHED))
        .unwrap();

    let (status, _) = send(h.app(), req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(h.store.count().unwrap(), 0);
}

#[tokio::test]
async fn invalid_json_is_bad_request() {
    let h = Harness::new();
    let (status, body) = send(h.app(), delivery("{not json", Some("del-1"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("invalid JSON"), "{body}");
}

#[tokio::test]
async fn empty_body_is_bad_request() {
    let h = Harness::new();
    let (status, _) = send(h.app(), delivery("", Some("del-1"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_shape_is_bad_request() {
    let h = Harness::new();
    let (status, _) = send(h.app(), delivery(r#"{"action": 7}"#, Some("del-1"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.store.count().unwrap(), 0);
}

#[tokio::test]
async fn form_encoded_is_unsupported() {
    let h = Harness::new();
    let body = "payload=%7B%7D";
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-hub-signature-256", sign(body.as_bytes(), SECRET.as_bytes()))
        .body(axum::body::Body::from(body))
        .unwrap();

    let (status, text) = send(h.app(), req).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(text.contains("application/json"), "{text}");
}

#[tokio::test]
async fn other_methods_are_not_allowed() {
    let h = Harness::new();
    for method in ["GET", "PUT", "DELETE", "PATCH"] {
        let req = axum::http::Request::builder()
            .method(method)
            .uri(WEBHOOK_PATH)
            .body(axum::body::Body::empty())
            .unwrap();
        let (status, _) = send(h.app(), req).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method}");
    }
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let h = Harness::new();
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/version/2")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = send(h.app(), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
