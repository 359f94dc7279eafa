//! Router tests driven through `tower::ServiceExt::oneshot`

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use dashsync_core::{MockFetcher, RawDatasetParser, SyncConfig, SyncService, Validators};
use dashsync_server::router;
use dashsync_server::routes::{MAX_SESSION_ID_LEN, Service};

const PAYLOAD: &[u8] = b"Match ID,Map,Win Lose\n1,Busan,Win\n";

fn make_service(fetcher: Arc<MockFetcher>, secret: Option<&str>) -> Arc<Service> {
    let mut config = SyncConfig::with_source("https://files.example.com/stats.xlsx");
    if let Some(secret) = secret {
        config = config.with_refresh_secret(secret);
    }
    Arc::new(SyncService::new(config, fetcher, RawDatasetParser))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_raw(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap()
}

async fn online(app: &Router) -> u64 {
    let (status, _, body) = send(app, get("/presence")).await;
    assert_eq!(status, StatusCode::OK);
    json(&body)["online"].as_u64().unwrap()
}

#[tokio::test]
async fn test_heartbeat_counts_distinct_sessions() {
    let app = router(make_service(Arc::new(MockFetcher::new()), None));
    assert_eq!(online(&app).await, 0);

    let (status, _, body) =
        send(&app, post_json("/presence/heartbeat", r#"{"session_id":"tab-a"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["online"], 1);

    send(&app, post_json("/presence/heartbeat", r#"{"session_id":"tab-a"}"#)).await;
    let (_, _, body) =
        send(&app, post_json("/presence/heartbeat", r#"{"session_id":"tab-b"}"#)).await;
    assert_eq!(json(&body)["online"], 2);
    assert_eq!(online(&app).await, 2);
}

#[tokio::test]
async fn test_disconnect_accepts_json_and_bare_text() {
    let app = router(make_service(Arc::new(MockFetcher::new()), None));
    for id in ["tab-a", "tab-b", "tab-c"] {
        let body = format!(r#"{{"session_id":"{}"}}"#, id);
        send(&app, post_json("/presence/heartbeat", &body)).await;
    }
    assert_eq!(online(&app).await, 3);

    let (status, _, _) =
        send(&app, post_json("/presence/disconnect", r#"{"session_id":"tab-a"}"#)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Beacon without a content type
    let (status, _, _) = send(&app, post_raw("/presence/disconnect", "tab-b\n")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = send(&app, post_raw("/presence/disconnect", r#""tab-c""#)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(online(&app).await, 0);

    // Unknown sessions are not an error
    let (status, _, _) = send(&app, post_raw("/presence/disconnect", "never-seen")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_invalid_session_ids_are_rejected() {
    let app = router(make_service(Arc::new(MockFetcher::new()), None));

    let (status, _, body) =
        send(&app, post_json("/presence/heartbeat", r#"{"session_id":"  "}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["ok"], false);

    let long = "x".repeat(MAX_SESSION_ID_LEN + 1);
    let (status, _, _) = send(
        &app,
        post_json("/presence/heartbeat", &format!(r#"{{"session_id":"{}"}}"#, long)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(&app, post_raw("/presence/disconnect", "")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(online(&app).await, 0);
}

#[tokio::test]
async fn test_refresh_webhook_requires_token() {
    let fetcher = Arc::new(MockFetcher::new());
    fetcher.push_payload(PAYLOAD, Validators::with_etag("\"v1\""));
    let service = make_service(fetcher.clone(), Some("s3cret"));
    let app = router(service.clone());

    let (status, _, body) = send(&app, post_raw("/refresh-data", "")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json(&body), serde_json::json!({"ok": false, "error": "unauthorized"}));

    let wrong = Request::builder()
        .method("POST")
        .uri("/refresh-data")
        .header("X-Refresh-Token", "guess")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fetcher.calls(), 0);
    assert!(service.cache().is_empty());

    let (status, _, body) = send(&app, post_raw("/refresh-data?token=s3cret", "")).await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["ok"], true);
    assert_eq!(body["accepted"], true);
    assert!(body["timestamp"].is_string());

    for _ in 0..100 {
        if service.cache().version() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(service.cache().version(), 1);
    assert_eq!(fetcher.seen_validators(), vec![None]);
}

#[tokio::test]
async fn test_refresh_webhook_header_token() {
    let service = make_service(Arc::new(MockFetcher::new()), Some("s3cret"));
    let app = router(service);

    let request = Request::builder()
        .method("POST")
        .uri("/refresh-data?token=wrong")
        .header("X-Refresh-Token", "s3cret")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_webhook_disabled_without_secret() {
    let fetcher = Arc::new(MockFetcher::new());
    let app = router(make_service(fetcher.clone(), None));

    let (status, _, _) = send(&app, post_raw("/refresh-data?token=anything", "")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_dataset_endpoint() {
    let fetcher = Arc::new(MockFetcher::new());
    fetcher.push_payload(PAYLOAD, Validators::with_etag("\"v1\""));
    let service = make_service(fetcher, None);
    let app = router(service.clone());

    let (status, _, body) = send(&app, get("/dataset")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    service.coordinator().refresh_now().await;

    let (status, headers, body) = send(&app, get("/dataset")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], PAYLOAD);
    let etag = headers[header::ETAG].to_str().unwrap().to_string();
    let snapshot = service.cache().read().unwrap();
    assert_eq!(etag, format!("\"{}\"", snapshot.fingerprint().to_hex()));

    let conditional = Request::builder()
        .uri("/dataset")
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, conditional).await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_status_reports_snapshot_and_refresh_state() {
    let fetcher = Arc::new(MockFetcher::new());
    fetcher.push_payload(PAYLOAD, Validators::with_etag("\"v1\""));
    let service = make_service(fetcher, Some("s3cret"));
    let app = router(service.clone());

    let (status, _, body) = send(&app, get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert!(body["snapshot"].is_null());
    assert!(body["refresh"]["last_success"].is_null());
    assert_eq!(body["webhook_enabled"], true);

    service.coordinator().refresh_now().await;

    let (_, _, body) = send(&app, get("/status")).await;
    let body = json(&body);
    assert_eq!(body["snapshot"]["version"], 1);
    assert_eq!(body["snapshot"]["validators"]["etag"], "\"v1\"");
    assert_eq!(body["snapshot"]["payload_len"], PAYLOAD.len());
    assert!(body["refresh"]["last_success"].is_string());
    assert_eq!(body["refresh"]["in_progress"], false);
    assert_eq!(body["refresh"]["consecutive_failures"], 0);
}
