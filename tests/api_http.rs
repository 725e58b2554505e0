// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use feed_relay_bot::api::{self, AppState, ALREADY_RUNNING_TEXT, STARTED_TEXT, STATUS_TEXT};
use feed_relay_bot::feed::StaticFeed;
use feed_relay_bot::filter::CategoryFilter;
use feed_relay_bot::notify::TelegramNotifier;
use feed_relay_bot::{PollSettings, Poller};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

const BODY_LIMIT: usize = 1024 * 1024;

/// Router over a poller that never reaches the network: empty feed, long interval.
fn test_router() -> Router {
    let poller = Poller::new(
        Arc::new(StaticFeed::new("<rss><channel></channel></rss>")),
        Arc::new(TelegramNotifier::new("http://127.0.0.1:9", None)),
        CategoryFilter::new(["AI"]),
        PollSettings {
            destination: "1".into(),
            poll_interval: Duration::from_secs(3600),
            send_delay: Duration::ZERO,
            error_backoff: Duration::from_secs(3600),
        },
    );
    api::router(AppState::new(poller))
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v: Json = serde_json::from_slice(&bytes).expect("json body");
    (status, v)
}

#[tokio::test]
async fn root_reports_liveness() {
    let app = test_router();
    let (status, v) = call(&app, "GET", "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["message"], STATUS_TEXT);
}

#[tokio::test]
async fn start_spawns_once_and_returns_immediately() {
    let app = test_router();

    let (status, v) = call(&app, "GET", "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["running"], false);
    assert_eq!(v["phase"], "idle");
    assert!(v["watermark"].is_null());

    let (status, v) = call(&app, "POST", "/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["message"], STARTED_TEXT);

    let (status, v) = call(&app, "POST", "/start").await;
    assert_eq!(status, StatusCode::OK, "repeat start is still 200");
    assert_eq!(v["message"], ALREADY_RUNNING_TEXT);

    let (_, v) = call(&app, "GET", "/status").await;
    assert_eq!(v["running"], true);
}

#[tokio::test]
async fn start_requires_post() {
    let app = test_router();
    let req = Request::builder()
        .method("GET")
        .uri("/start")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}
