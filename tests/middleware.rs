//! The axum middleware wired into a router.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::Extension;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Router};
use network_log_sink::defaults::network_fields;
use network_log_sink::init::CoreConfig;
use network_log_sink::memory_sink::MemorySink;
use network_log_sink::middleware::{log_network, RequestRecord};
use network_log_sink::record::EmittedRecord;
use network_log_sink::{LoggingCore, Pipeline, RequestLogger};
use futures_util::stream;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{timeout, Duration};
use tower::ServiceExt;

async fn stream_greeting() -> Body {
    Body::from_stream(stream::iter([
        Ok::<_, std::io::Error>("hello "),
        Ok("world"),
    ]))
}

async fn create_item(
    Extension(logger): Extension<RequestLogger>,
    Extension(record): Extension<RequestRecord>,
) -> impl IntoResponse {
    logger.log_message(
        tracing::Level::INFO,
        "creating item",
        [("method_seen", record.0.get("method").cloned().unwrap_or_default())],
    );
    (
        StatusCode::CREATED,
        [("content-type", "application/json")],
        "{\"id\":1}",
    )
}

fn app() -> (Router, UnboundedReceiver<EmittedRecord>) {
    let (sink, rx) = MemorySink::new();
    let config = CoreConfig {
        batch_size: 1,
        flush_interval: Duration::from_millis(10),
        enable_stdout: false,
        ..CoreConfig::default()
    };
    let (core, _handle) = LoggingCore::new(Arc::new(sink), &config);
    let pipeline = Pipeline::new(network_fields(), Arc::new(core));

    let router = Router::new()
        .route("/items", get(create_item))
        .route("/greeting", get(stream_greeting))
        .layer(middleware::from_fn_with_state(pipeline, log_network));
    (router, rx)
}

async fn next_record(rx: &mut UnboundedReceiver<EmittedRecord>) -> EmittedRecord {
    timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn request_produces_message_and_network_records() {
    let (app, mut rx) = app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/items?page=2")
                .header("x-correlationid", "corr-42")
                .header("referer", "https://example.test/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let message = next_record(&mut rx).await;
    assert_eq!(message.get("type"), Some(&json!("log")));
    assert_eq!(message.get("msg"), Some(&json!("creating item")));
    assert_eq!(message.get("method_seen"), Some(&json!("GET")));
    assert_eq!(message.get("correlation_id"), Some(&json!("corr-42")));

    let network = next_record(&mut rx).await;
    assert_eq!(network.level, "info");
    assert_eq!(network.get("type"), Some(&json!("request")));
    assert_eq!(network.get("correlation_id"), Some(&json!("corr-42")));
    assert_eq!(network.get("request"), Some(&json!("/items?page=2")));
    assert_eq!(network.get("referer"), Some(&json!("https://example.test/")));
    assert_eq!(network.get("response_status"), Some(&json!(201)));
    assert_eq!(network.get("response_size_b"), Some(&json!(8)));
    assert_eq!(network.get("response_content_type"), Some(&json!("application/json")));
    assert!(network.get("response_time_ms").is_some_and(|v| v.is_f64()));
}

#[tokio::test]
async fn unmatched_route_is_still_logged() {
    let (app, mut rx) = app();

    let response = app
        .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let network = next_record(&mut rx).await;
    assert_eq!(network.get("response_status"), Some(&json!(404)));
    assert_eq!(network.get("request_id"), Some(&json!("-")));
    assert!(network.get("correlation_id").and_then(|v| v.as_str()).is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn streamed_body_is_logged_once_fully_sent() {
    let (app, mut rx) = app();

    let response = app
        .oneshot(Request::builder().uri("/greeting").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = response.into_body();

    // Nothing is emitted while the body is still pending.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"hello world");

    let network = next_record(&mut rx).await;
    assert_eq!(network.get("response_status"), Some(&json!(200)));
    assert_eq!(network.get("response_size_b"), Some(&json!(11)));
}

#[tokio::test]
async fn abandoned_body_is_not_logged() {
    let (app, mut rx) = app();

    let response = app
        .oneshot(Request::builder().uri("/greeting").body(Body::empty()).unwrap())
        .await
        .unwrap();
    drop(response);

    // Dropping the body releases the last handle on the core, so the channel
    // may close instead of timing out; either way no record arrives.
    let received = timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(received.ok().flatten().is_none());
}
