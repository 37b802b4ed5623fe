use std::sync::Arc;

use serde_json::{json, Value};
use tokio::time::{sleep, Duration};

use network_log_sink::console::ConsoleSink;
use network_log_sink::context::EmptyContext;
use network_log_sink::init::CoreConfig;
use network_log_sink::middleware::{HttpRequestContext, HttpResponseContext};
use network_log_sink::{FieldConfig, FieldDescriptor, LoggingCore, Pipeline};

#[tokio::main]
async fn main() {
    let config = CoreConfig {
        pattern: Some("{{method}} {{path}} -> {{status}} tenant={{tenant}} ({{tenant_source}})".into()),
        enable_stdout: false,
        ..CoreConfig::default()
    };
    let (core, handle) = LoggingCore::new(Arc::new(ConsoleSink), &config);

    let fields = FieldConfig::default()
        .with_pre(FieldDescriptor::request_field("method", "method"))
        .with_pre(FieldDescriptor::request_field("path", "path"))
        .with_pre(
            FieldDescriptor::header("tenant", "x-tenant")
                .mandatory()
                .with_fallback(|req, _, _| req.field("tenant")),
        )
        .with_post(FieldDescriptor::special("tenant_source", |_, _, rec| {
            Some(Value::from(if rec.is_resolved("tenant") { "resolved" } else { "none" }))
        }))
        .with_post(FieldDescriptor::response_field("status", "status_code").mandatory().with_default(-1));

    let pipeline = Pipeline::new(fields, Arc::new(core));

    let request = http::Request::builder()
        .uri("/reports")
        .header("x-tenant", "acme")
        .body(())
        .unwrap();
    let response = http::Response::builder().status(200).body(String::new()).unwrap();
    pipeline
        .begin(HttpRequestContext::from_request(&request))
        .complete(&HttpResponseContext::from_response(&response));

    let request = http::Request::builder().uri("/health").body(()).unwrap();
    let context = HttpRequestContext::from_request(&request).with_field("tenant", json!("internal"));
    pipeline.begin(context).complete(&EmptyContext);

    // Dropping the pipeline closes the channel; the dispatcher drains and exits.
    drop(pipeline);
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    sleep(Duration::from_millis(50)).await;
}
