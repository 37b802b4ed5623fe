use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Extension;
use axum::routing::get;
use axum::{middleware, Router};
use serde_json::json;
use tracing::info;

use network_log_sink::console::ConsoleSink;
use network_log_sink::defaults::network_fields;
use network_log_sink::init::init_with_config;
use network_log_sink::middleware::log_network;
use network_log_sink::{Pipeline, RequestLogger};

async fn hello(Extension(logger): Extension<RequestLogger>) -> &'static str {
    // Tagged with the request's correlation id by the span the middleware enters.
    info!(target: "demo", "saying hello");
    logger.log_message(tracing::Level::INFO, "hello handler done", [("route", json!("/"))]);
    "hello\n"
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = network_log_sink::init::CoreConfig::from_env()?;
    let (core, worker) = init_with_config(Arc::new(ConsoleSink), config)?;
    core.override_field("component_name", Some("axum-demo".into()));

    let pipeline = Pipeline::new(network_fields(), Arc::clone(&core));
    let app = Router::new()
        .route("/", get(hello))
        .layer(middleware::from_fn_with_state(pipeline, log_network));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    info!(target: "demo", "listening on http://127.0.0.1:3000");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    core.shutdown();
    worker.await?;
    Ok(())
}
