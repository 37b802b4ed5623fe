use std::sync::Arc;
use std::time::Instant;

use tokio::time::{sleep, Duration};

use network_log_sink::defaults::network_fields;
use network_log_sink::init::CoreConfig;
use network_log_sink::middleware::{HttpRequestContext, HttpResponseContext};
use network_log_sink::noop_sink::NoopSink;
use network_log_sink::{LoggingCore, Pipeline};

#[tokio::main]
async fn main() {
    let config = CoreConfig {
        channel_buffer: 200_000,
        batch_size: 1_000,
        ..CoreConfig::default()
    };
    let (core, _handle) = LoggingCore::new(Arc::new(NoopSink), &config);
    let core = Arc::new(core);
    let pipeline = Pipeline::new(network_fields(), Arc::clone(&core));

    let request = http::Request::builder()
        .uri("/load?run=1")
        .header("x-correlationid", "load-test")
        .body(())
        .unwrap();
    let response = http::Response::builder()
        .status(200)
        .header("content-length", "2")
        .body(String::from("ok"))
        .unwrap();
    let response = HttpResponseContext::from_response(&response);

    let n: u64 = 100_000;
    let start = Instant::now();

    for _ in 0..n {
        pipeline
            .begin(HttpRequestContext::from_request(&request))
            .complete(&response);
    }

    let elapsed = start.elapsed();
    println!(
        "resolved and dispatched {} network records in {:?} (~{:.0} rec/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    sleep(Duration::from_secs(2)).await;
    let stats = core.stats();
    println!(
        "enqueued={} dropped={} delivered={}",
        stats.enqueued(),
        stats.dropped(),
        stats.delivered()
    );
}
