//! Axum middleware producing one network record per request.
//!
//! ```ignore
//! use axum::{middleware, routing::get, Router};
//! use network_log_sink::{defaults::network_fields, middleware::log_network, pipeline::Pipeline};
//!
//! let pipeline = Pipeline::new(network_fields(), core);
//! let app = Router::new()
//!     .route("/", get(|| async { "hello" }))
//!     .layer(middleware::from_fn_with_state(pipeline, log_network));
//! ```

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use http::{header, HeaderMap, Method, StatusCode, Uri, Version};
use http_body::{Frame, SizeHint};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tracing::{debug, Instrument};

use crate::context::{HeaderAccess, HostContext};
use crate::pipeline::{PendingExchange, Pipeline};
use crate::record::LogRecord;

/// The pre-pass record, stored in the request extensions for handlers.
#[derive(Debug, Clone)]
pub struct RequestRecord(pub LogRecord);

/// Request side of an HTTP exchange.
///
/// Fields: `method`, `url`, `path`, `query`, `protocol`, `remote_ip`,
/// `remote_port`, `request_size_b`, plus anything added with
/// [`with_field`](Self::with_field).
#[derive(Debug, Clone)]
pub struct HttpRequestContext {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    custom: BTreeMap<String, Value>,
}

impl HttpRequestContext {
    /// Snapshot of `request`. The remote address is taken from axum's
    /// `ConnectInfo<SocketAddr>` extension when the server provides it.
    pub fn from_request<B>(request: &http::Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
            remote_addr: request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
            custom: BTreeMap::new(),
        }
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(name.into(), value.into());
        self
    }
}

impl HostContext for HttpRequestContext {
    fn headers(&self) -> Option<&dyn HeaderAccess> {
        Some(&self.headers)
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "method" => Some(Value::from(self.method.as_str())),
            "url" => Some(Value::from(self.uri.to_string())),
            "path" => Some(Value::from(self.uri.path())),
            "query" => self.uri.query().map(Value::from),
            "protocol" => Some(Value::from(format!("{:?}", self.version))),
            "remote_ip" => self.remote_addr.map(|addr| Value::from(addr.ip().to_string())),
            "remote_port" => self.remote_addr.map(|addr| Value::from(addr.port())),
            "request_size_b" => content_length(&self.headers),
            other => self.custom.get(other).cloned(),
        }
    }
}

/// Response side of an HTTP exchange.
///
/// Fields: `status_code`, `protocol`, `response_size_b`, `content_type`,
/// plus anything added with [`with_field`](Self::with_field).
#[derive(Debug, Clone)]
pub struct HttpResponseContext {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    size: Option<u64>,
    custom: BTreeMap<String, Value>,
}

impl HttpResponseContext {
    /// Snapshot of `response`. The size comes from `content-length`, or
    /// from the body when its length is known up front.
    pub fn from_response<B: HttpBody>(response: &http::Response<B>) -> Self {
        let size = content_length(response.headers())
            .and_then(|v| v.as_u64())
            .or_else(|| response.body().size_hint().exact());

        Self {
            status: response.status(),
            version: response.version(),
            headers: response.headers().clone(),
            size,
            custom: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(name.into(), value.into());
        self
    }
}

impl HostContext for HttpResponseContext {
    fn headers(&self) -> Option<&dyn HeaderAccess> {
        Some(&self.headers)
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "status_code" => Some(Value::from(self.status.as_u16())),
            "protocol" => Some(Value::from(format!("{:?}", self.version))),
            "response_size_b" => self.size.map(Value::from),
            "content_type" => self.headers.header(header::CONTENT_TYPE.as_str()).map(Value::from),
            other => self.custom.get(other).cloned(),
        }
    }
}

fn content_length(headers: &HeaderMap) -> Option<Value> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Value::from)
}

/// Middleware logging network activity through `pipeline`.
///
/// Runs the pre pass, exposes the record ([`RequestRecord`]) and a
/// [`RequestLogger`](crate::logger::RequestLogger) to downstream handlers and
/// always runs the next handler. The response body is then wrapped in a
/// [`CompletionBody`], which runs the post pass and emits the record once the
/// last byte has been handed to the server. If the handler or the body never
/// completes, nothing is emitted.
pub async fn log_network(State(pipeline): State<Pipeline>, mut request: Request, next: Next) -> Response {
    let exchange = pipeline.begin(HttpRequestContext::from_request(&request));
    let logger = exchange.bind();

    request
        .extensions_mut()
        .insert(RequestRecord(exchange.record().clone()));
    request.extensions_mut().insert(logger.clone());

    let response = next.run(request).instrument(logger.span()).await;

    let context = HttpResponseContext::from_response(&response);
    response.map(|body| Body::new(CompletionBody::new(body, exchange, context)))
}

/// Response body that completes its exchange at end of stream.
///
/// The bytes actually yielded replace any announced size in
/// `response_size_b`. A body dropped before its end (client gone, body
/// error) leaves the exchange unfinished.
pub struct CompletionBody {
    inner: Body,
    sent: u64,
    pending: Option<(PendingExchange<HttpRequestContext>, HttpResponseContext)>,
}

impl CompletionBody {
    pub fn new(
        inner: Body,
        exchange: PendingExchange<HttpRequestContext>,
        response: HttpResponseContext,
    ) -> Self {
        Self {
            inner,
            sent: 0,
            pending: Some((exchange, response)),
        }
    }

    fn complete(&mut self) {
        if let Some((exchange, mut response)) = self.pending.take() {
            response.size = Some(self.sent);
            exchange.complete(&response);
        }
    }
}

impl HttpBody for CompletionBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);

        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.sent += data.len() as u64;
                }
                // Servers stop polling once a body reports its end.
                if this.inner.is_end_stream() {
                    this.complete();
                }
            }
            Poll::Ready(None) => this.complete(),
            Poll::Ready(Some(Err(e))) => {
                debug!(error = %e, "response body failed, network record dropped");
                this.pending = None;
            }
            Poll::Pending => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CompletionBody {
    fn drop(&mut self) {
        // An empty body may never be polled at all.
        if self.pending.is_some() {
            if self.inner.is_end_stream() {
                self.complete();
            } else {
                debug!(sent = self.sent, "response body dropped before its end, network record dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextView;
    use serde_json::json;

    #[test]
    fn request_fields_come_from_the_request() {
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/orders?limit=5")
            .header("content-length", "42")
            .body(())
            .unwrap();
        let context = HttpRequestContext::from_request(&request)
            .with_remote_addr("10.0.0.7:5151".parse().unwrap())
            .with_field("tenant", "acme");
        let view = ContextView::new(&context);

        assert_eq!(view.field("method"), Some(json!("POST")));
        assert_eq!(view.field("url"), Some(json!("/orders?limit=5")));
        assert_eq!(view.field("path"), Some(json!("/orders")));
        assert_eq!(view.field("query"), Some(json!("limit=5")));
        assert_eq!(view.field("protocol"), Some(json!("HTTP/1.1")));
        assert_eq!(view.field("remote_ip"), Some(json!("10.0.0.7")));
        assert_eq!(view.field("remote_port"), Some(json!(5151)));
        assert_eq!(view.field("request_size_b"), Some(json!(42)));
        assert_eq!(view.field("tenant"), Some(json!("acme")));
        assert_eq!(view.header("content-length"), Some(json!("42")));
    }

    #[test]
    fn response_size_falls_back_to_body_length() {
        let response = http::Response::builder()
            .status(StatusCode::CREATED)
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{\"id\":1}"))
            .unwrap();
        let context = HttpResponseContext::from_response(&response);
        let view = ContextView::new(&context);

        assert_eq!(view.field("status_code"), Some(json!(201)));
        assert_eq!(view.field("response_size_b"), Some(json!(8)));
        assert_eq!(view.field("content_type"), Some(json!("application/json")));
    }
}
