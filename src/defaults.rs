//! The standard network field set.
//!
//! Field names follow the common request-log layout: `written_at`/
//! `written_ts` come from the core, everything else from the descriptors
//! below. The request side relies on the fields exposed by
//! [`HttpRequestContext`](crate::middleware::HttpRequestContext) and the
//! response side on [`HttpResponseContext`](crate::middleware::HttpResponseContext).

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::logger::CORRELATION_ID_FIELD;
use crate::descriptor::{FieldConfig, FieldDescriptor};

pub const REQUEST_RECEIVED_AT: &str = "request_received_at";
pub const RESPONSE_SENT_AT: &str = "response_sent_at";
pub const RESPONSE_TIME_MS: &str = "response_time_ms";

fn now() -> Option<Value> {
    Some(Value::from(
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    ))
}

fn non_empty(value: &Value) -> bool {
    value.as_str().is_some_and(|s| !s.is_empty())
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.as_str()?)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

pub fn network_fields() -> FieldConfig {
    let pre = vec![
        // A host without header access reads "" here, which must not count
        // as an id.
        FieldDescriptor::special(CORRELATION_ID_FIELD, |req, _, _| {
            ["x-correlationid", "x-vcap-request-id"]
                .into_iter()
                .find_map(|name| req.header(name).filter(non_empty))
                .or_else(|| Some(Value::from(Uuid::new_v4().to_string())))
        })
        .mandatory(),
        FieldDescriptor::header("request_id", "x-vcap-request-id")
            .mandatory()
            .with_default("-"),
        FieldDescriptor::static_value("type", "request"),
        FieldDescriptor::static_value("direction", "IN"),
        FieldDescriptor::request_field("request", "url"),
        FieldDescriptor::request_field("method", "method"),
        FieldDescriptor::request_field("protocol", "protocol"),
        FieldDescriptor::request_field("remote_ip", "remote_ip"),
        FieldDescriptor::request_field("remote_port", "remote_port"),
        FieldDescriptor::header("x_forwarded_for", "x-forwarded-for"),
        FieldDescriptor::header("referer", "referer")
            .mandatory()
            .with_default("-"),
        FieldDescriptor::static_value("remote_user", "-"),
        FieldDescriptor::request_field("request_size_b", "request_size_b")
            .mandatory()
            .with_default(-1),
        FieldDescriptor::time_pre(REQUEST_RECEIVED_AT, |_, _, _| now()),
    ];

    let post = vec![
        FieldDescriptor::response_field("response_status", "status_code")
            .mandatory()
            .with_default(-1),
        FieldDescriptor::response_field("response_size_b", "response_size_b")
            .mandatory()
            .with_default(-1),
        FieldDescriptor::header("response_content_type", "content-type")
            .mandatory()
            .with_default("-"),
        FieldDescriptor::time_post(RESPONSE_SENT_AT, |_, _, _| now()),
        FieldDescriptor::time_post(RESPONSE_TIME_MS, |_, _, rec| {
            let received = timestamp(rec.get(REQUEST_RECEIVED_AT)?)?;
            let sent = timestamp(rec.get(RESPONSE_SENT_AT)?)?;
            let micros = (sent - received).num_microseconds()?;
            Some(Value::from(micros as f64 / 1000.0))
        }),
    ];

    FieldConfig::new(pre, post)
}
