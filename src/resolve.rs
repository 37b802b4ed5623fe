//! Field resolution: one ordered sweep over a descriptor list.
//!
//! A pass runs in three steps:
//!
//! 1. every descriptor is resolved in list order and written to the record,
//!    with mandatory-field defaulting right after each write; fallbacks and
//!    self-references are queued instead of evaluated;
//! 2. queued fallbacks run as one batch against the record as it stood when
//!    the batch began, then their results are written;
//! 3. queued self-references copy the live record, so they see the values
//!    fallbacks and defaults produced.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info};

use crate::context::ContextView;
use crate::descriptor::{FieldDescriptor, FieldFn, Source};
use crate::record::LogRecord;

/// Which side of the exchange a pass runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Request arrival.
    Pre,
    /// Response completion.
    Post,
}

/// Outcome of resolving a descriptor's primary source.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Store this value; `None` clears the field.
    Write(Option<Value>),
    /// Leave the record untouched.
    Skip,
}

/// Resolve the primary source of `descriptor` without touching the record.
pub fn resolve_source(
    descriptor: &FieldDescriptor,
    phase: Phase,
    request: &ContextView<'_>,
    response: &ContextView<'_>,
    record: &LogRecord,
) -> Resolution {
    match (&descriptor.source, phase) {
        (Source::Header(name), Phase::Pre) => Resolution::Write(request.header(name)),
        (Source::Header(name), Phase::Post) => Resolution::Write(response.header(name)),
        (Source::Static(value), Phase::Pre) => Resolution::Write(Some(value.clone())),
        (Source::Static(_), Phase::Post) => Resolution::Skip,
        (Source::RequestField(name), _) => Resolution::Write(request.field(name)),
        (Source::ResponseField(name), _) => Resolution::Write(response.field(name)),
        (Source::TimeComputed { pre, .. }, Phase::Pre) => Resolution::Write(match pre {
            Some(f) => f.call(request, response, record),
            None => Some(Value::from(-1)),
        }),
        (Source::TimeComputed { post, .. }, Phase::Post) => match post {
            Some(f) => Resolution::Write(f.call(request, response, record)),
            None => Resolution::Skip,
        },
        (Source::SelfReference(_) | Source::Special, _) => Resolution::Skip,
    }
}

/// Supply a value for a mandatory field that is still unresolved.
///
/// A static default is written straight away; otherwise the fallback is
/// queued under the field's name, replacing any earlier entry for it.
pub fn apply_defaults<'c>(
    descriptor: &'c FieldDescriptor,
    record: &mut LogRecord,
    fallbacks: &mut IndexMap<&'c str, &'c FieldFn>,
) {
    if !descriptor.mandatory || record.is_resolved(&descriptor.name) {
        return;
    }

    if let Some(default) = &descriptor.default {
        record.set(descriptor.name.as_str(), Some(default.clone()));
        return;
    }

    match &descriptor.fallback {
        Some(fallback) => {
            info!(field = %descriptor.name, "falling back for mandatory field");
            fallbacks.insert(descriptor.name.as_str(), fallback);
        }
        None => {
            debug!(field = %descriptor.name, "mandatory field has no value, default or fallback");
        }
    }
}

/// One resolution sweep over an ordered descriptor list.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionPass<'c> {
    phase: Phase,
    descriptors: &'c [FieldDescriptor],
}

impl<'c> ResolutionPass<'c> {
    pub fn new(phase: Phase, descriptors: &'c [FieldDescriptor]) -> Self {
        Self { phase, descriptors }
    }

    pub fn run(&self, request: &ContextView<'_>, response: &ContextView<'_>, record: &mut LogRecord) {
        let mut fallbacks: IndexMap<&'c str, &'c FieldFn> = IndexMap::new();
        let mut self_references: IndexMap<&'c str, &'c str> = IndexMap::new();

        for descriptor in self.descriptors {
            match &descriptor.source {
                Source::SelfReference(other) => {
                    self_references.insert(descriptor.name.as_str(), other.as_str());
                    continue;
                }
                Source::Special => {
                    if let Some(fallback) = &descriptor.fallback {
                        fallbacks.insert(descriptor.name.as_str(), fallback);
                    }
                }
                _ => {}
            }

            if let Resolution::Write(value) =
                resolve_source(descriptor, self.phase, request, response, record)
            {
                record.set(descriptor.name.as_str(), value);
            }

            apply_defaults(descriptor, record, &mut fallbacks);
        }

        // Evaluate the whole batch before writing so siblings stay isolated.
        let snapshot: &LogRecord = record;
        let resolved: Vec<(&str, Option<Value>)> = fallbacks
            .iter()
            .map(|(name, fallback)| (*name, fallback.call(request, response, snapshot)))
            .collect();
        for (name, value) in resolved {
            record.set(name, value);
        }

        for (name, other) in self_references {
            let value = record.get(other).cloned();
            record.set(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EmptyContext, HostContext};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn request_with(fields: &[(&str, Value)]) -> BTreeMap<String, Value> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn run(phase: Phase, descriptors: &[FieldDescriptor], request: &dyn HostContext, record: &mut LogRecord) {
        let response = EmptyContext;
        ResolutionPass::new(phase, descriptors).run(
            &ContextView::new(request),
            &ContextView::new(&response),
            record,
        );
    }

    #[test]
    fn static_value_is_written_in_pre_pass() {
        let descriptors = vec![FieldDescriptor::static_value("type", "request")];
        let mut record = LogRecord::new();
        run(Phase::Pre, &descriptors, &EmptyContext, &mut record);
        assert_eq!(record.get("type"), Some(&json!("request")));
    }

    #[test]
    fn static_value_is_ignored_in_post_pass() {
        let descriptors = vec![FieldDescriptor::static_value("type", "response")];
        let mut record = LogRecord::new();
        record.insert("type", "request");
        run(Phase::Post, &descriptors, &EmptyContext, &mut record);
        assert_eq!(record.get("type"), Some(&json!("request")));
    }

    #[test]
    fn request_field_is_copied() {
        let descriptors = vec![FieldDescriptor::request_field("method", "method")];
        let request = request_with(&[("method", json!("GET"))]);
        let mut record = LogRecord::new();
        run(Phase::Pre, &descriptors, &request, &mut record);
        assert_eq!(record.get("method"), Some(&json!("GET")));
    }

    #[test]
    fn header_without_header_capability_resolves_empty() {
        let descriptors = vec![FieldDescriptor::header("referer", "referer")
            .mandatory()
            .with_default("-")];
        let mut record = LogRecord::new();
        run(Phase::Pre, &descriptors, &EmptyContext, &mut record);
        assert_eq!(record.get("referer"), Some(&json!("")));
    }

    #[test]
    fn default_applies_to_unresolved_mandatory_field() {
        let descriptors = vec![FieldDescriptor::request_field("remote_user", "user")
            .mandatory()
            .with_default("-")];
        let mut record = LogRecord::new();
        run(Phase::Pre, &descriptors, &EmptyContext, &mut record);
        assert_eq!(record.get("remote_user"), Some(&json!("-")));
    }

    #[test]
    fn default_wins_over_fallback() {
        let descriptors = vec![FieldDescriptor::request_field("size", "size")
            .mandatory()
            .with_default(-1)
            .with_fallback(|_, _, _| Some(json!(0)))];
        let mut record = LogRecord::new();
        run(Phase::Pre, &descriptors, &EmptyContext, &mut record);
        assert_eq!(record.get("size"), Some(&json!(-1)));
    }

    #[test]
    fn non_mandatory_unresolved_field_stays_absent() {
        let descriptors = vec![FieldDescriptor::request_field("user", "user")
            .with_default("-")
            .with_fallback(|_, _, _| Some(json!("x")))];
        let mut record = LogRecord::new();
        run(Phase::Pre, &descriptors, &EmptyContext, &mut record);
        assert!(record.get("user").is_none());
    }

    #[test]
    fn mandatory_field_without_default_or_fallback_stays_absent() {
        let descriptors = vec![FieldDescriptor::request_field("user", "user").mandatory()];
        let mut record = LogRecord::new();
        run(Phase::Pre, &descriptors, &EmptyContext, &mut record);
        assert!(record.is_empty());
    }

    #[test]
    fn special_field_takes_fallback_value() {
        let descriptors = vec![FieldDescriptor::special("status", |_, _, _| Some(json!(500))).mandatory()];
        let mut record = LogRecord::new();
        run(Phase::Pre, &descriptors, &EmptyContext, &mut record);
        assert_eq!(record.get("status"), Some(&json!(500)));
    }

    #[test]
    fn special_fallback_replaces_its_default() {
        let descriptors = vec![FieldDescriptor::special("s", |_, _, _| Some(json!(1)))
            .mandatory()
            .with_default(0)];
        let mut record = LogRecord::new();
        run(Phase::Pre, &descriptors, &EmptyContext, &mut record);
        assert_eq!(record.get("s"), Some(&json!(1)));
    }

    #[test]
    fn self_reference_sees_default_value() {
        let descriptors = vec![
            FieldDescriptor::self_reference("user", "remote_user"),
            FieldDescriptor::request_field("remote_user", "user")
                .mandatory()
                .with_default("-"),
        ];
        let mut record = LogRecord::new();
        run(Phase::Pre, &descriptors, &EmptyContext, &mut record);
        assert_eq!(record.get("remote_user"), Some(&json!("-")));
        assert_eq!(record.get("user"), Some(&json!("-")));
    }

    #[test]
    fn fallbacks_see_primary_values_but_not_each_other() {
        let descriptors = vec![
            FieldDescriptor::request_field("method", "method"),
            FieldDescriptor::request_field("a", "missing")
                .mandatory()
                .with_fallback(|_, _, rec| rec.get("method").cloned()),
            FieldDescriptor::request_field("b", "missing")
                .mandatory()
                .with_fallback(|_, _, rec| Some(json!(rec.get("a").is_some()))),
        ];
        let request = request_with(&[("method", json!("POST"))]);
        let mut record = LogRecord::new();
        run(Phase::Pre, &descriptors, &request, &mut record);

        assert_eq!(record.get("a"), Some(&json!("POST")));
        assert_eq!(record.get("b"), Some(&json!(false)));
    }

    #[test]
    fn self_reference_sees_fallback_result() {
        let descriptors = vec![
            FieldDescriptor::self_reference("request_id", "correlation_id"),
            FieldDescriptor::header("correlation_id", "x-correlationid")
                .mandatory()
                .with_fallback(|_, _, _| Some(json!("generated"))),
        ];
        let mut request_headers = http::HeaderMap::new();
        request_headers.insert("x-other", "1".parse().unwrap());

        struct Headers(http::HeaderMap);
        impl HostContext for Headers {
            fn headers(&self) -> Option<&dyn crate::context::HeaderAccess> {
                Some(&self.0)
            }
        }

        let mut record = LogRecord::new();
        run(Phase::Pre, &descriptors, &Headers(request_headers), &mut record);
        assert_eq!(record.get("correlation_id"), Some(&json!("generated")));
        assert_eq!(record.get("request_id"), Some(&json!("generated")));
    }

    #[test]
    fn self_reference_is_not_defaulted() {
        let descriptors = vec![FieldDescriptor::self_reference("alias", "nothing")
            .mandatory()
            .with_default("d")];
        let mut record = LogRecord::new();
        run(Phase::Pre, &descriptors, &EmptyContext, &mut record);
        assert!(record.get("alias").is_none());
    }

    #[test]
    fn time_field_defaults_to_minus_one_before_response() {
        let descriptors = vec![FieldDescriptor::time_post("duration", |_, _, _| Some(json!(12)))];
        let mut record = LogRecord::new();
        run(Phase::Pre, &descriptors, &EmptyContext, &mut record);
        assert_eq!(record.get("duration"), Some(&json!(-1)));
    }

    #[test]
    fn time_field_without_post_function_is_left_alone() {
        let descriptors = vec![FieldDescriptor::time_pre("received", |_, _, _| Some(json!(1)))];
        let mut record = LogRecord::new();
        record.insert("received", 1);
        run(Phase::Post, &descriptors, &EmptyContext, &mut record);
        assert_eq!(record.get("received"), Some(&json!(1)));
    }

    #[test]
    fn later_descriptor_with_same_name_wins() {
        let descriptors = vec![
            FieldDescriptor::request_field("ip", "forwarded"),
            FieldDescriptor::static_value("ip", "0.0.0.0"),
        ];
        let mut record = LogRecord::new();
        run(Phase::Pre, &descriptors, &EmptyContext, &mut record);
        assert_eq!(record.get("ip"), Some(&json!("0.0.0.0")));

        let reversed: Vec<_> = descriptors.into_iter().rev().collect();
        let mut record = LogRecord::new();
        run(Phase::Pre, &reversed, &EmptyContext, &mut record);
        assert!(record.get("ip").is_none());
    }

    #[test]
    fn post_header_reads_response() {
        struct Response(http::HeaderMap);
        impl HostContext for Response {
            fn headers(&self) -> Option<&dyn crate::context::HeaderAccess> {
                Some(&self.0)
            }
        }
        let mut headers = http::HeaderMap::new();
        headers.insert("content-type", "text/plain".parse().unwrap());
        let response = Response(headers);

        let descriptors = vec![FieldDescriptor::header("response_content_type", "content-type")];
        let mut record = LogRecord::new();
        ResolutionPass::new(Phase::Post, &descriptors).run(
            &ContextView::new(&EmptyContext),
            &ContextView::new(&response),
            &mut record,
        );
        assert_eq!(record.get("response_content_type"), Some(&json!("text/plain")));
    }
}
