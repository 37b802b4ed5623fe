//! Declarative description of the fields that make up a network log record.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::context::ContextView;
use crate::record::LogRecord;

type FieldFnInner =
    dyn Fn(&ContextView<'_>, &ContextView<'_>, &LogRecord) -> Option<Value> + Send + Sync;

/// A computed field value: `(request, response, record) -> value`.
///
/// Used for time-computed sources and for fallbacks. Returning `None` (or
/// JSON `null`) leaves the field unresolved.
#[derive(Clone)]
pub struct FieldFn(Arc<FieldFnInner>);

impl FieldFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ContextView<'_>, &ContextView<'_>, &LogRecord) -> Option<Value>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(
        &self,
        request: &ContextView<'_>,
        response: &ContextView<'_>,
        record: &LogRecord,
    ) -> Option<Value> {
        (self.0)(request, response, record)
    }
}

impl fmt::Debug for FieldFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldFn(..)")
    }
}

/// Where a field's primary value comes from.
#[derive(Debug, Clone)]
pub enum Source {
    /// Request header in the pre pass, response header in the post pass.
    Header(String),
    /// Literal value. Only the pre pass writes it.
    Static(Value),
    RequestField(String),
    ResponseField(String),
    /// Copy of another field, taken after the pass's fallbacks have run.
    SelfReference(String),
    /// Pre pass writes `pre(..)` (or `-1` without one); post pass writes
    /// `post(..)` and leaves the field alone without one.
    TimeComputed {
        pre: Option<FieldFn>,
        post: Option<FieldFn>,
    },
    /// No direct source; the value only ever comes from the fallback.
    Special,
}

/// One named field and how to obtain its value.
///
/// Names need not be unique: when two descriptors share a name, whichever
/// writes last wins.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub source: Source,
    pub mandatory: bool,
    pub default: Option<Value>,
    pub fallback: Option<FieldFn>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, source: Source) -> Self {
        Self {
            name: name.into(),
            source,
            mandatory: false,
            default: None,
            fallback: None,
        }
    }

    pub fn header(name: impl Into<String>, header: impl Into<String>) -> Self {
        Self::new(name, Source::Header(header.into()))
    }

    pub fn static_value(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, Source::Static(value.into()))
    }

    pub fn request_field(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, Source::RequestField(field.into()))
    }

    pub fn response_field(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, Source::ResponseField(field.into()))
    }

    pub fn self_reference(name: impl Into<String>, other: impl Into<String>) -> Self {
        Self::new(name, Source::SelfReference(other.into()))
    }

    pub fn time(name: impl Into<String>, pre: Option<FieldFn>, post: Option<FieldFn>) -> Self {
        Self::new(name, Source::TimeComputed { pre, post })
    }

    /// Time-computed field evaluated only in the post pass.
    pub fn time_post<F>(name: impl Into<String>, post: F) -> Self
    where
        F: Fn(&ContextView<'_>, &ContextView<'_>, &LogRecord) -> Option<Value>
            + Send
            + Sync
            + 'static,
    {
        Self::time(name, None, Some(FieldFn::new(post)))
    }

    /// Time-computed field evaluated only in the pre pass.
    pub fn time_pre<F>(name: impl Into<String>, pre: F) -> Self
    where
        F: Fn(&ContextView<'_>, &ContextView<'_>, &LogRecord) -> Option<Value>
            + Send
            + Sync
            + 'static,
    {
        Self::time(name, Some(FieldFn::new(pre)), None)
    }

    pub fn special<F>(name: impl Into<String>, fallback: F) -> Self
    where
        F: Fn(&ContextView<'_>, &ContextView<'_>, &LogRecord) -> Option<Value>
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, Source::Special).with_fallback(fallback)
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&ContextView<'_>, &ContextView<'_>, &LogRecord) -> Option<Value>
            + Send
            + Sync
            + 'static,
    {
        self.fallback = Some(FieldFn::new(fallback));
        self
    }
}

/// Ordered descriptor lists for the two resolution passes.
///
/// Built once at setup and shared read-only by every request.
#[derive(Debug, Clone, Default)]
pub struct FieldConfig {
    pub pre: Vec<FieldDescriptor>,
    pub post: Vec<FieldDescriptor>,
}

impl FieldConfig {
    pub fn new(pre: Vec<FieldDescriptor>, post: Vec<FieldDescriptor>) -> Self {
        Self { pre, post }
    }

    pub fn with_pre(mut self, descriptor: FieldDescriptor) -> Self {
        self.pre.push(descriptor);
        self
    }

    pub fn with_post(mut self, descriptor: FieldDescriptor) -> Self {
        self.post.push(descriptor);
        self
    }
}
