//! Capability-shaped access to the host's request and response.
//!
//! The engine never talks to a framework type directly. A host exposes what
//! it can through [`HostContext`]; anything it leaves out falls back to the
//! trait's defaults. [`ContextView`] then pins those capabilities down once,
//! before any descriptor is evaluated, so every later read is safe.

use serde_json::Value;
use std::collections::BTreeMap;

/// Read a header by name.
pub trait HeaderAccess: Send + Sync {
    fn header(&self, name: &str) -> Option<String>;
}

impl HeaderAccess for http::HeaderMap {
    fn header(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }
}

/// One side of an exchange as seen by the resolver.
pub trait HostContext: Send + Sync {
    /// Header accessor, if the host has one.
    fn headers(&self) -> Option<&dyn HeaderAccess> {
        None
    }

    /// Arbitrary attribute of the request/response object.
    fn field(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// A context with no capabilities at all.
///
/// Used as the response during the pre pass, before any response exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyContext;

impl HostContext for EmptyContext {}

/// Plain field bag; exposes no headers.
impl HostContext for BTreeMap<String, Value> {
    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Stand-in for hosts without header access: every header reads as "".
struct BlankHeaders;

impl HeaderAccess for BlankHeaders {
    fn header(&self, _name: &str) -> Option<String> {
        Some(String::new())
    }
}

/// Normalized, read-only view over a [`HostContext`].
#[derive(Clone, Copy)]
pub struct ContextView<'a> {
    host: &'a dyn HostContext,
    headers: &'a dyn HeaderAccess,
}

impl<'a> ContextView<'a> {
    pub fn new(host: &'a dyn HostContext) -> Self {
        let headers = host.headers().unwrap_or(&BlankHeaders);
        Self { host, headers }
    }

    pub fn header(&self, name: &str) -> Option<Value> {
        self.headers.header(name).map(Value::String)
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.host.field(name)
    }
}

impl std::fmt::Debug for ContextView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextView").finish_non_exhaustive()
    }
}
