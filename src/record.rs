use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Per-request accumulator of named field values.
///
/// A record is created by [`LoggingCore::init_log`](crate::logger::LoggingCore::init_log),
/// filled by the pre pass, enriched by the post pass and finally moved into an
/// [`EmittedRecord`]. Writing an unresolved value (`None` or JSON `null`)
/// removes the key, so a later descriptor with the same name always wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LogRecord {
    fields: BTreeMap<String, Value>,
}

impl LogRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// `true` when `name` holds a non-null value.
    pub fn is_resolved(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|v| !v.is_null())
    }

    /// Store `value` under `name`, or clear the entry when it is unresolved.
    pub fn set(&mut self, name: impl Into<String>, value: Option<Value>) {
        let name = name.into();
        match value {
            Some(v) if !v.is_null() => {
                self.fields.insert(name, v);
            }
            _ => {
                self.fields.remove(&name);
            }
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.set(name, Some(value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }
}

/// A finished record handed to a [`LogSink`](crate::sink::LogSink).
///
/// Built by consuming a [`LogRecord`], so nothing can touch the fields once
/// the record has been emitted.
#[derive(Debug, Clone, Serialize)]
pub struct EmittedRecord {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub fields: BTreeMap<String, Value>,
    /// Output pattern active on the core when the record was emitted.
    #[serde(skip)]
    pub pattern: Option<String>,
}

impl EmittedRecord {
    pub fn new(level: tracing::Level, record: LogRecord, pattern: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: level.as_str().to_ascii_lowercase(),
            fields: record.into_fields(),
            pattern,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Render the record as a single line.
    ///
    /// With a pattern set, every `{{field}}` placeholder is replaced by the
    /// field's value (`-` when missing). Without one the fields are rendered
    /// as a JSON object.
    pub fn render(&self) -> String {
        match &self.pattern {
            Some(pattern) => render_pattern(pattern, &self.fields),
            None => serde_json::to_string(&self.fields).unwrap_or_else(|_| "{}".to_string()),
        }
    }
}

fn render_pattern(pattern: &str, fields: &BTreeMap<String, Value>) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        match fields.get(after[..end].trim()) {
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => out.push('-'),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}
