//! The logging core: record initialization, static overrides, level
//! filtering and emission.
//!
//! The resolution engine only needs a handful of operations from here
//! (`init_log`, `bind_log_functions`, `write_static_fields`, `send_log`).
//! The rest are runtime knobs that can be turned while requests are in
//! flight; an in-flight record only sees them when it is emitted.

use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::level_filters::LevelFilter;
use tracing::{warn, Level};
use uuid::Uuid;

use crate::dispatch::{DispatchStats, Dispatcher};
use crate::error::{DispatchError, LevelParseError};
use crate::init::CoreConfig;
use crate::record::{EmittedRecord, LogRecord};
use crate::sink::LogSink;

/// Record field carrying the request's correlation id.
pub const CORRELATION_ID_FIELD: &str = "correlation_id";

/// Keys the core writes on message records; custom fields never replace them.
const RESERVED_MESSAGE_FIELDS: [&str; 6] =
    ["written_at", "written_ts", "type", "msg", "level", CORRELATION_ID_FIELD];

/// Parse a level name.
///
/// Accepts `off`, `error`, `warn`, `info`, `debug`, `trace` and the aliases
/// `warning`, `verbose` (debug) and `silly` (trace).
pub fn parse_level(name: &str) -> Result<LevelFilter, LevelParseError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "off" => Ok(LevelFilter::OFF),
        "error" => Ok(LevelFilter::ERROR),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "verbose" | "debug" => Ok(LevelFilter::DEBUG),
        "silly" | "trace" => Ok(LevelFilter::TRACE),
        other => Err(LevelParseError(other.to_string())),
    }
}

pub struct LoggingCore {
    dispatcher: Dispatcher,
    level: RwLock<LevelFilter>,
    pattern: RwLock<Option<String>>,
    overrides: RwLock<BTreeMap<String, Value>>,
}

impl LoggingCore {
    /// Create a core delivering to `sink` and spawn its dispatcher.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(sink: Arc<dyn LogSink>, config: &CoreConfig) -> (Self, JoinHandle<()>) {
        let (dispatcher, handle) = Dispatcher::new(
            sink,
            config.channel_buffer,
            config.batch_size,
            config.flush_interval,
        );

        let core = Self {
            dispatcher,
            level: RwLock::new(config.level),
            pattern: RwLock::new(config.pattern.clone()),
            overrides: RwLock::new(BTreeMap::new()),
        };
        (core, handle)
    }

    /// A fresh record, seeded with its creation timestamps.
    pub fn init_log(&self) -> LogRecord {
        let now = Utc::now();
        let mut record = LogRecord::new();
        record.insert("written_at", now.to_rfc3339_opts(SecondsFormat::Millis, true));
        if let Some(nanos) = now.timestamp_nanos_opt() {
            record.insert("written_ts", nanos);
        }
        record
    }

    /// Contextual logging helpers for one request.
    ///
    /// Reuses the record's `correlation_id` when the pre pass produced one.
    pub fn bind_log_functions(self: &Arc<Self>, record: &LogRecord) -> RequestLogger {
        let correlation_id = match record.get(CORRELATION_ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        RequestLogger {
            core: Arc::clone(self),
            correlation_id,
        }
    }

    /// Helpers with a freshly generated correlation id, for work that does
    /// not belong to a request.
    pub fn correlation_object(self: &Arc<Self>) -> RequestLogger {
        RequestLogger {
            core: Arc::clone(self),
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    /// Apply operator-configured overrides.
    pub fn write_static_fields(&self, record: &mut LogRecord) {
        for (name, value) in self.overrides.read().iter() {
            record.set(name.as_str(), Some(value.clone()));
        }
    }

    /// Hand a finished record to the dispatcher.
    ///
    /// Records below the current level are discarded and reported as sent.
    pub fn send_log(&self, level: Level, record: LogRecord) -> Result<(), DispatchError> {
        if level > *self.level.read() {
            return Ok(());
        }
        let pattern = self.pattern.read().clone();
        self.dispatcher.dispatch(EmittedRecord::new(level, record, pattern))
    }

    /// Finalize a network record: static overrides, then `info` emission.
    pub fn emit(&self, mut record: LogRecord) {
        self.write_static_fields(&mut record);
        if let Err(e) = self.send_log(Level::INFO, record) {
            warn!(error = %e, "network log record not delivered");
        }
    }

    /// Log a message with custom fields and no correlation id.
    pub fn log_message<I, K>(&self, level: Level, message: &str, fields: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.log_message_with(None, level, message, fields);
    }

    pub(crate) fn log_message_with<I, K>(&self, correlation_id: Option<&str>, level: Level, message: &str, fields: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut record = self.init_log();
        for (name, value) in fields {
            let name = name.into();
            if !RESERVED_MESSAGE_FIELDS.contains(&name.as_str()) {
                record.set(name, Some(value));
            }
        }
        record.insert("type", "log");
        record.insert("msg", message);
        record.insert("level", level.as_str().to_ascii_lowercase());
        if let Some(id) = correlation_id {
            record.insert(CORRELATION_ID_FIELD, id);
        }

        self.write_static_fields(&mut record);
        if let Err(e) = self.send_log(level, record) {
            warn!(error = %e, "log message not delivered");
        }
    }

    pub fn set_logging_level(&self, level: LevelFilter) {
        *self.level.write() = level;
    }

    /// Like [`set_logging_level`](Self::set_logging_level), from a level name.
    pub fn set_logging_level_str(&self, name: &str) -> Result<(), LevelParseError> {
        self.set_logging_level(parse_level(name)?);
        Ok(())
    }

    pub fn logging_level(&self) -> LevelFilter {
        *self.level.read()
    }

    /// Render emitted records with a `{{field}}` pattern instead of JSON.
    pub fn set_log_pattern(&self, pattern: impl Into<String>) {
        *self.pattern.write() = Some(pattern.into());
    }

    pub fn clear_log_pattern(&self) {
        *self.pattern.write() = None;
    }

    pub fn log_pattern(&self) -> Option<String> {
        self.pattern.read().clone()
    }

    /// Force `name` to `value` on every emitted record; `None` removes the
    /// override. Returns the previous override.
    pub fn override_field(&self, name: impl Into<String>, value: Option<Value>) -> Option<Value> {
        let name = name.into();
        let mut overrides = self.overrides.write();
        match value {
            Some(value) => overrides.insert(name, value),
            None => overrides.remove(&name),
        }
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        self.dispatcher.stats()
    }

    /// Stop emitting. Records already queued are still delivered; await the
    /// dispatcher handle to wait for that.
    pub fn shutdown(&self) {
        self.dispatcher.close();
    }
}

impl fmt::Debug for LoggingCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingCore")
            .field("level", &*self.level.read())
            .field("pattern", &*self.pattern.read())
            .finish_non_exhaustive()
    }
}

/// Logging helpers bound to one request's correlation id.
///
/// The HTTP middleware stores one in the request extensions so handlers can
/// log messages that line up with the request's network record.
#[derive(Clone)]
pub struct RequestLogger {
    core: Arc<LoggingCore>,
    correlation_id: String,
}

impl RequestLogger {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn log_message<I, K>(&self, level: Level, message: &str, fields: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.core
            .log_message_with(Some(&self.correlation_id), level, message, fields);
    }

    /// Span carrying the correlation id; events recorded inside it are
    /// tagged by [`MessageLayer`](crate::layer::MessageLayer).
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("request", correlation_id = %self.correlation_id)
    }
}

impl fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogger")
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_sink::MemorySink;
    use crate::record::EmittedRecord;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::{timeout, Duration};

    fn core() -> (Arc<LoggingCore>, UnboundedReceiver<EmittedRecord>) {
        let (sink, rx) = MemorySink::new();
        let config = CoreConfig {
            batch_size: 1,
            flush_interval: Duration::from_millis(10),
            ..CoreConfig::default()
        };
        let (core, _handle) = LoggingCore::new(Arc::new(sink), &config);
        (Arc::new(core), rx)
    }

    async fn next(rx: &mut UnboundedReceiver<EmittedRecord>) -> EmittedRecord {
        timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap()
    }

    #[test]
    fn level_names_and_aliases() {
        assert_eq!(parse_level("verbose"), Ok(LevelFilter::DEBUG));
        assert_eq!(parse_level("silly"), Ok(LevelFilter::TRACE));
        assert_eq!(parse_level(" WARN "), Ok(LevelFilter::WARN));
        assert_eq!(parse_level("loud"), Err(LevelParseError("loud".to_string())));
    }

    #[tokio::test]
    async fn init_log_seeds_timestamps() {
        let (core, _rx) = core();
        let record = core.init_log();
        assert!(record.get("written_at").is_some_and(Value::is_string));
        assert!(record.get("written_ts").is_some_and(Value::is_i64));
    }

    #[tokio::test]
    async fn overrides_apply_at_emission() {
        let (core, mut rx) = core();
        core.override_field("remote_ip", Some(json!("redacted")));

        let mut record = LogRecord::new();
        record.insert("remote_ip", "10.1.2.3");
        core.emit(record);

        let emitted = next(&mut rx).await;
        assert_eq!(emitted.level, "info");
        assert_eq!(emitted.get("remote_ip"), Some(&json!("redacted")));

        assert_eq!(core.override_field("remote_ip", None), Some(json!("redacted")));
        let mut record = LogRecord::new();
        record.insert("remote_ip", "10.1.2.3");
        core.emit(record);
        assert_eq!(next(&mut rx).await.get("remote_ip"), Some(&json!("10.1.2.3")));
    }

    #[tokio::test]
    async fn records_below_level_are_discarded() {
        let (core, mut rx) = core();
        core.set_logging_level_str("error").unwrap();

        core.emit(LogRecord::new());
        core.log_message(Level::ERROR, "boom", [("code", json!(7))]);

        let emitted = next(&mut rx).await;
        assert_eq!(emitted.get("msg"), Some(&json!("boom")));
        assert_eq!(core.stats().total(), 1);
    }

    #[tokio::test]
    async fn request_logger_tags_messages() {
        let (core, mut rx) = core();
        let mut record = core.init_log();
        record.insert(CORRELATION_ID_FIELD, "abc-123");
        let logger = core.bind_log_functions(&record);
        assert_eq!(logger.correlation_id(), "abc-123");

        logger.log_message(Level::WARN, "slow upstream", [("msg", json!("spoofed")), ("upstream", json!("db"))]);

        let emitted = next(&mut rx).await;
        assert_eq!(emitted.level, "warn");
        assert_eq!(emitted.get("msg"), Some(&json!("slow upstream")));
        assert_eq!(emitted.get("upstream"), Some(&json!("db")));
        assert_eq!(emitted.get("type"), Some(&json!("log")));
        assert_eq!(emitted.get(CORRELATION_ID_FIELD), Some(&json!("abc-123")));
    }

    #[tokio::test]
    async fn correlation_object_generates_ids() {
        let (core, _rx) = core();
        let a = core.correlation_object();
        let b = core.bind_log_functions(&LogRecord::new());
        assert_ne!(a.correlation_id(), b.correlation_id());
        assert!(Uuid::parse_str(a.correlation_id()).is_ok());
    }

    #[tokio::test]
    async fn pattern_travels_with_record() {
        let (core, mut rx) = core();
        core.set_log_pattern("{{msg}}");
        core.log_message(Level::INFO, "hello", Vec::<(String, Value)>::new());
        assert_eq!(next(&mut rx).await.render(), "hello");
        core.clear_log_pattern();
        assert_eq!(core.log_pattern(), None);
    }
}
