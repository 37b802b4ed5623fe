use crate::logger::{LoggingCore, CORRELATION_ID_FIELD};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that turns application events into message
/// records on a [`LoggingCore`].
///
/// Events at or above the core's current level become records of type
/// `log`. When an event happens inside a span carrying a `correlation_id`
/// field (see [`RequestLogger::span`](crate::logger::RequestLogger::span)) the
/// record is tagged with it, so messages line up with the request's network
/// record. Events emitted by this crate itself are ignored.
pub struct MessageLayer {
    core: Arc<LoggingCore>,
}

impl MessageLayer {
    pub fn new(core: Arc<LoggingCore>) -> Self {
        Self { core }
    }
}

/// Span extension holding the correlation id recorded on the span.
struct CorrelationId(String);

impl<S> Layer<S> for MessageLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = CorrelationVisitor(None);
        attrs.record(&mut visitor);

        if let (Some(correlation_id), Some(span)) = (visitor.0, ctx.span(id)) {
            span.extensions_mut().insert(CorrelationId(correlation_id));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(env!("CARGO_CRATE_NAME")) {
            return;
        }
        if *meta.level() > self.core.logging_level() {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);
        fields.insert("logger".to_string(), Value::String(meta.target().to_string()));

        let correlation_id = ctx.event_scope(event).and_then(|scope| {
            scope.into_iter().find_map(|span| {
                span.extensions()
                    .get::<CorrelationId>()
                    .map(|id| id.0.clone())
            })
        });

        self.core.log_message_with(
            correlation_id.as_deref(),
            *meta.level(),
            message.as_deref().unwrap_or_default(),
            fields,
        );
    }
}

struct CorrelationVisitor(Option<String>);

impl Visit for CorrelationVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == CORRELATION_ID_FIELD {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == CORRELATION_ID_FIELD {
            self.0 = Some(format!("{:?}", value));
        }
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), Value::String(format!("{:?}", value)));
        }
    }
}
