use crate::buffer::RetentionBuffer;
use crate::record::{CapturedError, LogRecord, ScopeValue, Severity};
use crate::INTERNAL_TARGET;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that turns every event into a [`LogRecord`]
/// and appends it to a [`RetentionBuffer`].
///
/// The event target becomes the record category and the enclosing spans,
/// from root to leaf, become its scopes. A span with fields contributes a
/// key/value map, a span without fields contributes its name. Event fields
/// other than `message`, the recorded error and the `critical` flag are
/// attached as the innermost scope.
///
/// Events at every level are recorded; put a filter in front of the layer
/// to narrow that down. An `ERROR` event carrying `critical = true` is
/// recorded as [`Severity::Critical`].
pub struct RetentionLayer {
    buffer: RetentionBuffer,
    /// Total events seen by the layer.
    pub total_events: Arc<AtomicU64>,
    /// Events that made it into the buffer.
    pub recorded_events: Arc<AtomicU64>,
}

impl RetentionLayer {
    pub(crate) fn new(buffer: RetentionBuffer) -> Self {
        Self {
            buffer,
            total_events: Arc::new(AtomicU64::new(0)),
            recorded_events: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn buffer(&self) -> &RetentionBuffer {
        &self.buffer
    }
}

/// Scope value stored in span extensions.
struct SpanScope(ScopeValue);

impl<S> Layer<S> for RetentionLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };

        let mut fields = Vec::new();
        attrs.record(&mut ScopeVisitor { fields: &mut fields });
        let scope = if fields.is_empty() {
            ScopeValue::value(span.name())
        } else {
            ScopeValue::Map(fields)
        };
        span.extensions_mut().insert(SpanScope(scope));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };

        let mut fields = Vec::new();
        values.record(&mut ScopeVisitor { fields: &mut fields });
        if fields.is_empty() {
            return;
        }

        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanScope>() {
            Some(SpanScope(ScopeValue::Map(existing))) => existing.extend(fields),
            Some(scope) => scope.0 = ScopeValue::Map(fields),
            None => {
                extensions.insert(SpanScope(ScopeValue::Map(fields)));
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        if meta.target() == INTERNAL_TARGET {
            return;
        }

        // Shaping runs inside `ingest` so a misbehaving field value is
        // counted as a dropped record instead of unwinding into the caller.
        let recorded = self.buffer.ingest(|| shape_event(event, &ctx));
        if recorded {
            self.recorded_events.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn shape_event<S>(event: &Event<'_>, ctx: &Context<'_, S>) -> LogRecord
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let meta = event.metadata();
    let mut visitor = EventVisitor::default();
    event.record(&mut visitor);

    let mut scopes: Vec<ScopeValue> = ctx
        .event_scope(event)
        .map(|spans| {
            spans
                .from_root()
                .filter_map(|span| {
                    let extensions = span.extensions();
                    extensions.get::<SpanScope>().map(|scope| scope.0.clone())
                })
                .collect()
        })
        .unwrap_or_default();
    if !visitor.fields.is_empty() {
        scopes.push(ScopeValue::Map(visitor.fields));
    }

    let severity = if visitor.critical && *meta.level() == Level::ERROR {
        Severity::Critical
    } else {
        Severity::from(*meta.level())
    };

    LogRecord::new(
        meta.target(),
        severity,
        visitor.message.unwrap_or_default(),
        visitor.error,
        scopes,
    )
}

struct ScopeVisitor<'a> {
    fields: &'a mut Vec<(String, String)>,
}

impl Visit for ScopeVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields.push((field.name().to_string(), format!("{:?}", value)));
    }
}

#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    error: Option<CapturedError>,
    critical: bool,
    fields: Vec<(String, String)>,
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "critical" {
            self.critical = value;
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        if self.error.is_none() {
            self.error = Some(CapturedError::from_error(value));
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields.push((field.name().to_string(), format!("{:?}", value)));
        }
    }
}
