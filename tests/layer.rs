use std::error::Error;
use std::fmt;
use tracing::{error, info, info_span, warn};
use tracing_retention_buffer::{RecordQuery, RetentionBuffer, RetentionOptions, Severity, INTERNAL_TARGET};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

#[derive(Debug)]
struct QueryFailed {
    source: std::io::Error,
}

impl fmt::Display for QueryFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("query failed")
    }
}

impl Error for QueryFailed {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

fn with_buffer<F: FnOnce()>(buffer: &RetentionBuffer, f: F) {
    let subscriber = Registry::default().with(buffer.layer());
    tracing::subscriber::with_default(subscriber, f);
}

#[tokio::test]
async fn events_become_records_with_target_as_category() {
    let buffer = RetentionBuffer::start(RetentionOptions::default()).unwrap();
    with_buffer(&buffer, || {
        info!(target: "billing", "invoice sent");
        warn!(target: "billing", "invoice late");
    });

    let records = buffer.recent(usize::MAX);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].message(), "invoice late");
    assert_eq!(records[0].severity(), Severity::Warning);
    assert_eq!(records[1].category(), "billing");
    assert_eq!(records[1].severity(), Severity::Information);
}

#[tokio::test]
async fn spans_become_scopes_root_first() {
    let buffer = RetentionBuffer::start(RetentionOptions::default()).unwrap();
    with_buffer(&buffer, || {
        let request = info_span!("request", id = "r-1");
        let _request = request.enter();
        let handler = info_span!("handler");
        let _handler = handler.enter();
        info!(attempt = 2, "handling");
    });

    let record = &buffer.recent(1)[0];
    let flat = record.flattened_scopes();
    assert_eq!(flat["id"], "r-1");
    assert_eq!(flat["_"], "handler");
    assert_eq!(flat["attempt"], "2");
    assert_eq!(record.scopes().len(), 3);
}

#[tokio::test]
async fn duplicate_span_fields_survive_flattening() {
    let buffer = RetentionBuffer::start(RetentionOptions::default()).unwrap();
    with_buffer(&buffer, || {
        let outer = info_span!("outer", k = "v1");
        let _outer = outer.enter();
        let inner = info_span!("inner", k = "v2");
        let _inner = inner.enter();
        info!("nested");
    });

    let flat = buffer.recent(1)[0].flattened_scopes();
    assert_eq!(flat["k"], "v1");
    assert_eq!(flat["_k"], "v2");
}

#[tokio::test]
async fn recorded_span_fields_are_picked_up() {
    let buffer = RetentionBuffer::start(RetentionOptions::default()).unwrap();
    with_buffer(&buffer, || {
        let span = info_span!("job", status = tracing::field::Empty);
        let _entered = span.enter();
        span.record("status", "running");
        info!("tick");
    });

    let flat = buffer.recent(1)[0].flattened_scopes();
    assert_eq!(flat["status"], "running");
}

#[tokio::test]
async fn error_fields_are_captured_as_faults() {
    let buffer = RetentionBuffer::start(RetentionOptions::default()).unwrap();
    let failure = QueryFailed {
        source: std::io::Error::new(std::io::ErrorKind::Other, "Lew"),
    };
    with_buffer(&buffer, || {
        error!(error = &failure as &(dyn Error + 'static), "Mew");
        error!(critical = true, "disk gone");
    });

    let found = buffer.find(&RecordQuery::new("Mew").exception_pattern("^Lew$")).unwrap();
    assert_eq!(found.len(), 1);
    let fault = found[0].error().unwrap();
    assert_eq!(fault.stack_trace(), "query failed\ncaused by: Lew");

    let critical = buffer
        .find(&RecordQuery::default().severities([Severity::Critical]))
        .unwrap();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].message(), "disk gone");
    assert!(critical[0].flattened_scopes().is_empty());
}

#[tokio::test]
async fn internal_diagnostics_are_not_recorded() {
    let buffer = RetentionBuffer::start(RetentionOptions::default()).unwrap();
    let layer = buffer.layer();
    let total = layer.total_events.clone();
    let recorded = layer.recorded_events.clone();
    let subscriber = Registry::default().with(layer);
    tracing::subscriber::with_default(subscriber, || {
        info!(target: INTERNAL_TARGET, "housekeeping");
        info!("application event");
    });

    assert_eq!(buffer.len(), 1);
    assert_eq!(total.load(std::sync::atomic::Ordering::Relaxed), 2);
    assert_eq!(recorded.load(std::sync::atomic::Ordering::Relaxed), 1);
}

#[tokio::test]
async fn export_is_json_ready() {
    let buffer = RetentionBuffer::start(RetentionOptions::default()).unwrap();
    with_buffer(&buffer, || {
        let span = info_span!("tenant", tenant = "acme");
        let _entered = span.enter();
        warn!(target: "quota", "near limit");
    });

    let exported = buffer.export_recent(1);
    let json = serde_json::to_value(&exported).unwrap();
    assert_eq!(json[0]["category"], "quota");
    assert_eq!(json[0]["severity"], 3);
    assert_eq!(json[0]["severity_name"], "Warning");
    assert_eq!(json[0]["scopes"]["tenant"], "acme");
    assert!(json[0]["exception"].is_null());
}

struct Unprintable;

impl fmt::Debug for Unprintable {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        panic!("value cannot be rendered")
    }
}

#[tokio::test]
async fn malformed_fields_are_dropped_and_not_counted_as_recorded() {
    let buffer = RetentionBuffer::start(RetentionOptions::default()).unwrap();
    let layer = buffer.layer();
    let total = layer.total_events.clone();
    let recorded = layer.recorded_events.clone();
    let subscriber = Registry::default().with(layer);
    tracing::subscriber::with_default(subscriber, || {
        info!(payload = ?Unprintable, "cannot shape");
        info!("fine");
    });

    assert_eq!(buffer.len(), 1);
    assert_eq!(buffer.dropped_records(), 1);
    assert_eq!(buffer.accepted_records(), 1);
    assert_eq!(total.load(std::sync::atomic::Ordering::Relaxed), 2);
    assert_eq!(recorded.load(std::sync::atomic::Ordering::Relaxed), 1);
    assert_eq!(buffer.recent(1)[0].message(), "fine");
}
