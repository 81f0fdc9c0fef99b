use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

/// Severity of a retained record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Every severity, least severe first.
    pub const ALL: [Severity; 6] = [
        Severity::Trace,
        Severity::Debug,
        Severity::Information,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
    ];

    /// Numeric code used in the export view (`Trace` = 0 .. `Critical` = 5).
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Severity::Trace => "Trace",
            Severity::Debug => "Debug",
            Severity::Information => "Information",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Critical => "Critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Severity::Trace,
            tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Information,
            tracing::Level::WARN => Severity::Warning,
            tracing::Level::ERROR => Severity::Error,
        }
    }
}

/// Objects that can describe themselves on a single line, for frequent
/// messages and anonymous scope values.
pub trait TraceInfo {
    fn single_line(&self) -> String;
}

/// One contextual value attached to a record through a scope.
///
/// The variant is chosen where the scope is opened, which decides how the
/// value shows up in the flattened export view:
/// - `Map`: every entry becomes a key of its own.
/// - `Pair`: a single named entry (string or numeric values).
/// - `Value`: anything else, already rendered to text; stored under an
///   underscore marker key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeValue {
    Map(Vec<(String, String)>),
    Pair(String, String),
    Value(String),
}

impl ScopeValue {
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: fmt::Display,
    {
        ScopeValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        )
    }

    pub fn pair(key: impl Into<String>, value: impl fmt::Display) -> Self {
        ScopeValue::Pair(key.into(), value.to_string())
    }

    pub fn value(value: impl fmt::Display) -> Self {
        ScopeValue::Value(value.to_string())
    }

    pub fn from_trace_info(info: &dyn TraceInfo) -> Self {
        ScopeValue::Value(info.single_line())
    }
}

impl From<(&str, &str)> for ScopeValue {
    fn from((key, value): (&str, &str)) -> Self {
        ScopeValue::Pair(key.to_string(), value.to_string())
    }
}

impl From<(String, String)> for ScopeValue {
    fn from((key, value): (String, String)) -> Self {
        ScopeValue::Pair(key, value)
    }
}

impl From<(&str, String)> for ScopeValue {
    fn from((key, value): (&str, String)) -> Self {
        ScopeValue::Pair(key.to_string(), value)
    }
}

macro_rules! numeric_pair {
    ($($ty:ty),*) => {
        $(
            impl From<(&str, $ty)> for ScopeValue {
                fn from((key, value): (&str, $ty)) -> Self {
                    ScopeValue::Pair(key.to_string(), value.to_string())
                }
            }

            impl From<(String, $ty)> for ScopeValue {
                fn from((key, value): (String, $ty)) -> Self {
                    ScopeValue::Pair(key, value.to_string())
                }
            }
        )*
    };
}

numeric_pair!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

impl<V: fmt::Display> From<BTreeMap<String, V>> for ScopeValue {
    fn from(map: BTreeMap<String, V>) -> Self {
        ScopeValue::map(map)
    }
}

/// Fault information captured together with a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedError {
    message: String,
    stack_trace: String,
}

impl CapturedError {
    pub fn new(message: impl Into<String>, stack_trace: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: stack_trace.into(),
        }
    }

    /// Capture an error by walking its `source()` chain.
    ///
    /// `message` is the innermost (root cause) error; `stack_trace` is the
    /// whole chain rendered outermost first, one cause per line.
    pub fn from_error(error: &(dyn Error + 'static)) -> Self {
        let mut trace = error.to_string();
        let mut root: &(dyn Error + 'static) = error;
        while let Some(source) = root.source() {
            trace.push_str("\ncaused by: ");
            trace.push_str(&source.to_string());
            root = source;
        }
        Self {
            message: root.to_string(),
            stack_trace: trace,
        }
    }

    /// Message of the root cause.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack_trace(&self) -> &str {
        &self.stack_trace
    }
}

/// A captured log event. Immutable once it has been appended to a store.
#[derive(Debug, Clone)]
pub struct LogRecord {
    category: String,
    timestamp: DateTime<Utc>,
    severity: Severity,
    message: String,
    error: Option<CapturedError>,
    scopes: Vec<ScopeValue>,
}

impl LogRecord {
    /// Build a record stamped with the current wall-clock time.
    pub fn new(
        category: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        error: Option<CapturedError>,
        scopes: Vec<ScopeValue>,
    ) -> Self {
        Self {
            category: category.into(),
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            error,
            scopes,
        }
    }

    /// Raise the timestamp to `floor` if it is earlier. Only applied before
    /// the record is published to a store.
    pub(crate) fn not_before(mut self, floor: DateTime<Utc>) -> Self {
        if self.timestamp < floor {
            self.timestamp = floor;
        }
        self
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error(&self) -> Option<&CapturedError> {
        self.error.as_ref()
    }

    pub fn scopes(&self) -> &[ScopeValue] {
        &self.scopes
    }

    /// Flatten the scopes into a single key/value mapping.
    ///
    /// Computed on every call. Keys that are already taken are retried under
    /// an underscore marker that grows after every marked insertion, so no
    /// scope contribution ever overwrites another.
    pub fn flattened_scopes(&self) -> BTreeMap<String, String> {
        let mut flat = ScopeFlattener::new();
        for scope in &self.scopes {
            match scope {
                ScopeValue::Map(entries) => {
                    for (key, value) in entries {
                        flat.insert(key, value);
                    }
                }
                ScopeValue::Pair(key, value) => flat.insert(key, value),
                ScopeValue::Value(value) => flat.insert_marked("", value),
            }
        }
        flat.entries
    }

    /// Serializable projection of this record.
    pub fn export(&self) -> RecordExport {
        RecordExport {
            category: self.category.clone(),
            timestamp: self.timestamp,
            severity: self.severity.code(),
            severity_name: self.severity.name().to_string(),
            message: self.message.clone(),
            exception: self.error.as_ref().map(|e| e.message.clone()),
            stack_trace: self.error.as_ref().map(|e| e.stack_trace.clone()),
            scopes: self.flattened_scopes(),
        }
    }
}

struct ScopeFlattener {
    entries: BTreeMap<String, String>,
    nesting: String,
}

impl ScopeFlattener {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            nesting: String::from("_"),
        }
    }

    fn insert(&mut self, key: &str, value: &str) {
        match self.entries.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(value.to_string());
            }
            Entry::Occupied(_) => self.insert_marked(key, value),
        }
    }

    fn insert_marked(&mut self, key: &str, value: &str) {
        loop {
            let candidate = format!("{}{}", self.nesting, key);
            self.nesting.push('_');
            if let Entry::Vacant(slot) = self.entries.entry(candidate) {
                slot.insert(value.to_string());
                return;
            }
        }
    }
}

/// Flat, serializable view of a [`LogRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordExport {
    pub category: String,
    pub timestamp: DateTime<Utc>,
    pub severity: u8,
    pub severity_name: String,
    pub message: String,
    pub exception: Option<String>,
    pub stack_trace: Option<String>,
    pub scopes: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Wrapped {
        inner: std::io::Error,
    }

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("request failed")
        }
    }

    impl Error for Wrapped {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.inner)
        }
    }

    fn record_with(scopes: Vec<ScopeValue>) -> LogRecord {
        LogRecord::new("tests", Severity::Information, "hello", None, scopes)
    }

    #[test]
    fn severity_codes_follow_declaration_order() {
        for (code, severity) in Severity::ALL.into_iter().enumerate() {
            assert_eq!(usize::from(severity.code()), code);
        }
        assert!(Severity::ALL.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(Severity::ALL[5].to_string(), "Critical");
    }

    #[test]
    fn duplicate_map_keys_keep_both_values() {
        let record = record_with(vec![
            ScopeValue::map([("k", "v1")]),
            ScopeValue::map([("k", "v2")]),
        ]);
        let flat = record.flattened_scopes();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat["k"], "v1");
        assert_eq!(flat["_k"], "v2");
    }

    #[test]
    fn marker_escalates_after_each_marked_insert() {
        let record = record_with(vec![
            ScopeValue::value("first"),
            ("k", "a").into(),
            ("k", "b").into(),
            ScopeValue::value("second"),
            ("k", 3_i64).into(),
        ]);
        let flat = record.flattened_scopes();
        assert_eq!(flat["_"], "first");
        assert_eq!(flat["k"], "a");
        assert_eq!(flat["__k"], "b");
        assert_eq!(flat["___"], "second");
        assert_eq!(flat["____k"], "3");
    }

    #[test]
    fn marked_key_collision_retries_deeper() {
        let record = record_with(vec![
            ScopeValue::map([("_k", "taken"), ("k", "a")]),
            ("k", "b").into(),
        ]);
        let flat = record.flattened_scopes();
        assert_eq!(flat["_k"], "taken");
        assert_eq!(flat["__k"], "b");
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn captured_error_uses_root_cause() {
        let err = Wrapped {
            inner: std::io::Error::new(std::io::ErrorKind::Other, "Lew"),
        };
        let captured = CapturedError::from_error(&err);
        assert_eq!(captured.message(), "Lew");
        assert_eq!(captured.stack_trace(), "request failed\ncaused by: Lew");
    }

    #[test]
    fn export_carries_severity_code_and_name() {
        let record = LogRecord::new(
            "svc",
            Severity::Warning,
            "disk almost full",
            Some(CapturedError::new("ENOSPC", "trace")),
            vec![ScopeValue::value("job-7")],
        );
        let export = record.export();
        assert_eq!(export.severity, 3);
        assert_eq!(export.severity_name, "Warning");
        assert_eq!(export.exception.as_deref(), Some("ENOSPC"));
        assert_eq!(export.stack_trace.as_deref(), Some("trace"));
        assert_eq!(export.scopes["_"], "job-7");

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["severity_name"], "Warning");
    }

    #[test]
    fn export_without_error_has_no_exception() {
        let export = record_with(Vec::new()).export();
        assert!(export.exception.is_none());
        assert!(export.stack_trace.is_none());
        assert!(export.scopes.is_empty());
    }

    struct Job {
        id: u32,
        stage: &'static str,
    }

    impl TraceInfo for Job {
        fn single_line(&self) -> String {
            format!("job#{} at {}", self.id, self.stage)
        }
    }

    #[test]
    fn trace_info_and_maps_become_scopes() {
        let job = Job { id: 9, stage: "upload" };
        let mut tags = BTreeMap::new();
        tags.insert("region".to_string(), "eu");
        tags.insert("attempt".to_string(), "2");

        let flat = record_with(vec![ScopeValue::from_trace_info(&job), tags.into()]).flattened_scopes();
        assert_eq!(flat["_"], "job#9 at upload");
        assert_eq!(flat["region"], "eu");
        assert_eq!(flat["attempt"], "2");
    }

    #[test]
    fn tracing_levels_map_to_severities() {
        assert_eq!(Severity::from(tracing::Level::INFO), Severity::Information);
        assert_eq!(Severity::from(tracing::Level::WARN), Severity::Warning);
        assert!(Severity::Critical > Severity::Error);
        assert_eq!(Severity::Critical.code(), 5);
    }
}
