use crate::error::QueryError;
use crate::record::{LogRecord, Severity};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::Arc;

/// Filter for [`RetentionBuffer::find`](crate::buffer::RetentionBuffer::find).
///
/// The default query matches every record: no severity restriction, an
/// empty message pattern, no exception pattern and no time bound.
#[derive(Clone, Debug, Default)]
pub struct RecordQuery {
    severities: Option<Vec<Severity>>,
    message_pattern: String,
    exception_pattern: Option<String>,
    not_older_than: Option<DateTime<Utc>>,
}

impl RecordQuery {
    /// Match records whose message contains a match of `message_pattern`.
    pub fn new(message_pattern: impl Into<String>) -> Self {
        Self {
            message_pattern: message_pattern.into(),
            ..Self::default()
        }
    }

    pub fn severities(mut self, severities: impl IntoIterator<Item = Severity>) -> Self {
        self.severities = Some(severities.into_iter().collect());
        self
    }

    /// Keep only records with a captured error whose root-cause message
    /// matches `pattern`.
    pub fn exception_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.exception_pattern = Some(pattern.into());
        self
    }

    /// Keep only records stamped at or after `timestamp`.
    pub fn not_older_than(mut self, timestamp: DateTime<Utc>) -> Self {
        self.not_older_than = Some(timestamp);
        self
    }

    pub(crate) fn compile(&self) -> Result<CompiledQuery<'_>, QueryError> {
        Ok(CompiledQuery {
            severities: self.severities.as_deref(),
            message: compile_pattern("message", &self.message_pattern)?,
            exception: self
                .exception_pattern
                .as_deref()
                .map(|pattern| compile_pattern("exception", pattern))
                .transpose()?,
            not_older_than: self.not_older_than,
        })
    }
}

fn compile_pattern(kind: &'static str, pattern: &str) -> Result<Regex, QueryError> {
    Regex::new(pattern).map_err(|source| QueryError::InvalidPattern {
        kind,
        pattern: pattern.to_string(),
        source,
    })
}

pub(crate) struct CompiledQuery<'a> {
    severities: Option<&'a [Severity]>,
    message: Regex,
    exception: Option<Regex>,
    not_older_than: Option<DateTime<Utc>>,
}

impl CompiledQuery<'_> {
    pub(crate) fn matches(&self, record: &LogRecord) -> bool {
        if let Some(severities) = self.severities {
            if !severities.contains(&record.severity()) {
                return false;
            }
        }
        if !self.message.is_match(record.message()) {
            return false;
        }
        if let Some(exception) = &self.exception {
            // Records without an error never reach the pattern.
            match record.error() {
                Some(error) if exception.is_match(error.message()) => {}
                _ => return false,
            }
        }
        if let Some(bound) = self.not_older_than {
            if record.timestamp() < bound {
                return false;
            }
        }
        true
    }
}

/// Matching records from an oldest-first snapshot, newest first.
pub(crate) fn find(
    snapshot: Vec<Arc<LogRecord>>,
    query: &RecordQuery,
) -> Result<Vec<Arc<LogRecord>>, QueryError> {
    let compiled = query.compile()?;
    Ok(snapshot
        .into_iter()
        .rev()
        .filter(|record| compiled.matches(record))
        .collect())
}

/// The newest `limit` records of an oldest-first snapshot, newest first.
pub(crate) fn recent(snapshot: Vec<Arc<LogRecord>>, limit: usize) -> Vec<Arc<LogRecord>> {
    snapshot.into_iter().rev().take(limit).collect()
}
