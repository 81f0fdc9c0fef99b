use crate::buffer::RetentionBuffer;
use crate::record::{CapturedError, LogRecord, ScopeValue, Severity};
use crate::scope::ScopeGuard;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Per-category ingestion adapter.
///
/// Holds its category name and a handle to the shared buffer. Every call is
/// accepted regardless of severity; filtering is left to whatever sits in
/// front of the logger. Logging never fails from the caller's point of
/// view.
pub struct CategoryLogger {
    buffer: RetentionBuffer,
    category: String,
    sample_counter: AtomicU32,
}

impl CategoryLogger {
    pub(crate) fn new(buffer: RetentionBuffer, category: String) -> Self {
        Self {
            buffer,
            category,
            sample_counter: AtomicU32::new(0),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Capture one event together with the scopes currently open on this
    /// thread, outermost first.
    pub fn log(
        &self,
        severity: Severity,
        message: impl fmt::Display,
        error: Option<&(dyn Error + 'static)>,
    ) {
        self.buffer.ingest(|| {
            LogRecord::new(
                self.category.as_str(),
                severity,
                message.to_string(),
                error.map(CapturedError::from_error),
                self.buffer.ambient_scopes(),
            )
        });
    }

    /// Attach `value` to every record logged on this thread until the
    /// returned guard is dropped.
    pub fn begin_scope(&self, value: impl Into<ScopeValue>) -> ScopeGuard {
        self.buffer.begin_scope(value.into())
    }

    pub fn trace(&self, message: impl fmt::Display) {
        self.log(Severity::Trace, message, None);
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Severity::Debug, message, None);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(Severity::Information, message, None);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Severity::Warning, message, None);
    }

    pub fn error(&self, error: &(dyn Error + 'static), message: impl fmt::Display) {
        self.log(Severity::Error, message, Some(error));
    }

    pub fn critical(&self, error: &(dyn Error + 'static), message: impl fmt::Display) {
        self.log(Severity::Critical, message, Some(error));
    }

    /// Log something expensive only at a sampled rate.
    ///
    /// `message` always goes out at [`Severity::Trace`]. `action` then
    /// receives the logger and the message prefixed with
    /// `[Sampled at N%]`: for a rate between 1 and 99 the first `N` of
    /// every 100 calls pass, a rate of 100 or more always passes and 0
    /// never does.
    pub fn sampled<F>(&self, message: &str, rate_percent: u32, action: F)
    where
        F: FnOnce(&CategoryLogger, String),
    {
        self.trace(message);

        let pass = match rate_percent {
            0 => false,
            100.. => true,
            rate => {
                let sample = self.sample_counter.fetch_add(1, Ordering::Relaxed) + 1;
                if sample >= 100 {
                    self.sample_counter.store(0, Ordering::Relaxed);
                }
                sample <= rate
            }
        };

        if pass {
            action(self, format!("[Sampled at {rate_percent}%] {message}"));
        }
    }
}

impl fmt::Debug for CategoryLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CategoryLogger")
            .field("category", &self.category)
            .finish()
    }
}
