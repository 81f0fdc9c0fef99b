use crate::error::{BufferError, OptionsError, QueryError};
use crate::eviction::EvictionScheduler;
use crate::layer::RetentionLayer;
use crate::logger::CategoryLogger;
use crate::options::RetentionOptions;
use crate::query::{self, RecordQuery};
use crate::record::{LogRecord, RecordExport, ScopeValue};
use crate::scope::{ScopeGuard, ScopeStack};
use crate::store::RetentionStore;
use crate::INTERNAL_TARGET;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle to an in-memory retention buffer.
///
/// Owns the record store, the eviction scheduler and the ambient scope
/// stack. Cloning the handle is cheap and every clone talks to the same
/// buffer. The eviction cycle stops on [`shutdown`](Self::shutdown) or when
/// the last handle (including loggers and layers) is dropped.
#[derive(Clone)]
pub struct RetentionBuffer {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<RetentionStore>,
    options: Arc<RwLock<RetentionOptions>>,
    scheduler: EvictionScheduler,
    scopes: ScopeStack,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl RetentionBuffer {
    /// Start a buffer on the current tokio runtime and schedule its first
    /// eviction cycle.
    ///
    /// **Errors**
    /// - [`BufferError::Options`] if `options` fail validation.
    /// - [`BufferError::NoRuntime`] when called outside a tokio runtime.
    pub fn start(options: RetentionOptions) -> Result<Self, BufferError> {
        let runtime = Handle::try_current().map_err(|_| BufferError::NoRuntime)?;
        Self::start_on(runtime, options)
    }

    /// Same as [`start`](Self::start) but spawns eviction onto an explicit
    /// runtime, so it can be called from non-runtime threads.
    pub fn start_on(runtime: Handle, options: RetentionOptions) -> Result<Self, BufferError> {
        options.validate()?;

        let store = Arc::new(RetentionStore::new());
        let options = Arc::new(RwLock::new(options));
        let scheduler = EvictionScheduler::new(Arc::clone(&store), Arc::clone(&options), runtime);
        scheduler.restart();

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                options,
                scheduler,
                scopes: ScopeStack::new(),
                accepted: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        })
    }

    /// Create an ingestion adapter for `category`.
    pub fn logger(&self, category: impl Into<String>) -> CategoryLogger {
        CategoryLogger::new(self.clone(), category.into())
    }

    /// Create a `tracing_subscriber` layer that records into this buffer.
    pub fn layer(&self) -> RetentionLayer {
        RetentionLayer::new(self.clone())
    }

    pub fn options(&self) -> RetentionOptions {
        *self.inner.options.read()
    }

    /// Replace the options and restart the eviction cycle so the new
    /// lifetime applies from the next cycle on. Ignored after shutdown.
    pub fn reconfigure(&self, options: RetentionOptions) -> Result<(), OptionsError> {
        options.validate()?;
        let shared = &self.inner.options;
        if self.inner.scheduler.restart_with(|| *shared.write() = options) {
            debug!(target: INTERNAL_TARGET, lifetime = ?options.lifetime, "retention options changed");
        }
        Ok(())
    }

    /// Apply every value published on `updates`, starting with the one it
    /// currently holds if it differs from the active options.
    ///
    /// The returned task ends when the sender is dropped, the buffer shuts
    /// down or the last buffer handle goes away.
    pub fn watch_options(&self, mut updates: watch::Receiver<RetentionOptions>) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let stopped = self.inner.scheduler.stopped_token();

        let initial = *updates.borrow_and_update();
        if initial != self.options() {
            self.apply_update(initial);
        }

        self.inner.scheduler.runtime().spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped.cancelled() => break,
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let options = *updates.borrow_and_update();
                let Some(inner) = weak.upgrade() else { break };
                RetentionBuffer { inner }.apply_update(options);
            }
        })
    }

    fn apply_update(&self, options: RetentionOptions) {
        if let Err(e) = self.reconfigure(options) {
            warn!(target: INTERNAL_TARGET, error = %e, "ignoring invalid retention options");
        }
    }

    /// Records matching `query`, newest first.
    pub fn find(&self, query: &RecordQuery) -> Result<Vec<Arc<LogRecord>>, QueryError> {
        query::find(self.inner.store.snapshot(), query)
    }

    /// Shorthand for [`find`](Self::find) without a severity restriction.
    pub fn find_recent(
        &self,
        message_pattern: &str,
        exception_pattern: Option<&str>,
        not_older_than: Option<DateTime<Utc>>,
    ) -> Result<Vec<Arc<LogRecord>>, QueryError> {
        let mut query = RecordQuery::new(message_pattern);
        if let Some(pattern) = exception_pattern {
            query = query.exception_pattern(pattern);
        }
        if let Some(timestamp) = not_older_than {
            query = query.not_older_than(timestamp);
        }
        self.find(&query)
    }

    /// The newest `limit` retained records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Arc<LogRecord>> {
        query::recent(self.inner.store.snapshot(), limit)
    }

    /// Export views of the newest `limit` records, newest first.
    pub fn export_recent(&self, limit: usize) -> Vec<RecordExport> {
        self.recent(limit).iter().map(|record| record.export()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Number of eviction cycle tasks currently alive.
    pub fn active_cycles(&self) -> usize {
        self.inner.scheduler.active_cycles()
    }

    /// Records accepted into the store since start.
    pub fn accepted_records(&self) -> u64 {
        self.inner.accepted.load(Ordering::Relaxed)
    }

    /// Records lost because shaping or appending failed.
    pub fn dropped_records(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Stop eviction for good. Records stay queryable; later
    /// reconfigurations are ignored.
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
        debug!(target: INTERNAL_TARGET, "retention buffer shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.scheduler.is_stopped()
    }

    pub(crate) fn begin_scope(&self, value: ScopeValue) -> ScopeGuard {
        self.inner.scopes.push(value)
    }

    pub(crate) fn ambient_scopes(&self) -> Vec<ScopeValue> {
        self.inner.scopes.current()
    }

    /// Shape and append a record, swallowing any failure. Returns whether
    /// the record made it into the store.
    pub(crate) fn ingest<F>(&self, shape: F) -> bool
    where
        F: FnOnce() -> LogRecord,
    {
        let store = &self.inner.store;
        match panic::catch_unwind(AssertUnwindSafe(|| store.append(shape()))) {
            Ok(()) => {
                self.inner.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

impl std::fmt::Debug for RetentionBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionBuffer")
            .field("options", &self.options())
            .field("records", &self.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Severity;
    use std::time::Duration;

    #[test]
    fn start_outside_runtime_is_an_error() {
        let err = RetentionBuffer::start(RetentionOptions::default()).unwrap_err();
        assert!(matches!(err, BufferError::NoRuntime));
    }

    #[tokio::test]
    async fn zero_lifetime_is_rejected() {
        let err = RetentionBuffer::start(RetentionOptions::with_lifetime(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, BufferError::Options(OptionsError::ZeroLifetime)));

        let buffer = RetentionBuffer::start(RetentionOptions::default()).unwrap();
        assert!(buffer
            .reconfigure(RetentionOptions::with_lifetime(Duration::ZERO))
            .is_err());
        assert_eq!(buffer.options(), RetentionOptions::default());
    }

    #[tokio::test]
    async fn panicking_shaper_is_counted_not_propagated() {
        let buffer = RetentionBuffer::start(RetentionOptions::default()).unwrap();
        assert!(!buffer.ingest(|| panic!("bad state")));
        assert!(buffer.ingest(|| LogRecord::new("t", Severity::Information, "ok", None, Vec::new())));
        assert_eq!(buffer.dropped_records(), 1);
        assert_eq!(buffer.accepted_records(), 1);
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test]
    async fn buffers_are_isolated() {
        let a = RetentionBuffer::start(RetentionOptions::default()).unwrap();
        let b = RetentionBuffer::start(RetentionOptions::default()).unwrap();
        a.logger("a").info("only in a");
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }
}
