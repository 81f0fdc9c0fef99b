use crate::options::RetentionOptions;
use crate::store::RetentionStore;
use crate::INTERNAL_TARGET;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Background sleep-then-purge loop over a [`RetentionStore`].
///
/// Every restart cancels the running cycle before spawning its
/// replacement, under one lock, so at most one loop is ever scheduled.
/// Once [`shutdown`](Self::shutdown) has been called restarts are refused.
pub(crate) struct EvictionScheduler {
    store: Arc<RetentionStore>,
    options: Arc<RwLock<RetentionOptions>>,
    runtime: Handle,
    state: Mutex<SchedulerState>,
    active: Arc<AtomicUsize>,
    stopped: CancellationToken,
}

struct SchedulerState {
    current: Option<CancellationToken>,
}

impl EvictionScheduler {
    pub(crate) fn new(
        store: Arc<RetentionStore>,
        options: Arc<RwLock<RetentionOptions>>,
        runtime: Handle,
    ) -> Self {
        Self {
            store,
            options,
            runtime,
            state: Mutex::new(SchedulerState { current: None }),
            active: Arc::new(AtomicUsize::new(0)),
            stopped: CancellationToken::new(),
        }
    }

    /// Cancel the in-flight cycle (if any) and start a fresh one that reads
    /// the current lifetime. Returns `false` after shutdown.
    pub(crate) fn restart(&self) -> bool {
        self.restart_with(|| {})
    }

    /// Like [`restart`](Self::restart), but runs `update` first while
    /// holding the lock that [`shutdown`](Self::shutdown) takes. `update` is
    /// not run once the scheduler is stopped.
    pub(crate) fn restart_with<F: FnOnce()>(&self, update: F) -> bool {
        let mut state = self.state.lock();
        if self.stopped.is_cancelled() {
            return false;
        }
        update();

        if let Some(previous) = state.current.take() {
            previous.cancel();
        }

        let token = self.stopped.child_token();
        state.current = Some(token.clone());

        let guard = CycleGuard::enter(Arc::clone(&self.active));
        let store = Arc::clone(&self.store);
        self.runtime.spawn(run_cycles(
            move |cutoff| store.purge_older_than(cutoff),
            Arc::clone(&self.options),
            token,
            guard,
        ));
        true
    }

    /// Cancel the active cycle permanently.
    pub(crate) fn shutdown(&self) {
        let mut state = self.state.lock();
        self.stopped.cancel();
        state.current = None;
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    /// Token cancelled on shutdown, for tasks that should end with the
    /// scheduler.
    pub(crate) fn stopped_token(&self) -> CancellationToken {
        self.stopped.clone()
    }

    pub(crate) fn active_cycles(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

impl Drop for EvictionScheduler {
    fn drop(&mut self) {
        self.stopped.cancel();
    }
}

/// Counts live cycle tasks; decremented however the task ends.
struct CycleGuard(Arc<AtomicUsize>);

impl CycleGuard {
    fn enter(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(active)
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn run_cycles<P>(
    purge: P,
    options: Arc<RwLock<RetentionOptions>>,
    token: CancellationToken,
    _guard: CycleGuard,
) where
    P: Fn(DateTime<Utc>) -> usize + Send + 'static,
{
    loop {
        let lifetime = options.read().lifetime;
        let cycle_start = Utc::now();
        debug!(target: INTERNAL_TARGET, ?lifetime, "eviction cycle scheduled");

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(target: INTERNAL_TARGET, "eviction cycle cancelled");
                return;
            }
            _ = sleep(lifetime) => {}
        }

        if token.is_cancelled() {
            return;
        }

        if let Some(purged) = run_purge(|| purge(cycle_start)) {
            debug!(target: INTERNAL_TARGET, purged, "eviction cycle completed");
        }
    }
}

/// Run one purge step. A panic is logged and reported as `None` so the
/// schedule keeps going.
fn run_purge(purge: impl FnOnce() -> usize) -> Option<usize> {
    match panic::catch_unwind(AssertUnwindSafe(purge)) {
        Ok(purged) => Some(purged),
        Err(_) => {
            warn!(target: INTERNAL_TARGET, "eviction cycle failed, rescheduling");
            None
        }
    }
}
