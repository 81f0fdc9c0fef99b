use crate::record::ScopeValue;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);
static NEXT_FRAME: AtomicU64 = AtomicU64::new(1);

struct Frame {
    owner: u64,
    id: u64,
    value: ScopeValue,
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Ambient scope stack of one retention buffer.
///
/// Frames live in thread-local storage tagged with the owning buffer, so a
/// scope opened on one thread is only visible to records produced on that
/// thread, and two buffers never see each other's frames.
#[derive(Debug)]
pub(crate) struct ScopeStack {
    owner: u64,
}

impl ScopeStack {
    pub(crate) fn new() -> Self {
        Self {
            owner: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub(crate) fn push(&self, value: ScopeValue) -> ScopeGuard {
        let id = NEXT_FRAME.fetch_add(1, Ordering::Relaxed);
        FRAMES.with(|frames| {
            frames.borrow_mut().push(Frame {
                owner: self.owner,
                id,
                value,
            })
        });
        ScopeGuard {
            id,
            _not_send: PhantomData,
        }
    }

    /// Current frames of this stack on the calling thread, outermost first.
    pub(crate) fn current(&self) -> Vec<ScopeValue> {
        FRAMES
            .try_with(|frames| {
                frames
                    .borrow()
                    .iter()
                    .filter(|frame| frame.owner == self.owner)
                    .map(|frame| frame.value.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Keeps a scope value attached to records logged on this thread until it
/// is dropped.
#[must_use = "the scope ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ScopeGuard {
    id: u64,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let id = self.id;
        // Thread-local may already be gone during thread teardown.
        let _ = FRAMES.try_with(|frames| {
            let mut frames = frames.borrow_mut();
            if let Some(pos) = frames.iter().rposition(|frame| frame.id == id) {
                frames.remove(pos);
            }
        });
    }
}
