use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use courier_crossbeam::EpochQueue;

use crate::error::panic_message;

// Upper bound on one sleep in `run_until_stopped`.
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// A queued callable plus the thread allowed to run it.
///
/// `target == None` lets any polling thread run it.
struct CallbackEnvelope {
    callable: Box<dyn FnOnce() + Send + 'static>,
    target: Option<ThreadId>,
}

impl CallbackEnvelope {
    fn runs_on(&self, thread: ThreadId) -> bool {
        self.target.is_none_or(|target| target == thread)
    }
}

/// Queue of callbacks that only run when polled from their target thread.
///
/// There is no event loop of its own: owning threads call [`drain`] from
/// their loop (or park in [`run_until_stopped`]). An entry reached by a
/// thread it does not belong to is rotated to the back unchanged.
///
/// Stopping never discards entries. `stop` only wakes waiters; posts are
/// still accepted and may still be drained. Entries left when the dispatcher
/// is dropped are dropped with it.
///
/// [`drain`]: ThreadAffineDispatcher::drain
/// [`run_until_stopped`]: ThreadAffineDispatcher::run_until_stopped
pub struct ThreadAffineDispatcher {
    entries: EpochQueue<CallbackEnvelope>,
    // Counted before linking and after unlinking for execution, so it never
    // under-counts the queue. Rotation leaves it unchanged.
    pending: AtomicUsize,
    // Bumped on every post; sleepers wake on change.
    posts: AtomicU64,
    // Threads parked on `posted`. Registered before the predicate check, so
    // a poster reading zero cannot be missed by anyone about to sleep.
    sleepers: AtomicUsize,
    state: Mutex<DispatcherState>,
    posted: Condvar,
}

struct DispatcherState {
    stopped: bool,
}

impl ThreadAffineDispatcher {
    pub fn new() -> Self {
        ThreadAffineDispatcher {
            entries: EpochQueue::new(),
            pending: AtomicUsize::new(0),
            posts: AtomicU64::new(0),
            sleepers: AtomicUsize::new(0),
            state: Mutex::new(DispatcherState { stopped: false }),
            posted: Condvar::new(),
        }
    }

    /// Queue a callable any polling thread may run.
    pub fn post<F>(&self, callable: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_with_affinity(callable, None);
    }

    /// Queue a callable only `thread` may run.
    pub fn post_to<F>(&self, callable: F, thread: ThreadId)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_with_affinity(callable, Some(thread));
    }

    /// Queue a callable for `target`, or for any thread if `None`.
    ///
    /// Lock-free unless some thread is parked in [`wait_for_pending`] or
    /// [`run_until_stopped`]; only then is the state lock taken to wake it.
    ///
    /// [`wait_for_pending`]: ThreadAffineDispatcher::wait_for_pending
    /// [`run_until_stopped`]: ThreadAffineDispatcher::run_until_stopped
    pub fn post_with_affinity<F>(&self, callable: F, target: Option<ThreadId>)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.entries.enqueue(CallbackEnvelope {
            callable: Box::new(callable),
            target,
        });

        self.posts.fetch_add(1, Ordering::SeqCst);
        if self.sleepers.load(Ordering::SeqCst) > 0 {
            // A sleeper holding the lock is either before its predicate check
            // or already parked on the condvar.
            drop(self.lock_state());
            self.posted.notify_all();
        }
    }

    /// Run every entry the calling thread may run. Returns how many ran.
    ///
    pub fn drain(&self) -> usize {
        self.drain_at_most(usize::MAX)
    }

    /// Run at most `max` entries the calling thread may run.
    ///
    /// Each entry present at the start is looked at no more than once, so
    /// entries posted by the callables themselves wait for the next drain.
    ///
    pub fn drain_at_most(&self, max: usize) -> usize {
        let current = thread::current().id();
        let mut budget = self.pending.load(Ordering::Acquire);
        let mut executed = 0;

        while executed < max && budget > 0 {
            let Some(envelope) = self.entries.dequeue() else {
                break;
            };
            budget -= 1;

            if envelope.runs_on(current) {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                Self::run(envelope);
                executed += 1;
            } else {
                self.entries.enqueue(envelope);
            }
        }

        executed
    }

    fn run(envelope: CallbackEnvelope) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(envelope.callable)) {
            tracing::error!(
                panic = %panic_message(payload.as_ref()),
                "dispatcher callback panicked"
            );
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_count() > 0
    }

    /// Entries queued for any thread, including ones this thread cannot run.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Mark the dispatcher closed and wake every waiter. Idempotent.
    ///
    pub fn stop(&self) {
        let first = {
            let mut state = self.lock_state();
            !std::mem::replace(&mut state.stopped, true)
        };
        self.posted.notify_all();

        if first {
            tracing::debug!(pending = self.pending_count(), "dispatcher stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.lock_state().stopped
    }

    /// Block until an entry is pending, the dispatcher stops, or `timeout` elapses.
    ///
    /// Returns `true` if entries are pending on return.
    ///
    pub fn wait_for_pending(&self, timeout: Duration) -> bool {
        let state = self.lock_state();
        self.sleepers.fetch_add(1, Ordering::SeqCst);
        let _state = self
            .posted
            .wait_timeout_while(state, timeout, |state| {
                !state.stopped && self.pending.load(Ordering::SeqCst) == 0
            })
            .unwrap_or_else(PoisonError::into_inner);
        self.sleepers.fetch_sub(1, Ordering::SeqCst);
        self.has_pending()
    }

    /// Drain on the calling thread until the dispatcher is stopped.
    ///
    /// Sleeps between posts instead of spinning over entries that belong to
    /// other threads. Drains once more after the stop. Returns how many ran.
    ///
    pub fn run_until_stopped(&self) -> usize {
        let mut executed = 0;

        loop {
            let seen = self.posts.load(Ordering::SeqCst);
            executed += self.drain();

            let state = self.lock_state();
            if state.stopped {
                drop(state);
                return executed + self.drain();
            }

            self.sleepers.fetch_add(1, Ordering::SeqCst);
            let _state = self
                .posted
                .wait_timeout_while(state, IDLE_WAIT, |state| {
                    !state.stopped && self.posts.load(Ordering::SeqCst) == seen
                })
                .unwrap_or_else(PoisonError::into_inner);
            self.sleepers.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, DispatcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ThreadAffineDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadAffineDispatcher {
    fn drop(&mut self) {
        let pending = *self.pending.get_mut();
        if pending > 0 {
            tracing::warn!(pending, "dispatcher dropped with callbacks still queued");
        }
    }
}
