use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use courier_core::preemptive_synchronization::OneShot;

use crate::error::{Outcome, TaskError};

pub(crate) type Work<T> = Box<dyn FnOnce() -> Result<T, TaskError> + Send + 'static>;
pub(crate) type Callback<T> = Box<dyn FnOnce(T) + Send + 'static>;

///
/// A unit of work, an optional result callback, and the one-shot slot the
/// work's outcome is written to.
///
// =============================================================================
// STATE MACHINE
// =============================================================================
//
//   Pending ──execute──► Executing ──► Completed / Failed   (slot set)
//      │
//      └──cancel──► Cancelled                               (slot set)
//
//   finished: false ──► true exactly once, by whichever comes first:
//             invoke_callback (delivery) or finish (cancel/no-callback path)
//
// Whoever takes `work` out of its mutex is the only writer of the slot, so
// the slot is set exactly once. `cancel` after the work was taken only flips
// the flag: running work is never interrupted, but the callback is skipped.
//
pub struct CancellableOperation<T> {
    work: Mutex<Option<Work<T>>>,
    callback: Mutex<Option<Callback<T>>>,
    has_callback: bool,
    cancelled: AtomicBool,
    finished: AtomicBool,
    slot: Arc<OneShot<Outcome<T>>>,
}

impl<T> CancellableOperation<T> {
    pub fn new<W>(work: W) -> Self
    where
        T: 'static,
        W: FnOnce() -> T + Send + 'static,
    {
        Self::from_parts(Box::new(move || Ok(work())), None)
    }

    pub fn with_callback<W, C>(work: W, callback: C) -> Self
    where
        T: 'static,
        W: FnOnce() -> T + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        Self::from_parts(Box::new(move || Ok(work())), Some(Box::new(callback)))
    }

    pub(crate) fn from_parts(work: Work<T>, callback: Option<Callback<T>>) -> Self {
        CancellableOperation {
            work: Mutex::new(Some(work)),
            has_callback: callback.is_some(),
            callback: Mutex::new(callback),
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            slot: Arc::new(OneShot::new()),
        }
    }

    /// Run the work unless cancelled and store its outcome.
    ///
    /// A panic in the work is caught and stored as `TaskError::Panicked`.
    /// Later calls return the stored outcome without running anything.
    ///
    pub fn execute(&self) -> &Outcome<T> {
        if let Some(outcome) = self.slot.get() {
            return outcome;
        }

        let Some(work) = lock(&self.work).take() else {
            // Another thread owns the work; its outcome lands in the slot.
            return self.slot.wait();
        };

        let outcome = if self.is_cancelled() {
            drop(work);
            Outcome::Cancelled
        } else {
            match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(result) => Outcome::from(result),
                Err(payload) => Outcome::Failed(TaskError::from_panic(payload)),
            }
        };

        self.slot.set(outcome);
        self.slot.wait()
    }

    /// Hand `value` to the result callback, at most once per operation.
    ///
    /// Does nothing if the operation is already finished or cancelled. A
    /// panic in the callback propagates to the caller.
    ///
    pub fn invoke_callback(&self, value: T) {
        if !self.finish() || self.is_cancelled() {
            return;
        }

        let callback = lock(&self.callback).take();
        if let Some(callback) = callback {
            callback(value);
        }
    }

    /// Request cancellation. Idempotent and best-effort.
    ///
    /// Work that has not started is dropped and the slot resolves to
    /// `Outcome::Cancelled`; work already running completes normally.
    ///
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);

        let work = lock(&self.work).take();
        if let Some(work) = work {
            drop(work);
            self.slot.set(Outcome::Cancelled);
        }
    }

    /// Resolve an operation that will never be executed.
    ///
    pub(crate) fn reject(&self) {
        let work = lock(&self.work).take();
        if let Some(work) = work {
            drop(work);
            self.slot.set(Outcome::Cancelled);
        }
        self.finish();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Set the finished latch. Returns `true` only for the call that set it.
    ///
    pub fn finish(&self) -> bool {
        !self.finished.swap(true, Ordering::AcqRel)
    }

    pub fn has_callback(&self) -> bool {
        self.has_callback
    }

    pub fn result_handle(&self) -> ResultHandle<T> {
        ResultHandle {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Block until the outcome is stored.
    pub fn wait(&self) -> &Outcome<T> {
        self.slot.wait()
    }

    pub fn try_outcome(&self) -> Option<&Outcome<T>> {
        self.slot.get()
    }
}

impl<T: Clone> CancellableOperation<T> {
    /// Block for the outcome. A cancelled operation yields `Err(TaskError::Cancelled)`.
    pub fn result(&self) -> Result<T, TaskError> {
        self.wait().clone().into_result()
    }
}

/// Read side of an operation's one-shot slot, independent of its callback.
///
pub struct ResultHandle<T> {
    slot: Arc<OneShot<Outcome<T>>>,
}

impl<T> ResultHandle<T> {
    pub fn wait(&self) -> &Outcome<T> {
        self.slot.wait()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<&Outcome<T>> {
        self.slot.wait_timeout(timeout)
    }

    pub fn try_outcome(&self) -> Option<&Outcome<T>> {
        self.slot.get()
    }

    pub fn is_ready(&self) -> bool {
        self.slot.is_set()
    }
}

impl<T: Clone> ResultHandle<T> {
    pub fn result(&self) -> Result<T, TaskError> {
        self.wait().clone().into_result()
    }
}

impl<T> Clone for ResultHandle<T> {
    fn clone(&self) -> Self {
        ResultHandle {
            slot: Arc::clone(&self.slot),
        }
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
