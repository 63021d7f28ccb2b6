//! Epoch-based guard implementation using crossbeam-epoch.
//!
//! `EpochGuard` is a zero-sized type. Every container operation pins the
//! current thread for its duration, and unlinked nodes are handed to the
//! global collector, which frees them once every thread pinned at the time
//! of the unlink has unpinned:
//!
//! ```text
//! ConcurrentQueue<Task, EpochGuard>
//!     │
//!     ├── dequeue: epoch::pin() ... CAS head ... defer old sentinel ... unpin
//!     └── collector: frees the sentinel two epochs later
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_core::data_structures::ConcurrentList;
//! use courier_crossbeam::EpochGuard;
//!
//! let list: ConcurrentList<i32, EpochGuard> = ConcurrentList::new();
//! list.insert_front(42);
//!
//! if let Some(val) = list.find_ref(&42) {
//!     println!("Found: {}", *val);
//! }
//!
//! list.remove(&42);
//! ```

use crossbeam_epoch::{self as epoch, Guard as CrossbeamGuard};
use courier_core::guard::Guard;
use std::ops::Deref;

/// Epoch-based memory reclamation guard.
///
/// Unlike `DeferredGuard`, which stores pending destructions inside the
/// container, `EpochGuard` keeps no state and memory is returned while the
/// container is still in use. This makes it the guard for long-lived
/// containers such as a worker pool's task queue.
///
/// - **Pin overhead**: a thread-local check
/// - **Reclamation**: batched, amortized O(1) per node
/// - **Memory**: may accumulate while some thread stays pinned
///
#[derive(Clone, Copy, Default)]
pub struct EpochGuard {
    // Zero-sized - all state is in the global epoch collector
}

impl EpochGuard {
    pub fn new() -> Self {
        EpochGuard {}
    }
}

/// A reference protected by its own epoch pin.
///
/// The node holding the value cannot be reclaimed until the `EpochRef` is
/// dropped, even if the value is removed from its container meanwhile.
///
pub struct EpochRef<'a, T> {
    _guard: CrossbeamGuard,
    reference: &'a T,
}

impl<'a, T> EpochRef<'a, T> {
    /// # Safety
    ///
    /// The referenced data must not be reclaimed while `guard` is pinned.
    ///
    pub(crate) unsafe fn new(guard: CrossbeamGuard, reference: &'a T) -> Self {
        EpochRef {
            _guard: guard,
            reference,
        }
    }

    pub fn get(&self) -> &T {
        self.reference
    }
}

impl<T> Deref for EpochRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.reference
    }
}

impl<T: std::fmt::Display> std::fmt::Display for EpochRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reference)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for EpochRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EpochRef({:?})", self.reference)
    }
}

impl Guard for EpochGuard {
    type GuardedRef<'a, T: 'a> = EpochRef<'a, T>;

    /// A real crossbeam pin, held by the container for one operation.
    type ReadGuard = CrossbeamGuard;

    fn pin() -> Self::ReadGuard {
        epoch::pin()
    }

    unsafe fn defer_destroy<N>(&self, node: *mut N, dealloc: unsafe fn(*mut N)) {
        // Re-entrant pin: the caller is already pinned, so this is a counter bump.
        let guard = epoch::pin();
        unsafe {
            guard.defer_unchecked(move || {
                dealloc(node);
            });
        }
    }

    unsafe fn make_ref<'a, T: 'a>(ptr: *const T) -> Self::GuardedRef<'a, T> {
        // A fresh pin that outlives the caller's operation pin.
        let new_guard = epoch::pin();
        unsafe { EpochRef::new(new_guard, &*ptr) }
    }
}
