//! Guard trait for memory reclamation strategies.
//!
//! Every container in this crate unlinks nodes with a CAS and then hands them
//! to a `Guard` instead of freeing them. The guard decides when the memory is
//! actually released, after no concurrent traversal can still reach it.
//!
//! ```text
//! ConcurrentQueue<T, G: Guard>
//!     │
//!     ├── ConcurrentQueue<T, EpochGuard>      (production, courier-crossbeam)
//!     └── ConcurrentQueue<T, DeferredGuard>   (testing)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_core::data_structures::ConcurrentStack;
//! use courier_core::guard::DeferredGuard;
//!
//! let stack: ConcurrentStack<i32, DeferredGuard> = ConcurrentStack::new();
//! stack.push(42);
//! assert_eq!(stack.pop(), Some(42));
//! ```

mod deferred_guard;

use std::ops::Deref;

pub use deferred_guard::{DeferredGuard, DeferredRef};

/// A memory reclamation guard that protects concurrent access to nodes.
///
/// - **EpochGuard**: low overhead, batched reclamation (crossbeam-epoch)
/// - **DeferredGuard**: frees everything when the container drops (testing)
///
/// # Safety Contract
///
/// Implementations must ensure:
/// 1. Nodes passed to `defer_destroy` are not freed while any thread that
///    pinned before the call may still dereference them
/// 2. `GuardedRef` keeps the referenced data valid for its lifetime
///
/// Guards are stored inside containers, so they must be `Send + Sync`.
/// Pinning happens per operation, not when the guard is created.
///
pub trait Guard: Sized + Default + Send + Sync {
    /// A reference protected by a guard of this type.
    ///
    type GuardedRef<'a, T: 'a>: Deref<Target = T>;

    /// An active guard that protects node reads for its lifetime.
    ///
    type ReadGuard: Sized;

    /// Pin an active read guard.
    ///
    /// Containers hold the returned value for the whole operation: from the
    /// first load of an entry pointer until the last node dereference.
    ///
    fn pin() -> Self::ReadGuard;

    /// Schedule a node for deferred destruction.
    ///
    /// # Safety
    ///
    /// - `node` must be a valid pointer previously allocated by the container
    /// - `node` must be unlinked (not reachable from any entry pointer)
    /// - `node` must be passed here exactly once
    /// - `dealloc` must be the correct deallocation function for `node`
    /// - whatever `dealloc` drops must be safe to drop on any thread after
    ///   the container is gone; a node still owning its payload needs a
    ///   `Send + 'static` payload
    ///
    unsafe fn defer_destroy<N>(&self, node: *mut N, dealloc: unsafe fn(*mut N));

    /// Create a guarded reference from a raw pointer.
    ///
    /// # Safety
    ///
    /// - `ptr` must point to data protected by a currently pinned read guard
    /// - The data must remain valid for lifetime `'a`
    ///
    unsafe fn make_ref<'a, T: 'a>(ptr: *const T) -> Self::GuardedRef<'a, T>;
}
