use std::sync::atomic::{AtomicPtr, Ordering};

use crate::guard::Guard;

/// A node linked through a single atomically swapped next pointer.
///
pub trait LinkedNode: Sized {
    fn next_ptr(&self) -> &AtomicPtr<Self>;

    /// Load next pointer (Acquire ordering)
    #[inline]
    fn get_next(&self) -> *mut Self {
        self.next_ptr().load(Ordering::Acquire)
    }

    /// Store next pointer (Relaxed ordering, only valid before the node is published)
    #[inline]
    fn set_next_unpublished(&self, ptr: *mut Self) {
        self.next_ptr().store(ptr, Ordering::Relaxed)
    }

    /// CAS next pointer (Release/Relaxed ordering)
    #[inline]
    fn cas_next(&self, expected: *mut Self, new: *mut Self) -> Result<*mut Self, *mut Self> {
        self.next_ptr()
            .compare_exchange(expected, new, Ordering::Release, Ordering::Relaxed)
    }

    /// Deallocate this node.
    ///
    /// # Safety
    /// - The pointer must have been allocated with `Box::new`
    /// - Must only be called once
    /// - Node must not be accessed after this call
    ///
    unsafe fn dealloc_ptr(ptr: *mut Self) {
        unsafe { drop(Box::from_raw(ptr)) };
    }
}

/// A lock-free container built from CAS-linked nodes.
///
/// All three containers share one shape:
///
/// ```text
/// entry pointer(s) ──► node ──► node ──► node ──► NULL
///   (AtomicPtr)         │
///                       └── payload + AtomicPtr next (the only CAS'd field)
/// ```
///
/// An operation pins `Self::Guard`, snapshots the entry pointers, attempts
/// one CAS and retries with backoff on failure. Unlinked nodes are handed to
/// the guard, never freed in place.
///
pub trait ConcurrentContainer<T> {
    type Guard: Guard;

    /// Insert a value at the container's natural insertion point
    /// (queue tail, stack top, list front).
    ///
    fn insert(&self, value: T);

    /// Returns `true` if the container held no values at the moment of the check.
    ///
    fn is_empty(&self) -> bool;

    /// Get the guard that receives unlinked nodes.
    ///
    fn guard(&self) -> &Self::Guard;
}

/// A container that hands values back in its own order (FIFO or LIFO).
///
pub trait TakeContainer<T>: ConcurrentContainer<T> {
    /// Detach one value. Returns `None` when the container is empty; never blocks.
    ///
    fn take(&self) -> Option<T>;

    /// Detach values until the container reports empty.
    ///
    fn drain_to_vec(&self) -> Vec<T> {
        let mut values = Vec::new();
        while let Some(value) = self.take() {
            values.push(value);
        }
        values
    }
}
