//! Deferred guard implementation for testing.

#[cfg(debug_assertions)]
use std::collections::HashSet;
use std::ops::Deref;
use std::sync::{Mutex, PoisonError};

use super::Guard;

/// A guard that defers all node destruction until the guard itself is dropped.
///
/// The guard lives inside the container, so nodes unlinked during the
/// container's lifetime are released together with the container. Memory
/// grows with every unlink, which makes this guard a fit for tests and
/// short-lived containers only.
///
pub struct DeferredGuard {
    deferred: Mutex<Vec<DeferredNode>>,
    // Addresses already deferred; a repeat means a node was unlinked twice.
    #[cfg(debug_assertions)]
    seen: Mutex<HashSet<usize>>,
}

struct DeferredNode {
    ptr: *mut (),
    dealloc: unsafe fn(*mut ()),
}

// Safety: the node is unlinked, so the pointer is owned by the guard alone.
unsafe impl Send for DeferredNode {}

impl DeferredGuard {
    pub fn new() -> Self {
        DeferredGuard {
            deferred: Mutex::new(Vec::new()),
            #[cfg(debug_assertions)]
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Number of nodes waiting for destruction.
    pub fn deferred_count(&self) -> usize {
        self.deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for DeferredGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeferredGuard {
    fn drop(&mut self) {
        let nodes = self
            .deferred
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);

        for node in nodes.drain(..) {
            unsafe {
                (node.dealloc)(node.ptr);
            }
        }
    }
}

/// A plain reference for DeferredGuard.
///
/// Nothing is freed before the container drops, so a borrow of the container
/// is all the protection needed.
///
pub struct DeferredRef<'a, T> {
    data: &'a T,
}

impl<'a, T> DeferredRef<'a, T> {
    pub fn new(data: &'a T) -> Self {
        DeferredRef { data }
    }
}

impl<T> Deref for DeferredRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for DeferredRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeferredRef({:?})", self.data)
    }
}

impl Guard for DeferredGuard {
    type GuardedRef<'a, T: 'a> = DeferredRef<'a, T>;

    type ReadGuard = ();

    fn pin() -> Self::ReadGuard {}

    unsafe fn defer_destroy<N>(&self, node: *mut N, dealloc: unsafe fn(*mut N)) {
        #[cfg(debug_assertions)]
        {
            let addr = node as usize;
            let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
            if !seen.insert(addr) {
                panic!("node {:#x} deferred twice", addr);
            }
        }

        let node = DeferredNode {
            ptr: node as *mut (),
            dealloc: unsafe {
                std::mem::transmute::<unsafe fn(*mut N), unsafe fn(*mut ())>(dealloc)
            },
        };
        self.deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(node);
    }

    unsafe fn make_ref<'a, T: 'a>(ptr: *const T) -> Self::GuardedRef<'a, T> {
        DeferredRef::new(unsafe { &*ptr })
    }
}
