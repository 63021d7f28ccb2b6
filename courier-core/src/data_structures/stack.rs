use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crossbeam::utils::Backoff;

use crate::data_structures::{ConcurrentContainer, LinkedNode, TakeContainer};
use crate::guard::Guard;

///
/// Unbounded LIFO stack, Treiber's algorithm.
///
/// `top` is either NULL (empty) or a live node. `push` links a node in front
/// of `top`, `pop` swings `top` to its successor and moves the payload out of
/// the detached node. The guard keeps a popped node allocated while slower
/// poppers may still read its next pointer, which also rules out ABA on `top`.
///
pub struct ConcurrentStack<T, G: Guard> {
    top: AtomicPtr<StackNode<T>>,
    guard: G,
    _marker: PhantomData<*const T>,
}

unsafe impl<T: Send, G: Guard> Send for ConcurrentStack<T, G> {}
unsafe impl<T: Send, G: Guard> Sync for ConcurrentStack<T, G> {}

struct StackNode<T> {
    // Moved out by the winning pop; the node is then freed without dropping it.
    data: ManuallyDrop<T>,
    next: AtomicPtr<StackNode<T>>,
}

impl<T> LinkedNode for StackNode<T> {
    fn next_ptr(&self) -> &AtomicPtr<Self> {
        &self.next
    }
}

impl<T, G: Guard> ConcurrentStack<T, G> {
    pub fn new() -> Self {
        ConcurrentStack {
            top: AtomicPtr::new(ptr::null_mut()),
            guard: G::default(),
            _marker: PhantomData,
        }
    }

    pub fn push(&self, value: T) {
        let new_node = Box::into_raw(Box::new(StackNode {
            data: ManuallyDrop::new(value),
            next: AtomicPtr::new(ptr::null_mut()),
        }));
        let backoff = Backoff::new();

        let mut top = self.top.load(Ordering::Relaxed);
        loop {
            unsafe { (*new_node).set_next_unpublished(top) };

            match self.top.compare_exchange_weak(
                top,
                new_node,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => {
                    top = actual;
                    backoff.spin();
                }
            }
        }
    }

    /// Remove the most recently pushed value. Returns `None` if the stack is empty.
    ///
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        let _guard = G::pin();

        loop {
            let top = self.top.load(Ordering::Acquire);
            if top.is_null() {
                return None;
            }

            let next = unsafe { (*top).get_next() };

            if self
                .top
                .compare_exchange_weak(top, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let value = unsafe { ptr::read(&*(*top).data) };

                unsafe {
                    self.guard
                        .defer_destroy(top, <StackNode<T> as LinkedNode>::dealloc_ptr);
                }

                return Some(value);
            }

            backoff.spin();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.top.load(Ordering::Acquire).is_null()
    }

    pub fn guard(&self) -> &G {
        &self.guard
    }
}

impl<T, G: Guard> Default for ConcurrentStack<T, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, G: Guard> Drop for ConcurrentStack<T, G> {
    fn drop(&mut self) {
        let mut node = *self.top.get_mut();

        while !node.is_null() {
            unsafe {
                let next = (*node).next.load(Ordering::Relaxed);
                ManuallyDrop::drop(&mut (*node).data);
                <StackNode<T> as LinkedNode>::dealloc_ptr(node);
                node = next;
            }
        }
    }
}

impl<T, G: Guard> ConcurrentContainer<T> for ConcurrentStack<T, G> {
    type Guard = G;

    fn insert(&self, value: T) {
        self.push(value)
    }

    fn is_empty(&self) -> bool {
        ConcurrentStack::is_empty(self)
    }

    fn guard(&self) -> &Self::Guard {
        &self.guard
    }
}

impl<T, G: Guard> TakeContainer<T> for ConcurrentStack<T, G> {
    fn take(&self) -> Option<T> {
        self.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::DeferredGuard;

    type TestStack<T> = ConcurrentStack<T, DeferredGuard>;

    #[test]
    fn test_empty_stack() {
        let stack: TestStack<i32> = TestStack::new();
        assert!(stack.is_empty());
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn test_lifo_order() {
        let stack: TestStack<i32> = TestStack::new();
        for i in 0..100 {
            stack.push(i);
        }

        for i in (0..100).rev() {
            assert_eq!(stack.pop(), Some(i));
        }
        assert!(stack.is_empty());
    }

    #[test]
    fn test_popped_nodes_are_deferred() {
        let stack: TestStack<Vec<u8>> = TestStack::new();
        stack.push(vec![1]);
        stack.push(vec![2, 2]);

        assert_eq!(stack.pop(), Some(vec![2, 2]));
        assert_eq!(stack.guard().deferred_count(), 1);

        // The remaining node is released by the stack's Drop, not by the guard.
    }
}
