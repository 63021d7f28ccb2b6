use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crossbeam::utils::Backoff;

use crate::data_structures::{ConcurrentContainer, LinkedNode, TakeContainer};
use crate::guard::Guard;

type NodePtr<T> = *mut QueueNode<T>;

///
/// Unbounded MPMC FIFO queue based on Michael and Scott's paper
/// 'Simple, Fast, and Practical Non-Blocking and Blocking Concurrent Queue Algorithms'.
///
// =============================================================================
// QUEUE INVARIANTS
// =============================================================================
//
// ┌──────────┐    ┌──────┐    ┌──────┐    ┌──────┐
// │ SENTINEL │───►│  A   │───►│  B   │───►│ NULL │
// │ (no data)│    │      │    │      │    │      │
// └──────────┘    └──────┘    └──────┘    └──────┘
//      ▲                          ▲
//     head                       tail (or one node behind it)
//
// 1. head always points to a sentinel whose payload is absent (never NULL)
// 2. tail points to the last node or to the node right before it, never ahead
// 3. a node's payload is moved out exactly once, by the thread whose head CAS
//    turned that node into the new sentinel
// 4. the old sentinel is unreachable after the head CAS and goes to the guard
//
// ENQUEUE: CAS last.next from NULL to the new node, then swing tail (best effort).
//          A thread that sees tail.next != NULL swings tail for the stalled writer.
//
// DEQUEUE: head == tail && head.next == NULL  → empty
//          head == tail && head.next != NULL  → tail is lagging, swing it, retry
//          otherwise CAS head to head.next, then move the payload out of the
//          new sentinel and defer the old sentinel.
//
// The payload is read after the CAS, not before: only the winner touches it,
// and the node it lives in stays allocated because it is now the sentinel.
//
pub struct ConcurrentQueue<T, G: Guard> {
    head: AtomicPtr<QueueNode<T>>,
    tail: AtomicPtr<QueueNode<T>>,
    /// Receives every sentinel retired by a dequeue.
    guard: G,
    _marker: PhantomData<*const T>,
}

// Values move between threads through the queue; the queue never shares `&T`.
unsafe impl<T: Send, G: Guard> Send for ConcurrentQueue<T, G> {}
unsafe impl<T: Send, G: Guard> Sync for ConcurrentQueue<T, G> {}

struct QueueNode<T> {
    data: MaybeUninit<T>,
    next: AtomicPtr<QueueNode<T>>,
}

impl<T> QueueNode<T> {
    fn new(value: T) -> Self {
        QueueNode {
            data: MaybeUninit::new(value),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    fn new_sentinel() -> Self {
        QueueNode {
            data: MaybeUninit::uninit(),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Move the payload out of the node.
    ///
    /// # Safety
    /// The payload must be initialized and must not be read again.
    unsafe fn take_data(&self) -> T {
        unsafe { ptr::read(self.data.as_ptr()) }
    }
}

impl<T> LinkedNode for QueueNode<T> {
    fn next_ptr(&self) -> &AtomicPtr<Self> {
        &self.next
    }
}

impl<T, G: Guard> ConcurrentQueue<T, G> {
    pub fn new() -> Self {
        let sentinel = Box::into_raw(Box::new(QueueNode::new_sentinel()));
        ConcurrentQueue {
            head: AtomicPtr::new(sentinel),
            tail: AtomicPtr::new(sentinel),
            guard: G::default(),
            _marker: PhantomData,
        }
    }

    /// Append a value at the tail. Never blocks and never fails.
    ///
    pub fn enqueue(&self, value: T) {
        let new_node: NodePtr<T> = Box::into_raw(Box::new(QueueNode::new(value)));
        let backoff = Backoff::new();
        let _guard = G::pin();

        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let next = unsafe { (*tail).get_next() };

            // Snapshot is stale, tail moved while we were reading.
            if tail != self.tail.load(Ordering::Acquire) {
                continue;
            }

            if next.is_null() {
                if unsafe { (*tail).cas_next(ptr::null_mut(), new_node) }.is_ok() {
                    // Failure means another thread already swung tail for us.
                    let _ = self.tail.compare_exchange(
                        tail,
                        new_node,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                    return;
                }
                backoff.spin();
            } else {
                // A writer linked a node but has not advanced tail yet.
                let _ =
                    self.tail
                        .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
            }
        }
    }

    /// Remove the value at the head. Returns `None` if the queue is empty.
    ///
    pub fn dequeue(&self) -> Option<T> {
        let backoff = Backoff::new();
        let _guard = G::pin();

        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            let next = unsafe { (*head).get_next() };

            if head != self.head.load(Ordering::Acquire) {
                continue;
            }

            if next.is_null() {
                return None;
            }

            if head == tail {
                let _ =
                    self.tail
                        .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
                continue;
            }

            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                // `next` is the new sentinel; its payload is ours alone.
                let value = unsafe { (*next).take_data() };

                unsafe {
                    self.guard
                        .defer_destroy(head, <QueueNode<T> as LinkedNode>::dealloc_ptr);
                }

                return Some(value);
            }

            backoff.spin();
        }
    }

    pub fn is_empty(&self) -> bool {
        let _guard = G::pin();
        let head = self.head.load(Ordering::Acquire);
        unsafe { (*head).get_next().is_null() }
    }

    pub fn guard(&self) -> &G {
        &self.guard
    }
}

impl<T, G: Guard> Default for ConcurrentQueue<T, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, G: Guard> Drop for ConcurrentQueue<T, G> {
    fn drop(&mut self) {
        // Exclusive access: free the sentinel, then every node still holding a payload.
        //
        let sentinel = *self.head.get_mut();
        let mut node = unsafe { (*sentinel).next.load(Ordering::Relaxed) };
        unsafe { <QueueNode<T> as LinkedNode>::dealloc_ptr(sentinel) };

        while !node.is_null() {
            unsafe {
                let next = (*node).next.load(Ordering::Relaxed);
                ptr::drop_in_place((*node).data.as_mut_ptr());
                <QueueNode<T> as LinkedNode>::dealloc_ptr(node);
                node = next;
            }
        }
    }
}

impl<T, G: Guard> ConcurrentContainer<T> for ConcurrentQueue<T, G> {
    type Guard = G;

    fn insert(&self, value: T) {
        self.enqueue(value)
    }

    fn is_empty(&self) -> bool {
        ConcurrentQueue::is_empty(self)
    }

    fn guard(&self) -> &Self::Guard {
        &self.guard
    }
}

impl<T, G: Guard> TakeContainer<T> for ConcurrentQueue<T, G> {
    fn take(&self) -> Option<T> {
        self.dequeue()
    }
}
