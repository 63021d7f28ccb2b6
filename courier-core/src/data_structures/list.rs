use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crossbeam::utils::Backoff;

use crate::data_structures::MarkedPtr;
use crate::data_structures::{ConcurrentContainer, LinkedNode};
use crate::guard::Guard;

type NodePtr<T> = *mut ListNode<T>;
type LinkPtr<T> = *const AtomicPtr<ListNode<T>>;

// =============================================================================
// LIST INVARIANTS & REMOVE OPERATION
// =============================================================================
//
// ┌──────┐    ┌──────┐    ┌──────┐    ┌──────┐
// │ head │───►│  7   │───►│  3   │───►│ NULL │
// └──────┘    └──────┘    └──────┘    └──────┘
//
// 1. head is NULL (empty) or points to a node
// 2. a node whose next pointer carries the mark bit is logically removed;
//    its next pointer never changes again
// 3. only marked nodes are unlinked, each by exactly one successful CAS on its
//    predecessor link, and that CAS winner hands the node to the guard
// 4. no linked node ever points at an unlinked node
//
// REMOVE (two phases):
//
//   Phase 1 - mark curr.next (logical delete, linearization point):
//          pred ──────► curr ──╳───► next
//
//   Phase 2 - one attempt to CAS pred.next from curr to next:
//          pred ─────────────────────► next
//
// A losing mark CAS against another remover reports "not removed". A losing
// unlink CAS is left to traversals, which snip every marked node they pass.
//
// Without the mark, removing two adjacent nodes concurrently can leave the
// second one reachable through the first one's stale predecessor after it
// was handed to the guard; with the mark, the CAS on a marked predecessor fails.
//
struct ListNode<T> {
    data: T,
    next: AtomicPtr<ListNode<T>>,
}

impl<T> ListNode<T> {
    fn new(value: T) -> Self {
        ListNode {
            data: value,
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl<T> LinkedNode for ListNode<T> {
    fn next_ptr(&self) -> &AtomicPtr<Self> {
        &self.next
    }
}

///
/// Unordered lock-free singly linked list addressed by value.
///
/// Unlinked nodes still own their payload, so the guard drops `T` later and
/// possibly on another thread, after the list itself may be gone. Hence
/// `T: Send + 'static`: a removed value must not borrow anything and must be
/// droppable anywhere.
///
pub struct ConcurrentList<T: Send + 'static, G: Guard> {
    head: AtomicPtr<ListNode<T>>,
    /// Receives every node unlinked by a remover or by a helping traversal.
    guard: G,
    _marker: PhantomData<*const T>,
}

unsafe impl<T: Send + 'static, G: Guard> Send for ConcurrentList<T, G> {}
// `find_ref` shares `&T` across threads.
unsafe impl<T: Send + Sync + 'static, G: Guard> Sync for ConcurrentList<T, G> {}

impl<T: Send + 'static, G: Guard> ConcurrentList<T, G> {
    pub fn new() -> Self {
        ConcurrentList {
            head: AtomicPtr::new(ptr::null_mut()),
            guard: G::default(),
            _marker: PhantomData,
        }
    }

    pub fn guard(&self) -> &G {
        &self.guard
    }

    /// Link a value in front of the current first node.
    ///
    pub fn insert_front(&self, value: T) {
        let new_node = Box::into_raw(Box::new(ListNode::new(value)));
        let backoff = Backoff::new();

        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            unsafe { (*new_node).set_next_unpublished(head) };

            match self.head.compare_exchange_weak(
                head,
                new_node,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => {
                    head = actual;
                    backoff.spin();
                }
            }
        }
    }

    /// Returns `true` if the list had no live values when traversed.
    ///
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count the live values. The result is a snapshot that concurrent
    /// inserts and removes may already have changed.
    ///
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.for_each_live(|_| count += 1);
        count
    }

    /// Visit every node that was not logically removed when reached.
    ///
    fn for_each_live<F>(&self, mut f: F)
    where
        F: FnMut(&T),
    {
        let _guard = G::pin();

        let mut curr = self.head.load(Ordering::Acquire);
        while !curr.is_null() {
            let next = MarkedPtr::new(unsafe { (*curr).get_next() });
            if !next.is_marked() {
                f(unsafe { &(*curr).data });
            }
            curr = next.as_ptr();
        }
    }

    /// Unlink a marked node from `pred_link`.
    ///
    /// Returns `true` if this call performed the unlink and deferred the node.
    ///
    /// # Safety
    /// The caller must be pinned, `pred_link` and `marked_node` must be valid,
    /// and `next` must be the unmasked successor of `marked_node`.
    ///
    unsafe fn try_unlink(
        &self,
        pred_link: LinkPtr<T>,
        marked_node: NodePtr<T>,
        next: NodePtr<T>,
    ) -> bool {
        let unlinked = unsafe {
            (*pred_link)
                .compare_exchange(marked_node, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        };

        if unlinked {
            unsafe {
                self.guard
                    .defer_destroy(marked_node, <ListNode<T> as LinkedNode>::dealloc_ptr);
            }
        }

        unlinked
    }
}

impl<T: PartialEq + Send + 'static, G: Guard> ConcurrentList<T, G> {
    /// Find the first live node holding `value`, snipping marked nodes on the way.
    ///
    /// Returns the link that points at the node together with the node.
    ///
    /// # Safety
    /// The caller must stay pinned while using the returned pointers.
    ///
    unsafe fn search(&self, value: &T) -> Option<(LinkPtr<T>, NodePtr<T>)> {
        let backoff = Backoff::new();

        'retry: loop {
            let mut pred_link: LinkPtr<T> = &self.head;
            let mut curr = unsafe { (*pred_link).load(Ordering::Acquire) };

            loop {
                if curr.is_null() {
                    return None;
                }

                let next = MarkedPtr::new(unsafe { (*curr).get_next() });

                if next.is_marked() {
                    // curr is logically removed, help unlink it.
                    if unsafe { self.try_unlink(pred_link, curr, next.as_ptr()) } {
                        curr = next.as_ptr();
                        continue;
                    }

                    // The predecessor was marked or changed under us.
                    backoff.spin();
                    continue 'retry;
                }

                if unsafe { &(*curr).data } == value {
                    return Some((pred_link, curr));
                }

                pred_link = unsafe { &(*curr).next };
                curr = next.as_ptr();
            }
        }
    }

    /// Link `value` right behind the first live node equal to `anchor`.
    ///
    /// Returns `false` (and drops `value`) if no live anchor exists.
    ///
    pub fn insert_after(&self, value: T, anchor: &T) -> bool {
        let new_node = Box::into_raw(Box::new(ListNode::new(value)));
        let backoff = Backoff::new();
        let _guard = G::pin();

        loop {
            let Some((_, anchor_node)) = (unsafe { self.search(anchor) }) else {
                unsafe { <ListNode<T> as LinkedNode>::dealloc_ptr(new_node) };
                return false;
            };

            let next = MarkedPtr::new(unsafe { (*anchor_node).get_next() });
            if next.is_marked() {
                // Anchor removed after the search; look for another one.
                continue;
            }

            unsafe { (*new_node).set_next_unpublished(next.as_ptr()) };

            if unsafe { (*anchor_node).cas_next(next.as_raw(), new_node) }.is_ok() {
                return true;
            }

            backoff.spin();
        }
    }

    /// Remove the first live node equal to `value`.
    ///
    /// Returns `false` if no such node exists or if a concurrent remover
    /// marked it first. The caller decides whether to retry.
    ///
    pub fn remove(&self, value: &T) -> bool {
        let backoff = Backoff::new();
        let _guard = G::pin();

        let Some((pred_link, curr)) = (unsafe { self.search(value) }) else {
            return false;
        };

        let mut next = MarkedPtr::new(unsafe { (*curr).get_next() });
        loop {
            if next.is_marked() {
                return false;
            }

            match unsafe { (*curr).cas_next(next.as_raw(), next.marked().as_raw()) } {
                Ok(_) => {
                    // Logically removed. One unlink attempt; traversals finish it otherwise.
                    unsafe { self.try_unlink(pred_link, curr, next.as_ptr()) };
                    return true;
                }
                Err(actual) => {
                    // Either another remover marked it, or a node was linked behind it.
                    next = MarkedPtr::new(actual);
                    backoff.spin();
                }
            }
        }
    }

    pub fn contains(&self, value: &T) -> bool {
        let mut found = false;
        self.for_each_live(|data| found |= data == value);
        found
    }

    /// Get a reference to the first live value equal to `value`.
    ///
    /// The reference stays valid even if the value is removed meanwhile.
    ///
    pub fn find_ref(&self, value: &T) -> Option<G::GuardedRef<'_, T>> {
        let _guard = G::pin();

        let mut curr = self.head.load(Ordering::Acquire);
        while !curr.is_null() {
            let node = unsafe { &*curr };
            let next = MarkedPtr::new(node.get_next());
            if !next.is_marked() && node.data == *value {
                return Some(unsafe { G::make_ref(&node.data) });
            }
            curr = next.as_ptr();
        }

        None
    }
}

impl<T: PartialEq + Clone + Send + 'static, G: Guard> ConcurrentList<T, G> {
    /// Find the first live value equal to `value` and return a copy of it.
    ///
    pub fn find(&self, value: &T) -> Option<T> {
        self.find_ref(value).map(|found| (*found).clone())
    }
}

impl<T: Clone + Send + 'static, G: Guard> ConcurrentList<T, G> {
    /// Copy the live values in list order.
    ///
    pub fn to_vec(&self) -> Vec<T> {
        let mut values = Vec::new();
        self.for_each_live(|data| values.push(data.clone()));
        values
    }
}

impl<T: Send + 'static, G: Guard> Default for ConcurrentList<T, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static, G: Guard> Drop for ConcurrentList<T, G> {
    fn drop(&mut self) {
        // Marked nodes still linked are freed here; unlinked ones belong to the guard.
        //
        let mut node = *self.head.get_mut();
        while !node.is_null() {
            unsafe {
                let next = MarkedPtr::unmask((*node).next.load(Ordering::Relaxed));
                <ListNode<T> as LinkedNode>::dealloc_ptr(node);
                node = next;
            }
        }
    }
}

impl<T: Send + 'static, G: Guard> ConcurrentContainer<T> for ConcurrentList<T, G> {
    type Guard = G;

    fn insert(&self, value: T) {
        self.insert_front(value)
    }

    fn is_empty(&self) -> bool {
        ConcurrentList::is_empty(self)
    }

    fn guard(&self) -> &Self::Guard {
        &self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::DeferredGuard;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    type TestList<T> = ConcurrentList<T, DeferredGuard>;

    struct Tracked {
        key: u32,
        drops: Arc<AtomicUsize>,
    }

    impl PartialEq for Tracked {
        fn eq(&self, other: &Self) -> bool {
            self.key == other.key
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_insert_front_order() {
        let list: TestList<i32> = TestList::new();
        assert!(list.is_empty());

        list.insert_front(1);
        list.insert_front(2);
        list.insert_front(3);

        assert_eq!(list.to_vec(), vec![3, 2, 1]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_insert_after() {
        let list: TestList<i32> = TestList::new();
        list.insert_front(10);
        list.insert_front(30);

        assert!(list.insert_after(20, &30));
        assert!(list.insert_after(5, &10));
        assert_eq!(list.to_vec(), vec![30, 20, 10, 5]);
    }

    #[test]
    fn test_insert_after_missing_anchor() {
        let list: TestList<i32> = TestList::new();
        list.insert_front(1);

        assert!(!list.insert_after(2, &99));
        assert_eq!(list.to_vec(), vec![1]);
    }

    #[test]
    fn test_remove_first_middle_last() {
        let list: TestList<i32> = TestList::new();
        for i in (1..=5).rev() {
            list.insert_front(i);
        }

        assert!(list.remove(&1));
        assert!(list.remove(&3));
        assert!(list.remove(&5));
        assert!(!list.remove(&3));

        assert_eq!(list.to_vec(), vec![2, 4]);
        assert_eq!(list.guard().deferred_count(), 3);
    }

    #[test]
    fn test_find_and_contains() {
        let list: TestList<String> = TestList::new();
        list.insert_front("alpha".to_string());
        list.insert_front("beta".to_string());

        assert_eq!(list.find(&"alpha".to_string()).as_deref(), Some("alpha"));
        assert!(list.contains(&"beta".to_string()));
        assert_eq!(list.find(&"gamma".to_string()), None);

        let found = list.find_ref(&"beta".to_string()).unwrap();
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn test_insert_after_removed_anchor() {
        let list: TestList<i32> = TestList::new();
        list.insert_front(1);
        assert!(list.remove(&1));

        assert!(!list.insert_after(2, &1));
        assert!(list.is_empty());
    }

    #[test]
    fn test_duplicates_remove_one_at_a_time() {
        let list: TestList<i32> = TestList::new();
        list.insert_front(7);
        list.insert_front(7);

        assert!(list.remove(&7));
        assert!(list.contains(&7));
        assert!(list.remove(&7));
        assert!(!list.contains(&7));
    }

    #[test]
    fn test_removed_values_dropped_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let tracked = |key| Tracked {
            key,
            drops: drops.clone(),
        };

        {
            let list: TestList<Tracked> = TestList::new();
            for key in 0..10 {
                list.insert_front(tracked(key));
            }

            for key in 0..4 {
                let lookup = tracked(key);
                assert!(list.remove(&lookup));
            }
            // Only the lookup keys are gone; removed payloads wait in the guard.
            assert_eq!(drops.load(Ordering::SeqCst), 4);
            assert_eq!(list.guard().deferred_count(), 4);
            assert_eq!(list.len(), 6);
        }

        // 4 lookup keys, 4 removed payloads, 6 still linked.
        assert_eq!(drops.load(Ordering::SeqCst), 14);
    }
}
