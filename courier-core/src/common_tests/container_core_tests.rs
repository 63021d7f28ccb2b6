use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use crate::data_structures::{ConcurrentList, TakeContainer};
use crate::guard::Guard;

/// Single-threaded inserts come back out in insertion order.
pub fn test_fifo_order<C>(container: &C)
where
    C: TakeContainer<i32>,
{
    assert!(container.is_empty());
    assert_eq!(container.take(), None);

    for i in 0..1000 {
        container.insert(i);
    }
    assert!(!container.is_empty());

    for i in 0..1000 {
        assert_eq!(container.take(), Some(i));
    }

    assert!(container.is_empty());
    assert_eq!(container.take(), None);
}

/// Single-threaded inserts come back out in reverse insertion order.
pub fn test_lifo_order<C>(container: &C)
where
    C: TakeContainer<i32>,
{
    assert!(container.is_empty());
    assert_eq!(container.take(), None);

    for i in 0..1000 {
        container.insert(i);
    }

    for i in (0..1000).rev() {
        assert_eq!(container.take(), Some(i));
    }

    assert!(container.is_empty());
}

/// Emptying and refilling the container repeatedly keeps it consistent.
pub fn test_refill_after_empty<C>(container: &C)
where
    C: TakeContainer<i32>,
{
    for round in 0..10 {
        for i in 0..round {
            container.insert(i);
        }

        let drained = container.drain_to_vec();
        assert_eq!(drained.len(), round as usize);
        assert!(container.is_empty());
        assert_eq!(container.take(), None);
    }
}

/// Concurrent inserts followed by a sequential drain: every value exactly once.
pub fn test_concurrent_inserts<C>()
where
    C: TakeContainer<usize> + Default + Send + Sync + 'static,
{
    let container = Arc::new(C::default());
    let num_threads = 4;
    let items_per_thread = 1000;

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let container = Arc::clone(&container);
            thread::spawn(move || {
                for i in 0..items_per_thread {
                    container.insert(thread_id * items_per_thread + i);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let drained = container.drain_to_vec();
    assert_eq!(drained.len(), num_threads * items_per_thread);

    let unique: HashSet<_> = drained.into_iter().collect();
    assert_eq!(unique.len(), num_threads * items_per_thread);
}

/// Per-producer order survives concurrent producers in a FIFO container.
pub fn test_per_producer_fifo<C>()
where
    C: TakeContainer<(usize, usize)> + Default + Send + Sync + 'static,
{
    let container = Arc::new(C::default());
    let num_threads = 4;
    let items_per_thread = 2000;

    let handles: Vec<_> = (0..num_threads)
        .map(|producer| {
            let container = Arc::clone(&container);
            thread::spawn(move || {
                for seq in 0..items_per_thread {
                    container.insert((producer, seq));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let mut next_expected = vec![0; num_threads];
    while let Some((producer, seq)) = container.take() {
        assert_eq!(seq, next_expected[producer], "producer {} out of order", producer);
        next_expected[producer] += 1;
    }

    assert!(next_expected.iter().all(|&n| n == items_per_thread));
}

/// Insert, positional insert, find and remove on a single thread.
pub fn test_list_basic_operations<G: Guard>() {
    let list: ConcurrentList<i32, G> = ConcurrentList::new();
    assert!(list.is_empty());
    assert_eq!(list.len(), 0);

    list.insert_front(3);
    list.insert_front(1);
    assert!(list.insert_after(2, &1));
    assert!(list.insert_after(4, &3));
    assert!(!list.insert_after(99, &42));

    assert_eq!(list.to_vec(), vec![1, 2, 3, 4]);
    assert_eq!(list.find(&3), Some(3));
    assert_eq!(list.find(&99), None);
    assert_eq!(list.find_ref(&4).map(|found| *found), Some(4));

    assert!(list.remove(&1));
    assert!(list.remove(&4));
    assert!(!list.remove(&4));
    assert_eq!(list.to_vec(), vec![2, 3]);

    assert!(list.remove(&2));
    assert!(list.remove(&3));
    assert!(list.is_empty());
    assert_eq!(list.find(&3), None);
}

/// Front inserts from several threads all land in the list.
pub fn test_list_concurrent_inserts<G: Guard + 'static>() {
    let list = Arc::new(ConcurrentList::<usize, G>::new());
    let num_threads = 4;
    let items_per_thread = 500;

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let list = Arc::clone(&list);
            thread::spawn(move || {
                for i in 0..items_per_thread {
                    let value = thread_id * items_per_thread + i;
                    if i == 0 {
                        list.insert_front(value);
                    } else {
                        // Chain behind this thread's previous value.
                        assert!(list.insert_after(value, &(value - 1)));
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(list.len(), num_threads * items_per_thread);
    for value in 0..num_threads * items_per_thread {
        assert!(list.contains(&value), "Missing value: {}", value);
    }
}
