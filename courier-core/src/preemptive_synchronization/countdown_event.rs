use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A latch that releases its waiters once it has been signalled `count` times.
///
pub struct CountdownEvent {
    count: Mutex<usize>,
    condvar: Condvar,
    notified: AtomicBool,
}

impl CountdownEvent {
    // Create a new CountdownEvent with initial count.
    //
    pub fn new(count: usize) -> Self {
        CountdownEvent {
            count: Mutex::new(count),
            condvar: Condvar::new(),
            notified: AtomicBool::new(count == 0),
        }
    }

    // Signal the event, decrementing count by one.
    // Returns true for the signal that brought the count to zero.
    //
    pub fn signal(&self) -> bool {
        let mut count = self.lock_count();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        if *count == 0 {
            self.notified.store(true, Ordering::Release);
            self.condvar.notify_all();
            true
        } else {
            false
        }
    }

    // Wait until count reaches zero.
    //
    pub fn wait(&self) {
        if self.notified.load(Ordering::Acquire) {
            return;
        }

        let mut count = self.lock_count();
        while *count > 0 {
            count = self
                .condvar
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    // Wait until count reaches zero or the timeout elapses.
    // Returns true if the count reached zero.
    //
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.notified.load(Ordering::Acquire) {
            return true;
        }

        let count = self.lock_count();
        let (count, _) = self
            .condvar
            .wait_timeout_while(count, timeout, |count| *count > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *count == 0
    }

    pub fn count(&self) -> usize {
        *self.lock_count()
    }

    fn lock_count(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
