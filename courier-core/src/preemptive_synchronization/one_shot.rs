use std::sync::{Condvar, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

/// A value slot that is written exactly once and read any number of times.
///
/// Readers either poll with [`OneShot::get`] or block with [`OneShot::wait`].
/// Writing a second value is a protocol error and panics.
///
pub struct OneShot<V> {
    value: OnceLock<V>,
    // Only used to park readers; the value itself lives in `value`.
    lock: Mutex<()>,
    condvar: Condvar,
}

impl<V> OneShot<V> {
    pub fn new() -> Self {
        OneShot {
            value: OnceLock::new(),
            lock: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    /// Store the value and wake every reader.
    ///
    /// # Panics
    /// Panics if a value was already stored.
    ///
    pub fn set(&self, value: V) {
        if self.try_set(value).is_err() {
            panic!("one-shot slot set twice");
        }
    }

    /// Store the value, or hand it back if the slot is already set.
    ///
    pub fn try_set(&self, value: V) -> Result<(), V> {
        self.value.set(value)?;

        // Taking the lock orders the store before any reader's re-check.
        drop(self.lock.lock().unwrap_or_else(PoisonError::into_inner));
        self.condvar.notify_all();
        Ok(())
    }

    pub fn get(&self) -> Option<&V> {
        self.value.get()
    }

    pub fn is_set(&self) -> bool {
        self.value.get().is_some()
    }

    /// Block until the value is set.
    ///
    pub fn wait(&self) -> &V {
        if let Some(value) = self.value.get() {
            return value;
        }

        let mut lock = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(value) = self.value.get() {
                return value;
            }
            lock = self
                .condvar
                .wait(lock)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the value is set or `timeout` elapses.
    ///
    pub fn wait_timeout(&self, timeout: Duration) -> Option<&V> {
        if let Some(value) = self.value.get() {
            return Some(value);
        }

        let deadline = Instant::now() + timeout;
        let mut lock = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(value) = self.value.get() {
                return Some(value);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }

            lock = self
                .condvar
                .wait_timeout(lock, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl<V> Default for OneShot<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for OneShot<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.value.get() {
            Some(value) => write!(f, "OneShot({:?})", value),
            None => write!(f, "OneShot(<unset>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_set_then_get() {
        let slot = OneShot::new();
        assert!(!slot.is_set());
        assert_eq!(slot.get(), None);

        slot.set(7);
        assert!(slot.is_set());
        assert_eq!(slot.get(), Some(&7));
        assert_eq!(slot.wait(), &7);
        assert_eq!(slot.wait(), &7);
    }

    #[test]
    #[should_panic(expected = "set twice")]
    fn test_second_set_panics() {
        let slot = OneShot::new();
        slot.set(1);
        slot.set(2);
    }

    #[test]
    fn test_try_set_returns_rejected_value() {
        let slot = OneShot::new();
        assert_eq!(slot.try_set("first"), Ok(()));
        assert_eq!(slot.try_set("second"), Err("second"));
        assert_eq!(slot.get(), Some(&"first"));
    }

    #[test]
    fn test_wait_timeout_unset() {
        let slot: OneShot<u32> = OneShot::new();
        assert_eq!(slot.wait_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_blocking_readers_wake() {
        let slot = Arc::new(OneShot::new());

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slot = Arc::clone(&slot);
                thread::spawn(move || *slot.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(10));
        slot.set(99u64);

        for reader in readers {
            assert_eq!(reader.join().unwrap(), 99);
        }
    }
}
