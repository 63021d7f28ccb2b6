use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use courier_core::preemptive_synchronization::CountdownEvent;
use courier_crossbeam::EpochQueue;

use crate::config::WorkerPoolOptions;
use crate::error::{PoolError, panic_message};

/// One unit of pooled work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

///
/// Fixed set of worker threads draining one lock-free task queue.
///
// =============================================================================
// WORKER LOOP & SHUTDOWN
// =============================================================================
//
//   enqueue ──lock──► shutdown? ──no──► queue.enqueue ──unlock──► notify_one
//
//   worker:  dequeue ─┬─ Some(task) ─► run (no lock held) ─► loop
//                     └─ None ─► lock ─► dequeue again ─┬─ Some ─► unlock, run
//                                                       ├─ shutdown ─► exit
//                                                       └─ wait ─► loop
//
// Tasks are linked while the state lock is held and workers re-check the queue
// under the same lock before sleeping, so no wakeup is lost and no task is
// linked after the last worker decided to exit. A worker exits only when the
// queue is empty and shutdown is set: every accepted task runs exactly once.
//
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    // Taken by the first shutdown; later calls find it empty.
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_ids: Vec<ThreadId>,
}

struct PoolShared {
    queue: EpochQueue<Task>,
    state: Mutex<PoolState>,
    work_available: Condvar,
    idle_workers: AtomicUsize,
}

struct PoolState {
    shutdown: bool,
}

impl WorkerPool {
    /// Start `worker_count` workers with default names and stack size.
    ///
    pub fn new(worker_count: usize) -> Result<Self, PoolError> {
        Self::with_options(WorkerPoolOptions::default().with_worker_count(worker_count))
    }

    /// Start the workers described by `options`. Returns once every worker is running.
    ///
    pub fn with_options(options: WorkerPoolOptions) -> Result<Self, PoolError> {
        options.validate()?;

        let shared = Arc::new(PoolShared {
            queue: EpochQueue::new(),
            state: Mutex::new(PoolState { shutdown: false }),
            work_available: Condvar::new(),
            idle_workers: AtomicUsize::new(0),
        });
        let started = Arc::new(CountdownEvent::new(options.worker_count));
        let mut workers = Vec::with_capacity(options.worker_count);

        for index in 0..options.worker_count {
            let mut builder =
                thread::Builder::new().name(format!("{}-{}", options.thread_name_prefix, index));
            if let Some(stack_size) = options.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let worker_shared = Arc::clone(&shared);
            let worker_started = Arc::clone(&started);
            let spawned = builder.spawn(move || {
                worker_started.signal();
                worker_shared.run_worker();
            });

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(error) => {
                    tracing::error!(%error, index, "failed to spawn worker thread");
                    shared.begin_shutdown();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Spawn(error));
                }
            }
        }

        started.wait();
        tracing::debug!(
            worker_count = options.worker_count,
            prefix = %options.thread_name_prefix,
            "worker pool started"
        );

        let worker_ids = workers.iter().map(|handle| handle.thread().id()).collect();
        Ok(WorkerPool {
            shared,
            workers: Mutex::new(workers),
            worker_ids,
        })
    }

    /// Link a task into the queue and wake one idle worker.
    ///
    /// Fails only after [`shutdown`](Self::shutdown); the task is then dropped unrun.
    ///
    pub fn enqueue<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let state = self.shared.lock_state();
            if state.shutdown {
                return Err(PoolError::ShutDown);
            }
            self.shared.queue.enqueue(Box::new(task));
        }

        self.shared.work_available.notify_one();
        Ok(())
    }

    /// Stop accepting tasks, let the workers drain the queue, then join them.
    ///
    /// Idempotent. Called from one of this pool's workers it only flags the
    /// shutdown; that worker cannot join itself and the others exit on their own.
    ///
    pub fn shutdown(&self) {
        let first = self.shared.begin_shutdown();

        if self.worker_ids.contains(&thread::current().id()) {
            return;
        }

        // Concurrent callers wait here until the joins are done.
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("worker thread exited by panic");
            }
        }

        if first {
            tracing::debug!("worker pool shut down");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.lock_state().shutdown
    }

    pub fn worker_count(&self) -> usize {
        self.worker_ids.len()
    }

    /// Workers currently parked waiting for tasks. For observability only.
    pub fn idle_worker_count(&self) -> usize {
        self.shared.idle_workers.load(Ordering::Relaxed)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PoolShared {
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the shutdown flag and wake every worker. Returns `true` on the first call.
    ///
    fn begin_shutdown(&self) -> bool {
        let first = {
            let mut state = self.lock_state();
            !std::mem::replace(&mut state.shutdown, true)
        };
        self.work_available.notify_all();
        first
    }

    fn run_worker(&self) {
        loop {
            if let Some(task) = self.queue.dequeue() {
                Self::run_task(task);
                continue;
            }

            let mut state = self.lock_state();
            loop {
                if let Some(task) = self.queue.dequeue() {
                    drop(state);
                    Self::run_task(task);
                    break;
                }

                if state.shutdown {
                    return;
                }

                self.idle_workers.fetch_add(1, Ordering::Relaxed);
                state = self
                    .work_available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
                self.idle_workers.fetch_sub(1, Ordering::Relaxed);
            }
        }
    }

    fn run_task(task: Task) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            tracing::error!(
                worker = thread::current().name().unwrap_or("<unnamed>"),
                panic = %panic_message(payload.as_ref()),
                "pool task panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_runs_tasks() {
        let pool = WorkerPool::new(2).unwrap();
        let (sender, receiver) = std::sync::mpsc::channel();

        for i in 0..10 {
            let sender = sender.clone();
            pool.enqueue(move || sender.send(i).unwrap()).unwrap();
        }

        let mut received: Vec<i32> = (0..10)
            .map(|_| receiver.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        received.sort();
        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(PoolError::InvalidWorkerCount)));
    }

    #[test]
    fn test_enqueue_after_shutdown() {
        let pool = WorkerPool::new(1).unwrap();
        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(matches!(pool.enqueue(|| {}), Err(PoolError::ShutDown)));
    }

    #[test]
    fn test_worker_names() {
        let options = WorkerPoolOptions::default()
            .with_worker_count(1)
            .with_thread_name_prefix("named");
        let pool = WorkerPool::with_options(options).unwrap();
        let (sender, receiver) = std::sync::mpsc::channel();

        pool.enqueue(move || {
            let name = thread::current().name().map(str::to_string);
            sender.send(name).unwrap();
        })
        .unwrap();

        let name = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("named-0"));
    }
}
