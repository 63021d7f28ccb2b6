use std::error::Error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::cancellable_operation::{CancellableOperation, Callback, ResultHandle, Work};
use crate::config::WorkerPoolOptions;
use crate::dispatcher::ThreadAffineDispatcher;
use crate::error::{Outcome, PoolError, TaskError};
use crate::worker_pool::WorkerPool;

/// Receives work failures, callback panics and rejected submissions.
pub type ErrorCallback = Arc<dyn Fn(&TaskError) + Send + Sync + 'static>;

///
/// Runs work on a [`WorkerPool`] and delivers results back through a
/// [`ThreadAffineDispatcher`].
///
// =============================================================================
// OPERATION FLOW
// =============================================================================
//
//  submitting thread          worker thread                  owning thread
//  ─────────────────          ─────────────                  ─────────────
//  start(work, cb)
//    ├─ op = Arc<CancellableOperation>
//    ├─ target = current thread id
//    └─ pool.enqueue ────────► op.execute()  (slot set)
//                                ├─ Completed + callback, not cancelled:
//                                │    post(deliver, target) ──► dispatcher.drain()
//                                │                                └─ op.invoke_callback(v)
//                                ├─ Failed: error callback or tracing, finish
//                                └─ Cancelled / no callback: finish
//
// The slot is written before anything is posted, so the result handle and the
// callback always agree. A callback panic is caught inside `deliver` and routed
// like a work failure; it never reaches the dispatcher's drain loop.
//
pub struct AsyncExecutor {
    pool: Arc<WorkerPool>,
    dispatcher: Arc<ThreadAffineDispatcher>,
}

impl AsyncExecutor {
    pub fn new(pool: Arc<WorkerPool>, dispatcher: Arc<ThreadAffineDispatcher>) -> Self {
        AsyncExecutor { pool, dispatcher }
    }

    /// Build a private pool from `options` and a fresh dispatcher.
    ///
    pub fn with_options(options: WorkerPoolOptions) -> Result<Self, PoolError> {
        let pool = WorkerPool::with_options(options)?;
        Ok(Self::new(
            Arc::new(pool),
            Arc::new(ThreadAffineDispatcher::new()),
        ))
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn dispatcher(&self) -> &Arc<ThreadAffineDispatcher> {
        &self.dispatcher
    }

    /// Run `work` on the pool and deliver its value to `callback` on this thread.
    ///
    /// The callback runs when this thread drains the dispatcher.
    ///
    pub fn start<T, W, C>(&self, work: W, callback: C) -> Arc<CancellableOperation<T>>
    where
        T: Clone + Send + Sync + 'static,
        W: FnOnce() -> T + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        self.operation(work).on_complete(callback).start()
    }

    /// Run `work` on the pool with no callback; read the outcome from the handle.
    ///
    pub fn submit<T, W>(&self, work: W) -> ResultHandle<T>
    where
        T: Send + Sync + 'static,
        W: FnOnce() -> T + Send + 'static,
    {
        self.operation(work).start().result_handle()
    }

    pub fn operation<T, W>(&self, work: W) -> OperationBuilder<'_, T>
    where
        T: 'static,
        W: FnOnce() -> T + Send + 'static,
    {
        OperationBuilder::new(self, Box::new(move || Ok(work())))
    }

    /// Like [`operation`](Self::operation) for work that can fail. An `Err`
    /// becomes `TaskError::Failed`.
    ///
    pub fn try_operation<T, E, W>(&self, work: W) -> OperationBuilder<'_, T>
    where
        T: 'static,
        E: Error + Send + Sync + 'static,
        W: FnOnce() -> Result<T, E> + Send + 'static,
    {
        OperationBuilder::new(self, Box::new(move || work().map_err(TaskError::failed)))
    }

    /// Shut the pool down, running everything already queued, then stop the
    /// dispatcher. Idempotent.
    ///
    /// Result handles stay readable. Callbacks posted for threads that no
    /// longer drain are never run.
    ///
    pub fn shutdown(&self) {
        self.pool.shutdown();
        self.dispatcher.stop();
    }

    pub fn is_shutdown(&self) -> bool {
        self.pool.is_shutdown()
    }
}

/// Configures one operation before it is submitted.
///
pub struct OperationBuilder<'a, T> {
    executor: &'a AsyncExecutor,
    work: Work<T>,
    callback: Option<Callback<T>>,
    // Copies the value for the callback; the original stays in the slot.
    clone_value: Option<fn(&T) -> T>,
    on_error: Option<ErrorCallback>,
    any_thread: bool,
}

impl<'a, T> OperationBuilder<'a, T> {
    fn new(executor: &'a AsyncExecutor, work: Work<T>) -> Self {
        OperationBuilder {
            executor,
            work,
            callback: None,
            clone_value: None,
            on_error: None,
            any_thread: false,
        }
    }

    pub fn on_complete<C>(mut self, callback: C) -> Self
    where
        T: Clone,
        C: FnOnce(T) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self.clone_value = Some(T::clone);
        self
    }

    pub fn on_error<E>(mut self, on_error: E) -> Self
    where
        E: Fn(&TaskError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    /// Let any draining thread run the callback instead of the submitting one.
    pub fn on_any_thread(mut self) -> Self {
        self.any_thread = true;
        self
    }

    /// Submit the operation. Never fails: after shutdown the operation
    /// resolves as cancelled and `TaskError::Rejected` is reported.
    ///
    pub fn start(self) -> Arc<CancellableOperation<T>>
    where
        T: Send + Sync + 'static,
    {
        let operation = Arc::new(CancellableOperation::from_parts(self.work, self.callback));
        let delivery = Delivery {
            dispatcher: Arc::clone(&self.executor.dispatcher),
            target: (!self.any_thread).then(|| thread::current().id()),
            clone_value: self.clone_value,
            on_error: self.on_error.clone(),
        };

        let task = {
            let operation = Arc::clone(&operation);
            move || delivery.run(operation)
        };

        if let Err(error) = self.executor.pool.enqueue(task) {
            tracing::warn!(%error, "operation submitted after shutdown");
            operation.reject();
            report(self.on_error.as_ref(), &TaskError::Rejected);
        }

        operation
    }
}

/// Everything the worker needs to route an operation's outcome.
struct Delivery<T> {
    dispatcher: Arc<ThreadAffineDispatcher>,
    target: Option<ThreadId>,
    clone_value: Option<fn(&T) -> T>,
    on_error: Option<ErrorCallback>,
}

impl<T: Send + Sync + 'static> Delivery<T> {
    fn run(self, operation: Arc<CancellableOperation<T>>) {
        match operation.execute() {
            Outcome::Completed(value) => match self.clone_value {
                Some(clone_value) if operation.has_callback() && !operation.is_cancelled() => {
                    let value = clone_value(value);
                    let on_error = self.on_error;
                    let deliver_op = Arc::clone(&operation);
                    self.dispatcher.post_with_affinity(
                        move || deliver(&deliver_op, value, on_error.as_ref()),
                        self.target,
                    );
                }
                _ => {
                    operation.finish();
                }
            },
            Outcome::Failed(error) => {
                report(self.on_error.as_ref(), error);
                operation.finish();
            }
            Outcome::Cancelled => {
                operation.finish();
            }
        }
    }
}

fn deliver<T>(operation: &CancellableOperation<T>, value: T, on_error: Option<&ErrorCallback>) {
    let delivered = panic::catch_unwind(AssertUnwindSafe(|| operation.invoke_callback(value)));
    if let Err(payload) = delivered {
        report(on_error, &TaskError::from_panic(payload));
    }
}

fn report(on_error: Option<&ErrorCallback>, error: &TaskError) {
    let Some(on_error) = on_error else {
        tracing::error!(%error, "operation failed with no error callback");
        return;
    };

    if panic::catch_unwind(AssertUnwindSafe(|| on_error(error))).is_err() {
        tracing::error!(%error, "error callback panicked");
    }
}
