//! Worker pool, thread-affine callback dispatcher and cancellable operations
//! on top of the courier lock-free queue.
//!
//! ```ignore
//! use courier_executor::{AsyncExecutor, WorkerPoolOptions};
//!
//! let executor = AsyncExecutor::with_options(WorkerPoolOptions::default())?;
//! let op = executor.start(|| 6 * 7, |value| println!("got {value}"));
//!
//! // The callback runs here, on the submitting thread.
//! while !op.is_finished() {
//!     executor.dispatcher().drain();
//! }
//! ```

pub mod async_executor;
pub mod cancellable_operation;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod worker_pool;

pub use async_executor::{AsyncExecutor, ErrorCallback, OperationBuilder};
pub use cancellable_operation::{CancellableOperation, ResultHandle};
pub use config::WorkerPoolOptions;
pub use dispatcher::ThreadAffineDispatcher;
pub use error::{Outcome, PoolError, TaskError};
pub use worker_pool::{Task, WorkerPool};
