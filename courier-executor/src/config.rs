use crate::error::PoolError;

/// Construction options for a [`WorkerPool`](crate::WorkerPool).
///
#[derive(Debug, Clone)]
pub struct WorkerPoolOptions {
    pub worker_count: usize,
    /// Workers are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
    /// Stack size in bytes; `None` keeps the platform default.
    pub stack_size: Option<usize>,
}

impl Default for WorkerPoolOptions {
    fn default() -> Self {
        WorkerPoolOptions {
            worker_count: num_cpus::get(),
            thread_name_prefix: "courier-worker".to_string(),
            stack_size: None,
        }
    }
}

impl WorkerPoolOptions {
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.worker_count == 0 {
            return Err(PoolError::InvalidWorkerCount);
        }
        Ok(())
    }
}
