use std::any::Any;
use std::error::Error;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Why an operation did not produce a value.
///
/// Cloneable so one failure can reach both the result slot and the error
/// callback.
///
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("task panicked: {message}")]
    Panicked { message: String },

    #[error("task failed: {0}")]
    Failed(Arc<dyn Error + Send + Sync>),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("executor is shut down")]
    Rejected,
}

impl TaskError {
    /// Wrap an error returned by fallible work.
    pub fn failed<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        TaskError::Failed(Arc::new(error))
    }

    /// Turn a payload caught by `catch_unwind` into an error.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        TaskError::Panicked {
            message: panic_message(payload.as_ref()),
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Final state of an operation's result slot.
///
/// Cancellation is an outcome of its own, not a failure.
///
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Completed(T),
    Failed(TaskError),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn as_ref(&self) -> Outcome<&T> {
        match self {
            Outcome::Completed(value) => Outcome::Completed(value),
            Outcome::Failed(error) => Outcome::Failed(error.clone()),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    /// `Cancelled` maps to `Err(TaskError::Cancelled)`.
    pub fn into_result(self) -> Result<T, TaskError> {
        match self {
            Outcome::Completed(value) => Ok(value),
            Outcome::Failed(error) => Err(error),
            Outcome::Cancelled => Err(TaskError::Cancelled),
        }
    }
}

impl<T> From<Result<T, TaskError>> for Outcome<T> {
    fn from(result: Result<T, TaskError>) -> Self {
        match result {
            Ok(value) => Outcome::Completed(value),
            Err(TaskError::Cancelled) => Outcome::Cancelled,
            Err(error) => Outcome::Failed(error),
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    ShutDown,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),

    #[error("worker count must be at least 1")]
    InvalidWorkerCount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom")
        }
    }

    impl Error for Boom {}

    #[test]
    fn test_panic_payloads() {
        let caught = std::panic::catch_unwind(|| panic!("static text")).unwrap_err();
        assert!(matches!(
            TaskError::from_panic(caught),
            TaskError::Panicked { message } if message == "static text"
        ));

        let caught = std::panic::catch_unwind(|| panic!("value {}", 7)).unwrap_err();
        assert_eq!(TaskError::from_panic(caught).to_string(), "task panicked: value 7");
    }

    #[test]
    fn test_outcome_into_result() {
        assert_eq!(Outcome::Completed(3).into_result().unwrap(), 3);
        assert!(matches!(
            Outcome::<i32>::Cancelled.into_result(),
            Err(TaskError::Cancelled)
        ));
        assert!(matches!(
            Outcome::<i32>::Failed(TaskError::failed(Boom)).into_result(),
            Err(TaskError::Failed(_))
        ));
    }

    #[test]
    fn test_outcome_from_result() {
        assert!(Outcome::from(Ok::<_, TaskError>(1)).is_completed());
        assert!(Outcome::<i32>::from(Err(TaskError::Cancelled)).is_cancelled());
        assert!(matches!(
            Outcome::<i32>::from(Err(TaskError::Rejected)),
            Outcome::Failed(TaskError::Rejected)
        ));
    }

    #[test]
    fn test_failed_keeps_source_message() {
        assert_eq!(TaskError::failed(Boom).to_string(), "task failed: boom");
    }
}
