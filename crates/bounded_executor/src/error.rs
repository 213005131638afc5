//! Error types for the bounded executor

use std::time::Duration;

use thiserror::Error;

use crate::task::TaskId;

/// Main error type for executor operations
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task {task_name} ({task_id}) has already been started")]
    TaskAlreadyStarted { task_id: TaskId, task_name: String },

    #[error("This executor has already run its batch")]
    BatchAlreadyRun,

    #[error("The completion signal was dropped before the batch finished")]
    CompletionSignalLost,
}

/// Errors related to configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid max concurrent tasks: {value} (must be > 0)")]
    InvalidMaxConcurrentTasks { value: usize },

    #[error("Invalid timeout duration: {duration:?} (must be > 0)")]
    InvalidTimeout { duration: Duration },
}

/// The reason a task ended up in the `Errored` state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError<E> {
    #[error("Task execution failed: {0:?}")]
    Failed(E),

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task timed out after {0:?}")]
    TimedOut(Duration),
}

/// Result type alias for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ExecutorError {
    /// Create an error for a task that was run more than once
    pub fn task_already_started<S: Into<String>>(task_id: TaskId, task_name: S) -> Self {
        ExecutorError::TaskAlreadyStarted {
            task_id,
            task_name: task_name.into(),
        }
    }

    /// Check if this error indicates that the executor was misused after its run
    pub fn is_batch_already_run(&self) -> bool {
        matches!(self, ExecutorError::BatchAlreadyRun)
    }
}

impl ConfigError {
    /// Create an invalid max concurrent tasks error
    pub fn invalid_max_concurrent_tasks(value: usize) -> Self {
        ConfigError::InvalidMaxConcurrentTasks { value }
    }

    /// Create an invalid timeout error
    pub fn invalid_timeout(duration: Duration) -> Self {
        ConfigError::InvalidTimeout { duration }
    }
}

impl<E> TaskError<E> {
    /// Returns the producer's own error, if that is what failed the task
    pub fn as_failure(&self) -> Option<&E> {
        match self {
            TaskError::Failed(err) => Some(err),
            TaskError::Panicked(_) | TaskError::TimedOut(_) => None,
        }
    }

    /// Check if this error indicates a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::TimedOut(_))
    }

    /// Check if the producer panicked
    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panicked(_))
    }
}
