//! Core task abstractions: the per-task state machine and its observers

use std::any::Any;
use std::fmt::{self, Debug, Display};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::{FutureExt, TryFutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ExecutorError, ExecutorResult, TaskError};
use crate::BoxFuture;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new unique task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current state of a task.
///
/// Transitions only move forward: `Pending -> InProgress -> Completed | Errored`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState<T, E> {
    /// Task has not been started yet
    Pending,
    /// Task's producer is currently running
    InProgress { started_at: Instant },
    /// Task's producer resolved with a value
    Completed { value: T, duration: Duration },
    /// Task's producer failed, panicked or timed out
    Errored {
        error: TaskError<E>,
        duration: Duration,
    },
}

impl<T, E> TaskState<T, E> {
    /// Check if the task is in a terminal state (completed or errored)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed { .. } | TaskState::Errored { .. })
    }

    /// Check if the task is currently running
    pub fn is_in_progress(&self) -> bool {
        matches!(self, TaskState::InProgress { .. })
    }

    /// Get the duration of the task if it has finished
    pub fn duration(&self) -> Option<Duration> {
        match self {
            TaskState::Completed { duration, .. } | TaskState::Errored { duration, .. } => {
                Some(*duration)
            }
            TaskState::Pending | TaskState::InProgress { .. } => None,
        }
    }

    /// The payload-free status of this state
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskState::Pending => TaskStatus::Pending,
            TaskState::InProgress { .. } => TaskStatus::InProgress,
            TaskState::Completed { .. } => TaskStatus::Completed,
            TaskState::Errored { .. } => TaskStatus::Errored,
        }
    }
}

/// A copyable snapshot of where a task is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Errored,
}

impl TaskStatus {
    /// Check if the status is terminal (completed or errored)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Errored)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "Pending"),
            TaskStatus::InProgress => write!(f, "InProgress"),
            TaskStatus::Completed => write!(f, "Completed"),
            TaskStatus::Errored => write!(f, "Errored"),
        }
    }
}

/// A named unit of work that can be handed to a [`Task`].
///
/// Closures are usually enough; implement this trait when the job carries
/// its own data and a meaningful name for logs.
#[async_trait::async_trait]
pub trait Producer: Send + 'static {
    /// The value produced on success
    type Output: Send + 'static;

    /// The error produced on failure
    type Error: Send + 'static;

    /// Run the job to completion
    async fn produce(self) -> Result<Self::Output, Self::Error>;

    /// Get a human-readable name for this job (used for logging and reporting)
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

pub(crate) type ProducerFn<T, E> =
    Box<dyn FnOnce() -> BoxFuture<Result<T, TaskError<E>>> + Send + 'static>;

type Observer<T, E> = Box<dyn FnOnce(&Task<T, E>) + Send + 'static>;

struct Observers<T, E> {
    /// Set once the task reached a terminal state and the list was drained.
    fired: bool,
    pending: Vec<Observer<T, E>>,
}

/// A single deferred unit of asynchronous work.
///
/// The producer runs at most once. Observers registered with
/// [`Task::on_complete`] are invoked exactly once after the task reaches a
/// terminal state, in registration order.
pub struct Task<T, E> {
    id: TaskId,
    name: String,
    producer: Mutex<Option<ProducerFn<T, E>>>,
    state: Mutex<TaskState<T, E>>,
    observers: Mutex<Observers<T, E>>,
}

impl<T, E> Task<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create a pending task from a zero-argument async function
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let id = TaskId::new();
        let producer: ProducerFn<T, E> = Box::new(move || -> BoxFuture<Result<T, TaskError<E>>> {
            Box::pin(producer().map_err(TaskError::Failed))
        });

        Self {
            id,
            name: id.to_string(),
            producer: Mutex::new(Some(producer)),
            state: Mutex::new(TaskState::Pending),
            observers: Mutex::new(Observers {
                fired: false,
                pending: Vec::new(),
            }),
        }
    }

    /// Create a pending task from a [`Producer`], named after it
    pub fn from_producer<P>(producer: P) -> Self
    where
        P: Producer<Output = T, Error = E>,
    {
        let name = producer.name();
        Self::new(move || producer.produce()).with_name(name)
    }

    /// Sets a name for the task
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Races the producer against a timer.
    ///
    /// If the timer wins the task ends up `Errored` with [`TaskError::TimedOut`]
    /// and the producer's future is dropped.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        if let Some(producer) = self.producer.get_mut().take() {
            let timed: ProducerFn<T, E> = Box::new(move || -> BoxFuture<Result<T, TaskError<E>>> {
                Box::pin(async move {
                    tokio::time::timeout(limit, producer())
                        .await
                        .unwrap_or_else(|_| Err(TaskError::TimedOut(limit)))
                })
            });
            *self.producer.get_mut() = Some(timed);
        }
        self
    }

    /// Runs the producer and moves the task to a terminal state.
    ///
    /// Observers are invoked after the state change, before this returns.
    /// Running a task that already left `Pending` fails with
    /// [`ExecutorError::TaskAlreadyStarted`] and changes nothing.
    pub async fn run(&self) -> ExecutorResult<TaskStatus>
    where
        E: Debug,
    {
        let started_at = Instant::now();
        let producer = {
            let mut state = self.state.lock();
            let Some(producer) = self.producer.lock().take() else {
                warn!(task_id = %self.id, task_name = %self.name, "Task was run more than once");
                return Err(ExecutorError::task_already_started(self.id, &self.name));
            };
            *state = TaskState::InProgress { started_at };
            producer
        };

        debug!(task_id = %self.id, task_name = %self.name, "Task started");

        let outcome = AssertUnwindSafe(async move { producer().await })
            .catch_unwind()
            .await;
        let duration = started_at.elapsed();

        let next = match outcome {
            Ok(Ok(value)) => {
                debug!(task_id = %self.id, task_name = %self.name, ?duration, "Task completed");
                TaskState::Completed { value, duration }
            }
            Ok(Err(error)) => {
                debug!(task_id = %self.id, task_name = %self.name, ?duration, ?error, "Task errored");
                TaskState::Errored { error, duration }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(task_id = %self.id, task_name = %self.name, %message, "Task panicked");
                TaskState::Errored {
                    error: TaskError::Panicked(message),
                    duration,
                }
            }
        };
        let status = next.status();
        *self.state.lock() = next;

        self.notify_observers();
        Ok(status)
    }

    /// Registers a callback that fires once the task is terminal.
    ///
    /// A callback registered after the task already finished fires
    /// immediately on the calling thread.
    pub fn on_complete<F>(&self, observer: F)
    where
        F: FnOnce(&Task<T, E>) + Send + 'static,
    {
        let mut observers = self.observers.lock();
        if observers.fired {
            drop(observers);
            observer(self);
            return;
        }
        observers.pending.push(Box::new(observer));
    }

    fn notify_observers(&self) {
        let pending = {
            let mut observers = self.observers.lock();
            observers.fired = true;
            std::mem::take(&mut observers.pending)
        };
        for observer in pending {
            observer(self);
        }
    }
}

impl<T, E> Task<T, E> {
    /// The task's unique identifier
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The task's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current status of the task
    pub fn status(&self) -> TaskStatus {
        self.state.lock().status()
    }

    /// Check if the task reached a terminal state
    pub fn is_terminal(&self) -> bool {
        self.state.lock().is_terminal()
    }

    /// How long the producer ran, once the task is terminal
    pub fn duration(&self) -> Option<Duration> {
        self.state.lock().duration()
    }

    /// Calls `f` with the current state without cloning it.
    ///
    /// The state lock is held while `f` runs and is not reentrant: calling
    /// [`Task::status`], [`Task::value`] or formatting the task with `{:?}`
    /// from inside `f` deadlocks. [`Task::id`] and [`Task::name`] are fine.
    pub fn inspect<R>(&self, f: impl FnOnce(&TaskState<T, E>) -> R) -> R {
        f(&self.state.lock())
    }

    /// The produced value, if the task completed
    pub fn value(&self) -> Option<T>
    where
        T: Clone,
    {
        match &*self.state.lock() {
            TaskState::Completed { value, .. } => Some(value.clone()),
            _ => None,
        }
    }

    /// The error, if the task errored
    pub fn error(&self) -> Option<TaskError<E>>
    where
        E: Clone,
    {
        match &*self.state.lock() {
            TaskState::Errored { error, .. } => Some(error.clone()),
            _ => None,
        }
    }

    /// The terminal outcome, or `None` while the task is not terminal
    pub fn outcome(&self) -> Option<Result<T, TaskError<E>>>
    where
        T: Clone,
        E: Clone,
    {
        match &*self.state.lock() {
            TaskState::Completed { value, .. } => Some(Ok(value.clone())),
            TaskState::Errored { error, .. } => Some(Err(error.clone())),
            TaskState::Pending | TaskState::InProgress { .. } => None,
        }
    }
}

impl<T, E> Debug for Task<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
