//! Bounded-concurrency executor for batches of async tasks

use std::fmt::Debug;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{ConfigResult, ExecutorError, ExecutorResult, TaskError};
use crate::reporter::{ExecutionReporter, TaskExecutionEvent};
use crate::task::{Producer, Task, TaskId, TaskState, TaskStatus};
use crate::types::{ExecutionStats, ExecutorConfig};

type SharedReporter = Arc<Mutex<Box<dyn ExecutionReporter>>>;

/// Runs a batch of tasks with at most `limit` of them in flight.
///
/// Tasks start in submission order. Whenever a task finishes, successfully or
/// not, the first task that has not been started yet takes its slot. Results
/// are always reported in submission order.
///
/// # Example
///
/// ```rust
/// use bounded_executor::Executor;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut executor = Executor::<u32, String>::new(2)?;
/// for i in 0..5 {
///     executor.submit(move || async move { Ok(i * 10) })?;
/// }
///
/// executor.run().await?;
/// assert_eq!(executor.collect_results(), vec![0, 10, 20, 30, 40]);
/// # Ok(())
/// # }
/// ```
pub struct Executor<T, E = String> {
    config: ExecutorConfig,
    tasks: IndexMap<TaskId, Arc<Task<T, E>>>,
    reporter: Option<SharedReporter>,
    has_run: bool,
}

impl<T, E> Executor<T, E>
where
    T: Send + 'static,
    E: Debug + Send + 'static,
{
    /// Create an executor that keeps at most `limit` tasks in flight.
    ///
    /// Fails if `limit` is zero.
    pub fn new(limit: usize) -> ConfigResult<Self> {
        let config = ExecutorConfig::default().with_max_concurrent_tasks(limit)?;
        Ok(Self::from_valid_config(config))
    }

    /// Create an executor from a limit that is known to be non-zero
    pub fn with_limit(limit: NonZeroUsize) -> Self {
        Self::from_valid_config(ExecutorConfig::default().with_limit(limit))
    }

    /// Create a new executor with custom configuration
    pub fn with_config(config: ExecutorConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: ExecutorConfig) -> Self {
        Self {
            config,
            tasks: IndexMap::new(),
            reporter: None,
            has_run: false,
        }
    }

    /// Attach a reporter that receives lifecycle events
    pub fn with_reporter<R: ExecutionReporter + 'static>(mut self, mut reporter: R) -> Self {
        if let Some(name) = &self.config.batch_name {
            reporter.set_context(name.clone());
        }
        self.reporter = Some(Arc::new(Mutex::new(Box::new(reporter))));
        self
    }

    /// Submit a zero-argument async function as a new pending task
    pub fn submit<F, Fut>(&mut self, producer: F) -> ExecutorResult<TaskId>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let name = format!("task-{}", self.tasks.len());
        self.push(Task::new(producer).with_name(name))
    }

    /// Submit a [`Producer`] as a new pending task
    pub fn submit_producer<P>(&mut self, producer: P) -> ExecutorResult<TaskId>
    where
        P: Producer<Output = T, Error = E>,
    {
        self.push(Task::from_producer(producer))
    }

    /// Submit a task built by the caller, possibly carrying its own observers.
    ///
    /// The task must still be pending.
    pub fn submit_task(&mut self, task: Task<T, E>) -> ExecutorResult<TaskId> {
        if task.status() != TaskStatus::Pending {
            return Err(ExecutorError::task_already_started(task.id(), task.name()));
        }
        self.push(task)
    }

    /// Submit one task per input, each calling `f` with its input
    pub fn submit_all<I, A, F, Fut>(&mut self, inputs: I, f: F) -> ExecutorResult<Vec<TaskId>>
    where
        I: IntoIterator<Item = A>,
        A: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let f = Arc::new(f);
        inputs
            .into_iter()
            .map(|input| {
                let f = Arc::clone(&f);
                self.submit(move || f(input))
            })
            .collect()
    }

    fn push(&mut self, task: Task<T, E>) -> ExecutorResult<TaskId> {
        if self.has_run {
            return Err(ExecutorError::BatchAlreadyRun);
        }

        let task = match self.config.task_timeout {
            Some(timeout) => task.with_timeout(timeout),
            None => task,
        };

        let id = task.id();
        let index = self.tasks.len();
        debug!(task_id = %id, task_name = task.name(), index, "Task queued");
        self.report(TaskExecutionEvent::TaskQueued {
            index,
            task_id: id,
            task_name: task.name().to_string(),
        });

        self.tasks.insert(id, Arc::new(task));
        Ok(id)
    }

    /// Runs every submitted task and resolves once all of them are terminal.
    ///
    /// Task failures are recorded on the tasks, never returned from here. An
    /// executor runs a single batch: calling this a second time fails with
    /// [`ExecutorError::BatchAlreadyRun`].
    ///
    /// Tasks are spawned onto the current tokio runtime. If an observer
    /// panics, the refill hook registered after it is lost and the batch
    /// cannot finish; this then fails with
    /// [`ExecutorError::CompletionSignalLost`] once the last in-flight task
    /// is done, leaving the remaining tasks `Pending`.
    pub async fn run(&mut self) -> ExecutorResult<ExecutionStats> {
        if self.has_run {
            return Err(ExecutorError::BatchAlreadyRun);
        }
        self.has_run = true;

        let start_time = Instant::now();
        let total_tasks = self.tasks.len();
        let limit = self.config.max_concurrent_tasks;

        info!(total_tasks, limit, "Starting batch");
        self.report(TaskExecutionEvent::ExecutionStarted { total_tasks, limit });

        let mut peak_concurrent_tasks = 0;
        if total_tasks > 0 {
            let slots = Arc::new(Mutex::new(Slots::default()));
            let (done_sender, done_receiver) = oneshot::channel();

            // After `fill` the scheduler is only owned by the refill hooks of
            // in-flight tasks. If all of them are dropped without finishing
            // the batch, the sender goes with the scheduler.
            Arc::new(Scheduler {
                tasks: self.tasks.values().cloned().collect(),
                limit,
                slots: Arc::clone(&slots),
                done: Mutex::new(Some(done_sender)),
                reporter: self.reporter.clone(),
            })
            .fill();

            if done_receiver.await.is_err() {
                warn!(statuses = ?self.statuses(), "Batch stalled before every task finished");
                return Err(ExecutorError::CompletionSignalLost);
            }
            peak_concurrent_tasks = slots.lock().peak_in_flight;
        }

        let stats = ExecutionStats::from_outcomes(
            start_time.elapsed(),
            peak_concurrent_tasks,
            self.tasks.values().filter_map(|task| {
                task.inspect(|state| match state {
                    TaskState::Completed { duration, .. } => Some((true, *duration)),
                    TaskState::Errored { duration, .. } => Some((false, *duration)),
                    TaskState::Pending | TaskState::InProgress { .. } => None,
                })
            }),
        );

        info!(
            total_tasks = stats.total_tasks,
            successful_tasks = stats.successful_tasks,
            failed_tasks = stats.failed_tasks,
            peak_concurrent_tasks = stats.peak_concurrent_tasks,
            duration = ?stats.total_duration,
            "Batch finished"
        );
        self.report(TaskExecutionEvent::ExecutionCompleted {
            total_tasks,
            successful_tasks: stats.successful_tasks,
            failed_tasks: stats.failed_tasks,
            duration: stats.total_duration,
        });
        if let Some(reporter) = &self.reporter {
            reporter.lock().finish();
        }

        Ok(stats)
    }

    fn report(&self, event: TaskExecutionEvent) {
        if let Some(reporter) = &self.reporter {
            reporter.lock().report_event(event);
        }
    }
}

impl<T, E> Executor<T, E> {
    /// The concurrency limit
    pub fn limit(&self) -> usize {
        self.config.max_concurrent_tasks
    }

    /// Get the current configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Number of submitted tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if no task was submitted
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Check if [`Executor::run`] was already called
    pub fn has_run(&self) -> bool {
        self.has_run
    }

    /// Get a submitted task by its id.
    ///
    /// A task run through this reference before [`Executor::run`] still
    /// claims a slot in its turn; the executor then only records its outcome.
    pub fn task(&self, id: TaskId) -> Option<&Task<T, E>> {
        self.tasks.get(&id).map(|task| task.as_ref())
    }

    /// Iterate over the submitted tasks in submission order
    pub fn tasks(&self) -> impl Iterator<Item = &Task<T, E>> + '_ {
        self.tasks.values().map(|task| task.as_ref())
    }

    /// The status of a submitted task
    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.tasks.get(&id).map(|task| task.status())
    }

    /// The status of every task, in submission order
    pub fn statuses(&self) -> Vec<TaskStatus> {
        self.tasks.values().map(|task| task.status()).collect()
    }

    /// The values of every completed task, in submission order.
    ///
    /// Errored tasks are left out. Only meaningful once [`Executor::run`]
    /// has resolved.
    pub fn collect_results(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.tasks.values().filter_map(|task| task.value()).collect()
    }

    /// The outcome of a submitted task, or `None` if it is unknown or not terminal
    pub fn outcome(&self, id: TaskId) -> Option<Result<T, TaskError<E>>>
    where
        T: Clone,
        E: Clone,
    {
        self.tasks.get(&id).and_then(|task| task.outcome())
    }

    /// One slot per submitted task, in submission order, holding its outcome
    pub fn outcomes(&self) -> Vec<Option<Result<T, TaskError<E>>>>
    where
        T: Clone,
        E: Clone,
    {
        self.tasks.values().map(|task| task.outcome()).collect()
    }
}

impl<T, E> std::fmt::Debug for Executor<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("tasks", &self.tasks.len())
            .field("has_run", &self.has_run)
            .finish_non_exhaustive()
    }
}

/// Bookkeeping shared by the refill observers of one batch.
#[derive(Debug, Default)]
struct Slots {
    /// Index of the first task that has not been started.
    cursor: usize,
    in_flight: usize,
    peak_in_flight: usize,
}

enum Next {
    Start { index: usize, in_flight: usize },
    Wait,
    Done,
}

struct Scheduler<T, E> {
    tasks: Vec<Arc<Task<T, E>>>,
    limit: usize,
    slots: Arc<Mutex<Slots>>,
    done: Mutex<Option<oneshot::Sender<()>>>,
    reporter: Option<SharedReporter>,
}

impl<T, E> Scheduler<T, E>
where
    T: Send + 'static,
    E: Debug + Send + 'static,
{
    /// Starts tasks until the limit is reached or nothing is left to start.
    fn fill(self: &Arc<Self>) {
        loop {
            match self.claim(false) {
                Next::Start { index, in_flight } => self.start(index, in_flight),
                Next::Wait => return,
                Next::Done => {
                    self.signal_done();
                    return;
                }
            }
        }
    }

    /// Claims the next pending task, if a slot is free.
    ///
    /// `finished` releases the slot of a task that just reached a terminal
    /// state. Claiming and slot accounting happen under one lock so the limit
    /// also holds on a multi-threaded runtime.
    fn claim(&self, finished: bool) -> Next {
        let mut slots = self.slots.lock();
        if finished {
            slots.in_flight -= 1;
        }

        if slots.cursor < self.tasks.len() && slots.in_flight < self.limit {
            let index = slots.cursor;
            slots.cursor += 1;
            slots.in_flight += 1;
            slots.peak_in_flight = slots.peak_in_flight.max(slots.in_flight);
            Next::Start {
                index,
                in_flight: slots.in_flight,
            }
        } else if slots.cursor == self.tasks.len() && slots.in_flight == 0 {
            Next::Done
        } else {
            Next::Wait
        }
    }

    fn start(self: &Arc<Self>, index: usize, in_flight: usize) {
        let task = Arc::clone(&self.tasks[index]);

        debug!(task_id = %task.id(), task_name = task.name(), index, in_flight, "Starting task");
        self.report(TaskExecutionEvent::TaskStarted {
            index,
            task_id: task.id(),
            task_name: task.name().to_string(),
            in_flight,
        });

        // The refill hook goes on before the task is spawned so it cannot miss
        // the completion. It fires right here if the task already finished.
        let scheduler = Arc::clone(self);
        task.on_complete(move |task| scheduler.on_finished(index, task));

        tokio::spawn(async move {
            if let Err(err) = task.run().await {
                // Someone ran the task outside the executor. Its refill hook
                // still fires when that run finishes.
                warn!(index, error = %err, "Task could not be started by the executor");
            }
        });
    }

    fn on_finished(self: &Arc<Self>, index: usize, task: &Task<T, E>) {
        let event = task.inspect(|state| match state {
            TaskState::Completed { duration, .. } => Some(TaskExecutionEvent::TaskCompleted {
                index,
                task_id: task.id(),
                task_name: task.name().to_string(),
                duration: *duration,
            }),
            TaskState::Errored { error, duration } => Some(TaskExecutionEvent::TaskFailed {
                index,
                task_id: task.id(),
                task_name: task.name().to_string(),
                error: error.to_string(),
                duration: *duration,
            }),
            TaskState::Pending | TaskState::InProgress { .. } => None,
        });
        if let Some(event) = event {
            self.report(event);
        }

        match self.claim(true) {
            Next::Start { index, in_flight } => self.start(index, in_flight),
            Next::Wait => {}
            Next::Done => self.signal_done(),
        }
    }

    /// Fires the completion signal. Only the first call has an effect.
    fn signal_done(&self) {
        if let Some(sender) = self.done.lock().take() {
            debug!("All tasks are terminal");
            let _ = sender.send(());
        }
    }

    fn report(&self, event: TaskExecutionEvent) {
        if let Some(reporter) = &self.reporter {
            reporter.lock().report_event(event);
        }
    }
}
