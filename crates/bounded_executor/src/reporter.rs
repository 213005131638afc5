//! Lifecycle reporting for batch execution
//!
//! The executor emits a [`TaskExecutionEvent`] for every queued, started and
//! finished task, and once at the start and end of a batch. Implement
//! [`ExecutionReporter`] to forward those events to a progress bar, a metrics
//! sink or a log.

use std::time::Duration;

use tracing::{info, warn};

use crate::task::TaskId;

/// Event types that can be reported during batch execution
#[derive(Debug, Clone, PartialEq)]
pub enum TaskExecutionEvent {
    /// Task was submitted to the executor
    TaskQueued {
        index: usize,
        task_id: TaskId,
        task_name: String,
    },
    /// Task execution started
    TaskStarted {
        index: usize,
        task_id: TaskId,
        task_name: String,
        in_flight: usize,
    },
    /// Task execution completed successfully
    TaskCompleted {
        index: usize,
        task_id: TaskId,
        task_name: String,
        duration: Duration,
    },
    /// Task execution failed
    TaskFailed {
        index: usize,
        task_id: TaskId,
        task_name: String,
        error: String,
        duration: Duration,
    },
    /// Execution batch started
    ExecutionStarted { total_tasks: usize, limit: usize },
    /// Execution batch completed
    ExecutionCompleted {
        total_tasks: usize,
        successful_tasks: usize,
        failed_tasks: usize,
        duration: Duration,
    },
}

/// Trait for reporting batch execution progress
pub trait ExecutionReporter: Send {
    /// Report a task execution event
    fn report_event(&mut self, event: TaskExecutionEvent);

    /// Set context for the current execution batch
    fn set_context(&mut self, context: String) {
        let _ = context;
    }

    /// Called once the batch has finished
    fn finish(&mut self) {}
}

/// A no-op reporter that discards all events
#[derive(Debug, Default)]
pub struct NoOpReporter;

impl ExecutionReporter for NoOpReporter {
    fn report_event(&mut self, _event: TaskExecutionEvent) {}
}

/// A reporter that turns events into `tracing` records
#[derive(Debug, Default)]
pub struct TracingReporter {
    context: Option<String>,
}

impl TracingReporter {
    pub fn new() -> Self {
        Self { context: None }
    }

    fn format_duration(duration: Duration) -> String {
        if duration.as_secs() > 0 {
            format!("{:.1}s", duration.as_secs_f32())
        } else {
            format!("{}ms", duration.as_millis())
        }
    }
}

impl ExecutionReporter for TracingReporter {
    fn report_event(&mut self, event: TaskExecutionEvent) {
        let batch = self.context.as_deref().unwrap_or("batch");

        match event {
            TaskExecutionEvent::TaskQueued { index, task_name, .. } => {
                info!(batch, index, %task_name, "Queued");
            }
            TaskExecutionEvent::TaskStarted {
                index,
                task_name,
                in_flight,
                ..
            } => {
                info!(batch, index, %task_name, in_flight, "Started");
            }
            TaskExecutionEvent::TaskCompleted {
                index,
                task_name,
                duration,
                ..
            } => {
                info!(
                    batch,
                    index,
                    %task_name,
                    duration = %Self::format_duration(duration),
                    "Completed"
                );
            }
            TaskExecutionEvent::TaskFailed {
                index,
                task_name,
                error,
                duration,
                ..
            } => {
                warn!(
                    batch,
                    index,
                    %task_name,
                    %error,
                    duration = %Self::format_duration(duration),
                    "Failed"
                );
            }
            TaskExecutionEvent::ExecutionStarted { total_tasks, limit } => {
                info!(batch, total_tasks, limit, "Starting execution");
            }
            TaskExecutionEvent::ExecutionCompleted {
                total_tasks,
                successful_tasks,
                failed_tasks,
                duration,
            } => {
                info!(
                    batch,
                    total_tasks,
                    successful_tasks,
                    failed_tasks,
                    duration = %Self::format_duration(duration),
                    "Execution completed"
                );
            }
        }
    }

    fn set_context(&mut self, context: String) {
        self.context = Some(context);
    }
}

/// A multi-reporter that broadcasts events to multiple reporters
#[derive(Default)]
pub struct MultiReporter {
    reporters: Vec<Box<dyn ExecutionReporter>>,
}

impl MultiReporter {
    pub fn new() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn add_reporter<R: ExecutionReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    pub fn push_reporter<R: ExecutionReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Box::new(reporter));
    }
}

impl ExecutionReporter for MultiReporter {
    fn report_event(&mut self, event: TaskExecutionEvent) {
        for reporter in &mut self.reporters {
            reporter.report_event(event.clone());
        }
    }

    fn set_context(&mut self, context: String) {
        for reporter in &mut self.reporters {
            reporter.set_context(context.clone());
        }
    }

    fn finish(&mut self) {
        for reporter in &mut self.reporters {
            reporter.finish();
        }
    }
}
