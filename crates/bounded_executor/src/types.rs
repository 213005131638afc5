//! Common types and configuration for the bounded executor

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Configuration for the bounded executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of tasks that can be in flight at once
    pub max_concurrent_tasks: usize,

    /// Timeout applied to every submitted task (None for no timeout)
    pub task_timeout: Option<Duration>,

    /// Name of the batch, passed to reporters as context
    pub batch_name: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: num_cpus::get(),
            task_timeout: None,
            batch_name: None,
        }
    }
}

impl ExecutorConfig {
    /// Create a new executor configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of concurrent tasks
    pub fn with_max_concurrent_tasks(mut self, max_concurrent_tasks: usize) -> ConfigResult<Self> {
        if max_concurrent_tasks == 0 {
            return Err(ConfigError::invalid_max_concurrent_tasks(max_concurrent_tasks));
        }
        self.max_concurrent_tasks = max_concurrent_tasks;
        Ok(self)
    }

    /// Set the maximum number of concurrent tasks from a value that is known to be non-zero
    pub fn with_limit(mut self, limit: NonZeroUsize) -> Self {
        self.max_concurrent_tasks = limit.get();
        self
    }

    /// Set the timeout applied to each submitted task
    pub fn with_task_timeout(mut self, timeout: Duration) -> ConfigResult<Self> {
        if timeout.is_zero() {
            return Err(ConfigError::invalid_timeout(timeout));
        }
        self.task_timeout = Some(timeout);
        Ok(self)
    }

    /// Set the batch name
    pub fn with_batch_name(mut self, name: impl Into<String>) -> Self {
        self.batch_name = Some(name.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::invalid_max_concurrent_tasks(self.max_concurrent_tasks));
        }

        if let Some(timeout) = self.task_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::invalid_timeout(timeout));
            }
        }

        Ok(())
    }

    /// A configuration that runs one task at a time
    pub fn sequential() -> Self {
        Self {
            max_concurrent_tasks: 1,
            ..Self::default()
        }
    }

    /// A configuration for many short, I/O-bound tasks
    pub fn for_high_throughput() -> Self {
        Self {
            max_concurrent_tasks: num_cpus::get() * 4,
            ..Self::default()
        }
    }
}

/// Summary of a finished batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Total execution time
    pub total_duration: Duration,

    /// Number of tasks submitted
    pub total_tasks: usize,

    /// Number of successful tasks
    pub successful_tasks: usize,

    /// Number of failed tasks
    pub failed_tasks: usize,

    /// Average task duration
    pub average_task_duration: Duration,

    /// Maximum task duration
    pub max_task_duration: Duration,

    /// Minimum task duration
    pub min_task_duration: Duration,

    /// Finished tasks per second
    pub tasks_per_second: f64,

    /// Peak number of tasks in flight at the same time
    pub peak_concurrent_tasks: usize,
}

impl ExecutionStats {
    /// Builds the summary from the per-task durations and outcomes
    pub(crate) fn from_outcomes(
        total_duration: Duration,
        peak_concurrent_tasks: usize,
        outcomes: impl IntoIterator<Item = (bool, Duration)>,
    ) -> Self {
        let mut stats = ExecutionStats {
            total_duration,
            peak_concurrent_tasks,
            ..Default::default()
        };

        let mut min_task_duration: Option<Duration> = None;
        let mut summed = Duration::ZERO;
        for (succeeded, duration) in outcomes {
            stats.total_tasks += 1;
            if succeeded {
                stats.successful_tasks += 1;
            } else {
                stats.failed_tasks += 1;
            }
            summed += duration;
            stats.max_task_duration = stats.max_task_duration.max(duration);
            min_task_duration = Some(min_task_duration.map_or(duration, |min| min.min(duration)));
        }

        stats.min_task_duration = min_task_duration.unwrap_or_default();
        if let Ok(finished) = u32::try_from(stats.total_tasks) {
            if finished > 0 {
                stats.average_task_duration = summed / finished;
            }
        }
        if !total_duration.is_zero() {
            stats.tasks_per_second = stats.total_tasks as f64 / total_duration.as_secs_f64();
        }
        stats
    }

    /// Check if every task succeeded
    pub fn is_successful(&self) -> bool {
        self.failed_tasks == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExecutorConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.max_concurrent_tasks > 0);
        assert!(config.task_timeout.is_none());
        assert!(config.batch_name.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = ExecutorConfig::new()
            .with_max_concurrent_tasks(4)
            .unwrap()
            .with_task_timeout(Duration::from_secs(30))
            .unwrap()
            .with_batch_name("downloads");

        assert_eq!(config.max_concurrent_tasks, 4);
        assert_eq!(config.task_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.batch_name.as_deref(), Some("downloads"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let result = ExecutorConfig::new().with_max_concurrent_tasks(0);
        assert_eq!(result, Err(ConfigError::InvalidMaxConcurrentTasks { value: 0 }));

        let result = ExecutorConfig::new().with_task_timeout(Duration::ZERO);
        assert!(result.is_err());

        let config = ExecutorConfig {
            max_concurrent_tasks: 0,
            ..ExecutorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_preset_configs() {
        let sequential = ExecutorConfig::sequential();
        assert!(sequential.validate().is_ok());
        assert_eq!(sequential.max_concurrent_tasks, 1);

        let high_throughput = ExecutorConfig::for_high_throughput();
        assert!(high_throughput.validate().is_ok());
        assert!(high_throughput.max_concurrent_tasks >= num_cpus::get());

        let limited = ExecutorConfig::new().with_limit(NonZeroUsize::new(3).unwrap());
        assert_eq!(limited.max_concurrent_tasks, 3);
    }

    #[test]
    fn test_execution_stats() {
        let stats = ExecutionStats::default();
        assert_eq!(stats.total_tasks, 0);
        assert_eq!(stats.tasks_per_second, 0.0);
        assert!(stats.is_successful());

        let stats = ExecutionStats::from_outcomes(
            Duration::from_secs(2),
            2,
            [
                (true, Duration::from_millis(100)),
                (false, Duration::from_millis(300)),
                (true, Duration::from_millis(200)),
            ],
        );
        assert_eq!(stats.total_tasks, 3);
        assert_eq!(stats.successful_tasks, 2);
        assert_eq!(stats.failed_tasks, 1);
        assert_eq!(stats.peak_concurrent_tasks, 2);
        assert_eq!(stats.min_task_duration, Duration::from_millis(100));
        assert_eq!(stats.max_task_duration, Duration::from_millis(300));
        assert_eq!(stats.average_task_duration, Duration::from_millis(200));
        assert_eq!(stats.tasks_per_second, 1.5);
        assert!(!stats.is_successful());
    }
}
